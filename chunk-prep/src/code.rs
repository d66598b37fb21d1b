//! Symbol-scoped code chunking with a line-window fallback.

use crate::types::{ChunkKind, ChunkRecord};

use symbol_index::SymbolRecord;
use tracing::debug;

/// Window size for files without a usable parse.
pub const FALLBACK_WINDOW_LINES: usize = 120;
pub const FALLBACK_OVERLAP_LINES: usize = 10;

/// Chunk a code file. With symbols available each outermost symbol becomes a
/// chunk; otherwise the file is split into fixed overlapping line windows.
pub fn chunk_code(file: &str, text: &str, symbols: &[SymbolRecord]) -> Vec<ChunkRecord> {
    let outermost = outermost_symbols(symbols);
    if outermost.is_empty() {
        return window_chunks(file, text);
    }

    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = Vec::new();
    let mut ordinal = 0usize;
    for sym in outermost {
        let start = sym.start_line.saturating_sub(1).min(lines.len());
        let end = sym.end_line.min(lines.len());
        let body: String = lines[start..end].concat();
        if body.trim().is_empty() {
            continue;
        }
        out.push(ChunkRecord::new(
            file,
            ChunkKind::Code,
            ordinal,
            body,
            None,
            Some(sym.name.clone()),
            sym.start_line,
            sym.end_line,
        ));
        ordinal += 1;
    }
    debug!("chunk: {} -> {} symbol chunk(s)", file, out.len());
    out
}

/// Symbols not contained in another symbol's span (classes swallow their
/// methods so chunks do not overlap).
fn outermost_symbols<'a>(symbols: &'a [SymbolRecord]) -> Vec<&'a SymbolRecord> {
    let mut out: Vec<&SymbolRecord> = Vec::new();
    for sym in symbols {
        let contained = symbols.iter().any(|other| {
            !std::ptr::eq(other, sym)
                && other.start_line <= sym.start_line
                && sym.end_line <= other.end_line
                && (other.start_line < sym.start_line || other.end_line > sym.end_line)
        });
        if !contained {
            out.push(sym);
        }
    }
    out.sort_by_key(|s| s.start_line);
    out
}

/// Fixed windows of ~120 lines with 10-line overlap.
fn window_chunks(file: &str, text: &str) -> Vec<ChunkRecord> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut start = 0usize;
    let mut ordinal = 0usize;
    let step = FALLBACK_WINDOW_LINES
        .saturating_sub(FALLBACK_OVERLAP_LINES)
        .max(1);

    while start < lines.len() {
        let end = (start + FALLBACK_WINDOW_LINES).min(lines.len());
        let body: String = lines[start..end].concat();
        if !body.trim().is_empty() {
            out.push(ChunkRecord::new(
                file,
                ChunkKind::Code,
                ordinal,
                body,
                None,
                None,
                start + 1,
                end,
            ));
            ordinal += 1;
        }
        if end == lines.len() {
            break;
        }
        start += step;
    }
    debug!("chunk: {} -> {} window chunk(s)", file, out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbol_index::{LanguageKind, SymbolKind, SymbolRecord};

    fn sym(name: &str, kind: SymbolKind, start: usize, end: usize) -> SymbolRecord {
        SymbolRecord::new("src/a.py", name, kind, LanguageKind::Python, start, end)
    }

    #[test]
    fn symbols_become_chunks_outermost_only() {
        let text = "class A:\n    def m(self):\n        pass\n\ndef free():\n    pass\n";
        let symbols = vec![
            sym("A", SymbolKind::Class, 1, 3),
            sym("m", SymbolKind::Method, 2, 3),
            sym("free", SymbolKind::Function, 5, 6),
        ];
        let chunks = chunk_code("src/a.py", text, &symbols);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].symbol.as_deref(), Some("A"));
        assert!(chunks[0].text.contains("def m"));
        assert_eq!(chunks[1].symbol.as_deref(), Some("free"));
        assert_eq!(chunks[1].id, "src/a.py#code:1");
    }

    #[test]
    fn parserless_files_fall_back_to_windows() {
        let text = (0..300).map(|i| format!("line {i}\n")).collect::<String>();
        let chunks = chunk_code("src/big.sql", &text, &[]);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 120);
        // 10-line overlap between consecutive windows
        assert_eq!(chunks[1].start_line, 111);
        assert!(chunks.iter().all(|c| c.symbol.is_none()));
    }

    #[test]
    fn empty_file_yields_nothing() {
        assert!(chunk_code("src/empty.py", "", &[]).is_empty());
    }
}
