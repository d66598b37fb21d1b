//! Heading-scoped document chunking.
//!
//! A chunk is the text under a heading until the next heading of equal or
//! higher level. The chunk records the chain of ancestor headings; text
//! before the first heading becomes a preamble chunk. YAML front-matter is
//! stripped before parsing.

use crate::types::{ChunkKind, ChunkRecord};

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use tracing::debug;

#[derive(Debug)]
struct Heading {
    level: u32,
    title: String,
    /// Byte offset where the heading block starts.
    start: usize,
    /// Byte offset just past the heading block.
    end: usize,
}

/// Chunk a markdown document.
pub fn chunk_document(file: &str, text: &str) -> Vec<ChunkRecord> {
    let (body, body_offset) = strip_front_matter(text);
    let headings = collect_headings(body);
    let line_starts = line_starts(text);

    let mut out = Vec::new();
    let mut ordinal = 0usize;
    let mut push = |text_slice: &str, heading: Option<String>, abs_start: usize| {
        let trimmed = text_slice.trim();
        if trimmed.is_empty() {
            return;
        }
        let start_line = line_of(&line_starts, abs_start);
        let end_line = start_line + text_slice.trim_end().lines().count().saturating_sub(1);
        out.push(ChunkRecord::new(
            file,
            ChunkKind::Doc,
            ordinal,
            trimmed.to_string(),
            heading,
            None,
            start_line,
            end_line,
        ));
        ordinal += 1;
    };

    // Preamble before the first heading.
    let first_heading_start = headings.first().map(|h| h.start).unwrap_or(body.len());
    push(&body[..first_heading_start], None, body_offset);

    // One chunk per heading, scoped to the next heading of <= level.
    let mut chain: Vec<(u32, String)> = Vec::new();
    for (i, h) in headings.iter().enumerate() {
        while chain.last().is_some_and(|(level, _)| *level >= h.level) {
            chain.pop();
        }
        chain.push((h.level, h.title.clone()));
        let heading_path = chain
            .iter()
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join(" > ");

        let scope_end = headings[i + 1..]
            .iter()
            .find(|next| next.level <= h.level)
            .map(|next| next.start)
            .unwrap_or(body.len());
        // Text under the heading, heading line excluded.
        let slice_start = h.end.min(scope_end);
        push(&body[slice_start..scope_end], Some(heading_path), body_offset + slice_start);
    }

    debug!("chunk: {} -> {} doc chunk(s)", file, out.len());
    out
}

/// First H1 text, used as the Document title.
pub fn document_title(text: &str) -> Option<String> {
    let (body, _) = strip_front_matter(text);
    collect_headings(body)
        .into_iter()
        .find(|h| h.level == 1)
        .map(|h| h.title)
}

/// Strip a leading `--- ... ---` front-matter block. Returns the body and its
/// byte offset within the original text.
fn strip_front_matter(text: &str) -> (&str, usize) {
    let rest = text.strip_prefix("---").filter(|r| r.starts_with(['\n', '\r']));
    if let Some(rest) = rest {
        for terminator in ["\n---\n", "\n---\r\n", "\n...\n"] {
            if let Some(pos) = rest.find(terminator) {
                let offset = 3 + pos + terminator.len();
                return (&text[offset..], offset);
            }
        }
    }
    (text, 0)
}

fn collect_headings(body: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut current: Option<Heading> = None;

    for (event, range) in Parser::new(body).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(Heading {
                    level: level as u32,
                    title: String::new(),
                    start: range.start,
                    end: range.end,
                });
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some(h) = current.as_mut() {
                    h.title.push_str(&t);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut h) = current.take() {
                    h.title = h.title.trim().to_string();
                    h.end = h.end.max(range.end);
                    headings.push(h);
                }
            }
            _ => {}
        }
    }
    headings
}

fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// 1-based line containing the byte offset.
fn line_of(starts: &[usize], offset: usize) -> usize {
    match starts.binary_search(&offset) {
        Ok(i) => i + 1,
        Err(i) => i,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
intro paragraph

# Title

opening words

## Goals

- fast
- correct

## Scope

everything

# Appendix

extra
";

    #[test]
    fn chunks_scope_to_next_equal_or_higher_heading() {
        let chunks = chunk_document("docs/PRD.md", DOC);
        let headings: Vec<Option<&str>> = chunks.iter().map(|c| c.heading.as_deref()).collect();
        assert_eq!(headings, vec![
            None,
            Some("Title"),
            Some("Title > Goals"),
            Some("Title > Scope"),
            Some("Appendix"),
        ]);
        let goals = &chunks[2];
        assert!(goals.text.contains("- fast"));
        assert!(!goals.text.contains("Scope"));
    }

    #[test]
    fn ids_are_ordinal_scoped() {
        let chunks = chunk_document("docs/PRD.md", DOC);
        assert_eq!(chunks[0].id, "docs/PRD.md#doc:0");
        assert_eq!(chunks[1].id, "docs/PRD.md#doc:1");
    }

    #[test]
    fn front_matter_is_stripped() {
        let doc = "---\ntitle: x\nsprint: 3\n---\n# Body\n\ncontent\n";
        let chunks = chunk_document("docs/a.md", doc);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].text.contains("sprint: 3"));
        assert_eq!(chunks[0].heading.as_deref(), Some("Body"));
    }

    #[test]
    fn title_is_first_h1() {
        assert_eq!(document_title(DOC).as_deref(), Some("Title"));
        assert_eq!(document_title("plain text"), None);
    }

    #[test]
    fn every_chunk_has_text() {
        let chunks = chunk_document("docs/PRD.md", "# A\n\n# B\n\nbody\n");
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }
}
