//! Fulltext query helpers.

/// Characters with meaning in the Lucene query syntax that must be escaped
/// before a literal term is handed to `db.index.fulltext.queryNodes`.
const RESERVED: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];

/// Escape a literal search term for the fulltext index.
///
/// Paths and symbol names routinely contain slashes, colons and parentheses;
/// unescaped they change the query semantics or fail to parse.
pub fn escape_query(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if RESERVED.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// One scored hit from a fulltext sweep.
#[derive(Debug, Clone)]
pub struct FulltextHit {
    /// The key property of the matched node (Chunk.id, File.path, ...).
    pub key: String,
    /// First label of the matched node.
    pub label: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_paths_and_symbols() {
        assert_eq!(escape_query("src/a.py"), "src\\/a.py");
        assert_eq!(escape_query("Foo::bar"), "Foo\\:\\:bar");
        assert_eq!(escape_query("f(x)"), "f\\(x\\)");
        assert_eq!(escape_query("a+b-c"), "a\\+b\\-c");
    }

    #[test]
    fn plain_terms_unchanged() {
        assert_eq!(escape_query("ingest_commits"), "ingest_commits");
    }
}
