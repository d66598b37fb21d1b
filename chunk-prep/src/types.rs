use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Doc,
    Code,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Doc => "doc",
            ChunkKind::Code => "code",
        }
    }
}

/// One chunk of a file. Ids are stable: `<file_path>#<kind>:<ordinal>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub file: String,
    pub kind: ChunkKind,
    pub ordinal: usize,
    pub text: String,
    /// Ancestor heading chain for doc chunks ("Intro > Goals").
    pub heading: Option<String>,
    /// Owning symbol name for code chunks, when known.
    pub symbol: Option<String>,
    /// 1-based inclusive line span.
    pub start_line: usize,
    pub end_line: usize,
    pub length: usize,
}

impl ChunkRecord {
    pub fn new(
        file: &str,
        kind: ChunkKind,
        ordinal: usize,
        text: String,
        heading: Option<String>,
        symbol: Option<String>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        let length = text.chars().count();
        Self {
            id: format!("{file}#{}:{ordinal}", kind.as_str()),
            file: file.to_string(),
            kind,
            ordinal,
            text,
            heading,
            symbol,
            start_line,
            end_line,
            length,
        }
    }
}
