//! Shared record shapes for symbols and languages.

use serde::{Deserialize, Serialize};

/// Languages with a symbol parser available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageKind {
    Python,
    Typescript,
    Javascript,
    Rust,
    Go,
    Java,
}

impl LanguageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageKind::Python => "python",
            LanguageKind::Typescript => "typescript",
            LanguageKind::Javascript => "javascript",
            LanguageKind::Rust => "rust",
            LanguageKind::Go => "go",
            LanguageKind::Java => "java",
        }
    }

    /// Parser availability by file extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('/').next()?.rsplit('.').next()?;
        match ext {
            "py" => Some(LanguageKind::Python),
            "ts" | "tsx" => Some(LanguageKind::Typescript),
            "js" | "jsx" => Some(LanguageKind::Javascript),
            "rs" => Some(LanguageKind::Rust),
            "go" => Some(LanguageKind::Go),
            "java" => Some(LanguageKind::Java),
            _ => None,
        }
    }
}

/// Symbol taxonomy stored on Symbol nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
        }
    }
}

/// One extracted symbol. `uid` is stable across runs for an unchanged file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// `<file_path>#<name>:<kind>`.
    pub uid: String,
    pub name: String,
    pub kind: SymbolKind,
    pub language: LanguageKind,
    /// Repo-relative POSIX path of the defining file.
    pub file: String,
    /// 1-based inclusive line span.
    pub start_line: usize,
    pub end_line: usize,
}

impl SymbolRecord {
    pub fn new(
        file: &str,
        name: &str,
        kind: SymbolKind,
        language: LanguageKind,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            uid: format!("{file}#{name}:{}", kind.as_str()),
            name: name.to_string(),
            kind,
            language,
            file: file.to_string(),
            start_line,
            end_line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_path() {
        assert_eq!(LanguageKind::from_path("src/a.py"), Some(LanguageKind::Python));
        assert_eq!(LanguageKind::from_path("ui/App.tsx"), Some(LanguageKind::Typescript));
        assert_eq!(LanguageKind::from_path("README.md"), None);
    }

    #[test]
    fn uid_is_path_name_kind() {
        let s = SymbolRecord::new("src/a.py", "foo", SymbolKind::Function, LanguageKind::Python, 1, 2);
        assert_eq!(s.uid, "src/a.py#foo:function");
    }
}
