use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tree-sitter language error: {0}")]
    Language(String),

    #[error("parse error in {path}")]
    Parse { path: String },

    #[error("malformed dependency manifest {path}: {detail}")]
    ManifestMalformed { path: String, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
