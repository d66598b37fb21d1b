use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("repo root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("path escapes repository root: {0}")]
    PathEscapesRoot(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
