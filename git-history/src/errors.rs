use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("worker panicked: {0}")]
    Worker(String),

    #[error("invalid commit hash: {0}")]
    BadHash(String),
}

pub type Result<T> = std::result::Result<T, Error>;
