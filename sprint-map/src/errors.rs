use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sprint folder {folder} has no parseable metadata: {detail}")]
    Metadata { folder: String, detail: String },

    #[error("unparseable timestamp: {0:?}")]
    BadTimestamp(String),
}

pub type Result<T> = std::result::Result<T, Error>;
