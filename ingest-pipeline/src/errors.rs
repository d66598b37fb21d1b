use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("another job is already running")]
    JobAlreadyRunning,

    #[error("unknown job: {0}")]
    UnknownJob(Uuid),

    #[error(transparent)]
    Store(#[from] graph_store::StoreError),

    #[error("scan failed: {0}")]
    Scan(#[from] repo_scan::Error),

    #[error("commit extraction failed: {0}")]
    Git(#[from] git_history::Error),

    #[error("invariant violated: {invariant}")]
    InvariantViolation { invariant: String },

    #[error("stage failed: {0}")]
    Stage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
