//! Git history extraction for the ingestion pipeline.

pub mod chain;
pub mod errors;
pub mod extract;

pub use chain::{chain_pairs, latest_hash};
pub use errors::{Error, Result};
pub use extract::{
    ChangeStatus, CommitRecord, FileChange, extract_commits, extract_range_sync, format_commit_time,
    list_oids,
};
