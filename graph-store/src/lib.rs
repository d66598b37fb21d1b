//! Async adapter over the labeled property graph store.
//!
//! Every write in the pipeline goes through this crate: schema application,
//! batched UNWIND/MERGE upserts for nodes and edges, multi-statement write
//! transactions, and fulltext sweeps. Reads used by the auditor and the
//! relationship deriver are exposed as typed fetch helpers that tolerate
//! empty results.

pub mod bolt;
pub mod config;
pub mod errors;
pub mod fulltext;
pub mod schema;
mod store;

pub use config::StoreConfig;
pub use errors::{Result, StoreError};
pub use fulltext::{FulltextHit, escape_query};
pub use schema::{
    CHUNK_TEXT_INDEX, ENTITY_NAME_INDEX, EdgeSpec, EdgeType, NodeLabel,
};
pub use store::{GraphStore, Params};
