//! Connection settings for the graph store.

use serde::{Deserialize, Serialize};
use std::env;

/// Bolt connection settings, loadable from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bolt URI, e.g. "bolt://localhost:7687".
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Logical database name.
    pub database: String,
    /// Per-query timeout in seconds.
    pub query_timeout_s: u64,
    /// Transient-failure retry budget.
    pub max_retries: u32,
    /// Driver connection pool size.
    pub max_connections: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: String::from("bolt://localhost:7687"),
            user: String::from("neo4j"),
            password: String::from("neo4j"),
            database: String::from("neo4j"),
            query_timeout_s: 60,
            max_retries: 5,
            max_connections: 8,
        }
    }
}

impl StoreConfig {
    /// Load from env vars, falling back to defaults for anything unset.
    ///
    /// Supported vars: `GRAPH_STORE_URI`, `GRAPH_STORE_USER`,
    /// `GRAPH_STORE_PASSWORD`, `GRAPH_STORE_DB`, `GRAPH_STORE_TIMEOUT_S`,
    /// `GRAPH_STORE_MAX_RETRIES`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("GRAPH_STORE_URI") {
            cfg.uri = v;
        }
        if let Ok(v) = env::var("GRAPH_STORE_USER") {
            cfg.user = v;
        }
        if let Ok(v) = env::var("GRAPH_STORE_PASSWORD") {
            cfg.password = v;
        }
        if let Ok(v) = env::var("GRAPH_STORE_DB") {
            cfg.database = v;
        }
        if let Some(v) = env_u64("GRAPH_STORE_TIMEOUT_S") {
            cfg.query_timeout_s = v;
        }
        if let Some(v) = env_u64("GRAPH_STORE_MAX_RETRIES") {
            cfg.max_retries = v as u32;
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|s| s.trim().parse::<u64>().ok())
}
