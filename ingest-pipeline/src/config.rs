//! Pipeline configuration.
//!
//! Env-driven with tolerant parsing: unknown variables are ignored and
//! unparseable values fall back to defaults. `validate()` runs after load.

use crate::errors::{PipelineError, Result};

use graph_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Weights for the auditor's quality score. They must sum to 100; a failing
/// check contributes zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditWeights {
    pub bidirectional_chunks: u32,
    pub commit_chain: u32,
    pub orphans: u32,
    pub requirement_linkage: u32,
    pub library_linkage: u32,
    pub decode_health: u32,
}

impl Default for AuditWeights {
    fn default() -> Self {
        Self {
            bidirectional_chunks: 25,
            commit_chain: 15,
            orphans: 20,
            requirement_linkage: 15,
            library_linkage: 15,
            decode_health: 10,
        }
    }
}

impl AuditWeights {
    pub fn total(&self) -> u32 {
        self.bidirectional_chunks
            + self.commit_chain
            + self.orphans
            + self.requirement_linkage
            + self.library_linkage
            + self.decode_health
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Repository under analysis.
    pub repo_root: PathBuf,
    /// Where the manifest and other run state live.
    pub state_dir: PathBuf,
    /// Documentation subtrees holding sprint folders.
    pub docs_roots: Vec<String>,

    /// Per-stage worker pool size.
    pub max_workers: usize,
    /// Commits per write transaction.
    pub commit_batch_size: usize,
    /// Chunks per write transaction.
    pub chunk_batch_size: usize,
    /// Fulltext hit cap per chunk.
    pub mention_topk_per_chunk: usize,
    /// Derivation confidence floor.
    pub min_confidence: f64,
    /// Wipe the graph before running.
    pub reset_graph: bool,
    /// Add untracked working-tree files to the scan.
    pub include_untracked: bool,
    /// Soft parse timeout per file, seconds.
    pub per_file_timeout_s: u64,

    pub audit_weights: AuditWeights,
    pub store: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            state_dir: PathBuf::from(".repograph"),
            docs_roots: vec![String::from("docs")],
            max_workers: num_cpus::get(),
            commit_batch_size: 200,
            chunk_batch_size: 500,
            mention_topk_per_chunk: 10,
            min_confidence: 0.3,
            reset_graph: false,
            include_untracked: false,
            per_file_timeout_s: 30,
            audit_weights: AuditWeights::default(),
            store: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from env or defaults.
    ///
    /// Supported vars (all optional): `REPOGRAPH_REPO_ROOT`,
    /// `REPOGRAPH_STATE_DIR`, `REPOGRAPH_DOCS_ROOTS` (comma-separated),
    /// `REPOGRAPH_MAX_WORKERS`, `REPOGRAPH_COMMIT_BATCH`,
    /// `REPOGRAPH_CHUNK_BATCH`, `REPOGRAPH_MENTION_TOPK`,
    /// `REPOGRAPH_MIN_CONFIDENCE`, `REPOGRAPH_RESET_GRAPH`,
    /// `REPOGRAPH_INCLUDE_UNTRACKED`, `REPOGRAPH_FILE_TIMEOUT_S`,
    /// plus the `GRAPH_STORE_*` family.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("REPOGRAPH_REPO_ROOT") {
            cfg.repo_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("REPOGRAPH_STATE_DIR") {
            cfg.state_dir = PathBuf::from(v);
        } else {
            cfg.state_dir = cfg.repo_root.join(".repograph");
        }
        if let Some(v) = env_list("REPOGRAPH_DOCS_ROOTS") {
            cfg.docs_roots = v;
        }
        if let Some(v) = env_usize("REPOGRAPH_MAX_WORKERS") {
            cfg.max_workers = v;
        }
        if let Some(v) = env_usize("REPOGRAPH_COMMIT_BATCH") {
            cfg.commit_batch_size = v;
        }
        if let Some(v) = env_usize("REPOGRAPH_CHUNK_BATCH") {
            cfg.chunk_batch_size = v;
        }
        if let Some(v) = env_usize("REPOGRAPH_MENTION_TOPK") {
            cfg.mention_topk_per_chunk = v;
        }
        if let Some(v) = env_f64("REPOGRAPH_MIN_CONFIDENCE") {
            cfg.min_confidence = v;
        }
        if let Some(v) = env_bool("REPOGRAPH_RESET_GRAPH") {
            cfg.reset_graph = v;
        }
        if let Some(v) = env_bool("REPOGRAPH_INCLUDE_UNTRACKED") {
            cfg.include_untracked = v;
        }
        if let Some(v) = env_usize("REPOGRAPH_FILE_TIMEOUT_S") {
            cfg.per_file_timeout_s = v as u64;
        }
        cfg.store = StoreConfig::from_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(PipelineError::Config(String::from("max_workers must be > 0")));
        }
        if self.commit_batch_size == 0 || self.chunk_batch_size == 0 {
            return Err(PipelineError::Config(String::from("batch sizes must be > 0")));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(PipelineError::Config(String::from(
                "min_confidence must be within [0, 1]",
            )));
        }
        if self.audit_weights.total() != 100 {
            return Err(PipelineError::Config(format!(
                "audit weights must sum to 100, got {}",
                self.audit_weights.total()
            )));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join("manifest.json")
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|s| {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    })
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_weights_are_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.audit_weights.orphans = 99;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_confidence_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.min_confidence = 1.5;
        assert!(cfg.validate().is_err());
    }
}
