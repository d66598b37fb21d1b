//! The run context handed to every stage by reference.

use crate::config::PipelineConfig;

use chunk_prep::ChunkRecord;
use git_history::CommitRecord;
use repo_scan::{DeltaPlan, FileInventory, Profile};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use symbol_index::{ImportRecord, LibraryRecord, SymbolRecord};

/// Shared, read-only run state plus the cooperative stop flag. Owned by the
/// orchestrator; stages receive it by reference and never hold it globally.
pub struct RunContext {
    pub cfg: Arc<PipelineConfig>,
    pub profile: Profile,
    pub subpath: Option<String>,
    pub strict: bool,
    stop: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(
        cfg: Arc<PipelineConfig>,
        profile: Profile,
        subpath: Option<String>,
        strict: bool,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            cfg,
            profile,
            subpath,
            strict,
            stop,
        }
    }

    /// Checked before stages, between batches, and after worker results.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Data the stages pass forward within one run. Everything here is also
/// persisted to the store; the in-memory copy saves re-reads between
/// consecutive stages.
#[derive(Default)]
pub struct RunArtifacts {
    pub inventory: Option<FileInventory>,
    pub plan: Option<DeltaPlan>,
    pub commits: Vec<CommitRecord>,
    pub latest_hash: Option<String>,
    pub chunks: Vec<ChunkRecord>,
    pub symbols: Vec<SymbolRecord>,
    pub libraries: Vec<LibraryRecord>,
    pub imports: Vec<ImportRecord>,
}
