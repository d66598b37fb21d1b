use ingest_pipeline::Orchestrator;
use std::sync::Arc;

/// Shared state for handlers. Place it in your API state struct.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}
