//! Thin HTTP layer over the job-control surface.
//!
//! The transport is deliberately minimal: six routes mapping one-to-one onto
//! the orchestrator's entrypoints. Everything interesting lives below.

pub mod core;
pub mod routes;

use crate::core::app_state::AppState;
use crate::routes::audit_route::{last_report, run_audit};
use crate::routes::derive_route::derive_relationships;
use crate::routes::job_status_route::job_status;
use crate::routes::start_job_route::start_job;
use crate::routes::stop_job_route::stop_job;

use axum::Router;
use axum::routing::{get, post};
use graph_store::GraphStore;
use ingest_pipeline::{Orchestrator, PipelineConfig};
use std::env;
use std::sync::Arc;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(start_job))
        .route("/jobs/{job_id}", get(job_status))
        .route("/jobs/{job_id}/stop", post(stop_job))
        .route("/audit", post(run_audit))
        .route("/report", get(last_report))
        .route("/derive", post(derive_relationships))
        .with_state(state)
}

/// Connect to the store, build the orchestrator and serve until shutdown.
pub async fn start() -> anyhow::Result<()> {
    let cfg = Arc::new(PipelineConfig::from_env()?);
    let store = GraphStore::connect(cfg.store.clone()).await?;
    let orchestrator = Arc::new(Orchestrator::new(cfg, store));

    let state = AppState { orchestrator };
    let bind = env::var("BIND_ADDR").unwrap_or_else(|_| String::from("0.0.0.0:8080"));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("api: listening on {bind}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
