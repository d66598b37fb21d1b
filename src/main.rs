//! Entry point: serve the job-control API, or run one job and exit with the
//! contract code (0 succeeded, 1 failed, 2 cancelled, 3 already running).

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use graph_store::GraphStore;
use ingest_pipeline::{JobState, Orchestrator, PipelineConfig, PipelineError, StartRequest};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env when present.
    dotenvy::dotenv().ok();
    init_tracing();

    match std::env::var("RUN_MODE").as_deref() {
        Ok("once") => run_once().await,
        _ => match api::start().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("server failed: {err}");
                ExitCode::FAILURE
            }
        },
    }
}

/// One-shot run for CLI and cron use.
async fn run_once() -> ExitCode {
    match try_run_once().await {
        Ok(state) => ExitCode::from(state.exit_code() as u8),
        Err(PipelineError::JobAlreadyRunning) => ExitCode::from(3),
        Err(err) => {
            error!("run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn try_run_once() -> Result<JobState, PipelineError> {
    let cfg = Arc::new(PipelineConfig::from_env()?);
    let store = GraphStore::connect(cfg.store.clone()).await?;
    let orchestrator = Arc::new(Orchestrator::new(cfg, store));

    let req = StartRequest {
        profile: std::env::var("RUN_PROFILE").ok(),
        subpath: std::env::var("RUN_SUBPATH").ok(),
        reset_graph: None,
        strict: None,
    };
    orchestrator.run_once(req).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(io::stdout().is_terminal())
        .init();
}
