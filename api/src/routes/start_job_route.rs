use crate::core::app_state::AppState;
use crate::core::http::response_envelope::error_response;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use ingest_pipeline::StartRequest;
use serde_json::json;

/// `POST /jobs` — start a unified ingestion run.
///
/// Body: `{profile?: "full"|"delta"|"quick", subpath?, reset_graph?, strict?}`.
/// Returns `{job_id}` or 409 when a job is already running.
pub async fn start_job(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Response {
    match state.orchestrator.start(req) {
        Ok(job_id) => Json(json!({"job_id": job_id})).into_response(),
        Err(err) => error_response(err),
    }
}
