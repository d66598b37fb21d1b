use crate::core::app_state::AppState;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

/// `POST /jobs/{job_id}/stop` — request cooperative cancellation.
///
/// The flag is observed at stage suspension points; a stopped job ends in
/// state CANCELLED.
pub async fn stop_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    let acknowledged = state.orchestrator.stop(job_id);
    Json(json!({"acknowledged": acknowledged})).into_response()
}
