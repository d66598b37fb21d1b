use crate::core::app_state::AppState;
use crate::core::http::response_envelope::error_response;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

/// `GET /jobs/{job_id}` — full job record: state, stage telemetry, errors.
pub async fn job_status(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    match state.orchestrator.status(job_id) {
        Ok(record) => Json(record).into_response(),
        Err(err) => error_response(err),
    }
}
