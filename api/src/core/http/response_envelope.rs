//! Uniform JSON error envelope for the job-control surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ingest_pipeline::PipelineError;
use serde_json::json;

/// Map pipeline errors onto HTTP statuses. `JobAlreadyRunning` is a
/// conflict, unknown jobs are 404, config problems are the caller's fault.
pub fn error_response(err: PipelineError) -> Response {
    let status = match &err {
        PipelineError::JobAlreadyRunning => StatusCode::CONFLICT,
        PipelineError::UnknownJob(_) => StatusCode::NOT_FOUND,
        PipelineError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}
