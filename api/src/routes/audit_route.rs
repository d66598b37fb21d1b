use crate::core::app_state::AppState;
use crate::core::http::response_envelope::error_response;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// `POST /audit` — run the auditor on demand.
pub async fn run_audit(State(state): State<AppState>) -> Response {
    match state.orchestrator.audit_now().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /report` — the last successful audit report.
pub async fn last_report(State(state): State<AppState>) -> Response {
    match state.orchestrator.manager().last_report() {
        Some(report) => Json(report).into_response(),
        None => Json(json!({"report": null})).into_response(),
    }
}
