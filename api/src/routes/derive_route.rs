use crate::core::app_state::AppState;
use crate::core::http::response_envelope::error_response;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use ingest_pipeline::DeriveOptions;

/// `POST /derive` — run relationship derivation on demand.
///
/// Body: `{since?, dry_run?, strategies?}`.
pub async fn derive_relationships(
    State(state): State<AppState>,
    Json(opts): Json<DeriveOptions>,
) -> Response {
    match state.orchestrator.derive(opts).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => error_response(err),
    }
}
