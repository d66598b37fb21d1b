//! Stage implementations. The orchestrator runs these sequentially; every
//! stage owns its batching, stop-flag checks and telemetry.

pub mod chunk_stage;
pub mod commit_stage;
pub mod derive_stage;
pub mod scan_stage;
pub mod sprint_stage;
pub mod symbol_stage;
pub mod xref_stage;

use chrono::Utc;

/// RFC3339 UTC timestamp for `created_at` properties.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339()
}
