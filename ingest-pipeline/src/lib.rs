//! Knowledge-graph ingestion pipeline.
//!
//! Eight batch stages over a source repository — scan/plan, commits, chunks,
//! symbols, sprints, cross-references, derivation, cleanup — wrapped in a job
//! lifecycle with per-stage telemetry and a post-run auditor. All store
//! writes go through the `graph-store` adapter.

pub mod audit;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod errors;
pub mod job;
pub mod orchestrator;
pub mod stages;
pub mod telemetry;

pub use audit::{AuditReport, audit};
pub use config::{AuditWeights, PipelineConfig};
pub use context::{RunArtifacts, RunContext};
pub use errors::{PipelineError, Result};
pub use job::{JobManager, JobRecord, JobState};
pub use orchestrator::{Orchestrator, StartRequest};
pub use stages::derive_stage::{DeriveOptions, DeriveOutcome};
pub use telemetry::{ErrorSample, StageId, StageTelemetry};
