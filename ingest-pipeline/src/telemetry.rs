//! Per-stage telemetry records surfaced on the job status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error samples kept per stage; the rest is only counted.
pub const MAX_ERROR_SAMPLES: usize = 10;

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Scan,
    Commits,
    Chunks,
    Symbols,
    Sprints,
    CrossRef,
    Derive,
    Cleanup,
    Audit,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Scan => "scan",
            StageId::Commits => "commits",
            StageId::Chunks => "chunks",
            StageId::Symbols => "symbols",
            StageId::Sprints => "sprints",
            StageId::CrossRef => "cross_ref",
            StageId::Derive => "derive",
            StageId::Cleanup => "cleanup",
            StageId::Audit => "audit",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSample {
    pub kind: String,
    /// The failing input (path, commit, chunk id).
    pub input: String,
    pub detail: String,
}

/// Telemetry for one stage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTelemetry {
    pub stage: StageId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub counters: BTreeMap<String, i64>,
    pub errors: Vec<ErrorSample>,
    /// Total error count, including unsampled ones.
    pub errors_total: u64,
    /// Set when the stage observed the stop flag and wound down early.
    pub stopped_early: bool,
}

impl StageTelemetry {
    pub fn begin(stage: StageId) -> Self {
        Self {
            stage,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: 0,
            counters: BTreeMap::new(),
            errors: Vec::new(),
            errors_total: 0,
            stopped_early: false,
        }
    }

    pub fn finish(mut self) -> Self {
        let now = Utc::now();
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.ended_at = Some(now);
        self
    }

    pub fn count(&mut self, key: &str, delta: i64) {
        *self.counters.entry(key.to_string()).or_insert(0) += delta;
    }

    pub fn set(&mut self, key: &str, value: i64) {
        self.counters.insert(key.to_string(), value);
    }

    pub fn record_error(&mut self, kind: &str, input: &str, detail: impl ToString) {
        self.errors_total += 1;
        if self.errors.len() < MAX_ERROR_SAMPLES {
            self.errors.push(ErrorSample {
                kind: kind.to_string(),
                input: input.to_string(),
                detail: detail.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut t = StageTelemetry::begin(StageId::Scan);
        t.count("files", 2);
        t.count("files", 3);
        assert_eq!(t.counters["files"], 5);
    }

    #[test]
    fn error_samples_are_bounded() {
        let mut t = StageTelemetry::begin(StageId::Chunks);
        for i in 0..25 {
            t.record_error("parse", &format!("file{i}.py"), "boom");
        }
        assert_eq!(t.errors.len(), MAX_ERROR_SAMPLES);
        assert_eq!(t.errors_total, 25);
    }

    #[test]
    fn finish_stamps_duration() {
        let t = StageTelemetry::begin(StageId::Audit).finish();
        assert!(t.ended_at.is_some());
    }
}
