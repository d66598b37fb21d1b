//! Job lifecycle: records, legal state transitions, and the single-job lock.
//!
//! At most one job runs per process. The lock is an atomic compare-exchange
//! taken before any work; a losing `start` is rejected with
//! `JobAlreadyRunning` without touching the store.

use crate::audit::AuditReport;
use crate::errors::{PipelineError, Result};
use crate::telemetry::StageTelemetry;

use chrono::{DateTime, Utc};
use repo_scan::Profile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Cancelled,
    Failed,
    Succeeded,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Cancelled => "CANCELLED",
            JobState::Failed => "FAILED",
            JobState::Succeeded => "SUCCEEDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cancelled | JobState::Failed | JobState::Succeeded)
    }

    /// CLI exit code contract: 0 success, 1 failed, 2 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobState::Succeeded => 0,
            JobState::Failed => 1,
            JobState::Cancelled => 2,
            JobState::Pending | JobState::Running => 1,
        }
    }
}

/// Everything `status(job_id)` exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub profile: Profile,
    pub subpath: Option<String>,
    pub strict: bool,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageTelemetry>,
    /// First fatal error, if any.
    pub error: Option<String>,
    /// Name of the breached invariant when state is FAILED for that reason.
    pub invariant: Option<String>,
}

impl JobRecord {
    fn new(id: Uuid, profile: Profile, subpath: Option<String>, strict: bool) -> Self {
        Self {
            id,
            profile,
            subpath,
            strict,
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            stages: Vec::new(),
            error: None,
            invariant: None,
        }
    }

    /// Legal transitions only; anything else is a bug surfaced loudly.
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        let legal = matches!(
            (self.state, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Cancelled)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::Succeeded)
        );
        if !legal {
            return Err(PipelineError::Stage(format!(
                "illegal job transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            )));
        }
        match next {
            JobState::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.ended_at = Some(Utc::now()),
            _ => {}
        }
        self.state = next;
        Ok(())
    }
}

/// Owns every job record, the stop flags and the single-run lock.
pub struct JobManager {
    running: AtomicBool,
    jobs: RwLock<HashMap<Uuid, Arc<Mutex<JobRecord>>>>,
    stop_flags: RwLock<HashMap<Uuid, Arc<AtomicBool>>>,
    last_report: RwLock<Option<AuditReport>>,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            jobs: RwLock::new(HashMap::new()),
            stop_flags: RwLock::new(HashMap::new()),
            last_report: RwLock::new(None),
        }
    }

    /// Take the run lock and register a new job. Fails fast when a job is
    /// already running.
    pub fn begin(
        &self,
        profile: Profile,
        subpath: Option<String>,
        strict: bool,
    ) -> Result<(Arc<Mutex<JobRecord>>, Arc<AtomicBool>)> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("jobs: start rejected, another job is running");
            return Err(PipelineError::JobAlreadyRunning);
        }

        let id = Uuid::new_v4();
        let record = Arc::new(Mutex::new(JobRecord::new(id, profile, subpath, strict)));
        let stop = Arc::new(AtomicBool::new(false));
        self.jobs.write().expect("jobs lock").insert(id, record.clone());
        self.stop_flags.write().expect("stop lock").insert(id, stop.clone());
        info!("jobs: registered {} ({})", id, profile.as_str());
        Ok((record, stop))
    }

    /// Release the run lock once the job reaches a terminal state.
    pub fn release(&self, id: Uuid) {
        self.running.store(false, Ordering::SeqCst);
        info!("jobs: released lock after {id}");
    }

    /// Cooperative stop. Returns whether the job existed and was running.
    pub fn stop(&self, id: Uuid) -> bool {
        let flags = self.stop_flags.read().expect("stop lock");
        let Some(flag) = flags.get(&id) else {
            return false;
        };
        let is_running = self
            .snapshot(id)
            .map(|r| r.state == JobState::Running || r.state == JobState::Pending)
            .unwrap_or(false);
        if is_running {
            flag.store(true, Ordering::SeqCst);
            info!("jobs: stop requested for {id}");
        }
        is_running
    }

    pub fn snapshot(&self, id: Uuid) -> Option<JobRecord> {
        let jobs = self.jobs.read().expect("jobs lock");
        jobs.get(&id).map(|r| r.lock().expect("job lock").clone())
    }

    pub fn set_last_report(&self, report: AuditReport) {
        *self.last_report.write().expect("report lock") = Some(report);
    }

    pub fn last_report(&self) -> Option<AuditReport> {
        self.last_report.read().expect("report lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_is_rejected_while_running() {
        let manager = JobManager::new();
        let (first, _stop) = manager.begin(Profile::Delta, None, false).unwrap();
        let err = manager.begin(Profile::Delta, None, false).unwrap_err();
        assert!(matches!(err, PipelineError::JobAlreadyRunning));

        let id = first.lock().unwrap().id;
        manager.release(id);
        manager.begin(Profile::Quick, None, false).unwrap();
    }

    #[test]
    fn transitions_enforce_the_state_machine() {
        let manager = JobManager::new();
        let (record, _stop) = manager.begin(Profile::Delta, None, false).unwrap();
        let mut job = record.lock().unwrap();
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Succeeded).unwrap();
        assert!(job.transition(JobState::Running).is_err());
        assert!(job.ended_at.is_some());
    }

    #[test]
    fn cancelled_is_not_failed() {
        let manager = JobManager::new();
        let (record, stop) = manager.begin(Profile::Delta, None, false).unwrap();
        {
            let mut job = record.lock().unwrap();
            job.transition(JobState::Running).unwrap();
        }
        let id = record.lock().unwrap().id;
        assert!(manager.stop(id));
        assert!(stop.load(Ordering::SeqCst));
        record.lock().unwrap().transition(JobState::Cancelled).unwrap();
        assert_eq!(manager.snapshot(id).unwrap().state, JobState::Cancelled);
        assert_eq!(manager.snapshot(id).unwrap().state.exit_code(), 2);
    }

    #[test]
    fn stop_on_unknown_job_is_false() {
        let manager = JobManager::new();
        assert!(!manager.stop(Uuid::new_v4()));
    }
}
