//! The orchestrator: stage scheduling, job lifecycle, stop propagation.
//!
//! One orchestrator thread drives the stages sequentially; stages use their
//! own bounded worker pools internally. A stage failure is captured on the
//! job record and later stages degrade gracefully unless `strict` is set.
//! Invariant violations abort regardless.

use crate::audit::{AuditReport, audit};
use crate::cleanup;
use crate::config::PipelineConfig;
use crate::context::{RunArtifacts, RunContext};
use crate::errors::{PipelineError, Result};
use crate::job::{JobManager, JobRecord, JobState};
use crate::stages::derive_stage::{self, DeriveOptions, DeriveOutcome};
use crate::stages::{chunk_stage, commit_stage, scan_stage, sprint_stage, symbol_stage, xref_stage};
use crate::telemetry::{StageId, StageTelemetry};

use graph_store::GraphStore;
use repo_scan::{Profile, RepoManifest};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    pub profile: Option<String>,
    pub subpath: Option<String>,
    pub reset_graph: Option<bool>,
    pub strict: Option<bool>,
}

/// Cloning shares the config, store pool and job table.
#[derive(Clone)]
pub struct Orchestrator {
    cfg: Arc<PipelineConfig>,
    store: GraphStore,
    manager: Arc<JobManager>,
}

impl Orchestrator {
    pub fn new(cfg: Arc<PipelineConfig>, store: GraphStore) -> Self {
        Self {
            cfg,
            store,
            manager: Arc::new(JobManager::new()),
        }
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// Register a job and run it in the background. Rejects with
    /// `JobAlreadyRunning` before any work when the lock is taken.
    pub fn start(&self, req: StartRequest) -> Result<Uuid> {
        let profile = match req.profile.as_deref() {
            None => Profile::Delta,
            Some(p) => Profile::parse(p)
                .ok_or_else(|| PipelineError::Config(format!("unknown profile: {p}")))?,
        };
        let strict = req.strict.unwrap_or(false);
        let (record, stop) = self.manager.begin(profile, req.subpath.clone(), strict)?;
        let id = record.lock().expect("job lock").id;

        let this = self.clone();
        tokio::spawn(async move {
            this.run_job(record, stop, req.reset_graph.unwrap_or(false))
                .await;
        });
        Ok(id)
    }

    /// One-shot execution for the CLI wrapper: start, wait, return the final
    /// state.
    pub async fn run_once(&self, req: StartRequest) -> Result<JobState> {
        let id = self.start(req)?;
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            if let Some(snapshot) = self.manager.snapshot(id) {
                if snapshot.state.is_terminal() {
                    return Ok(snapshot.state);
                }
            }
        }
    }

    pub fn status(&self, id: Uuid) -> Result<JobRecord> {
        self.manager.snapshot(id).ok_or(PipelineError::UnknownJob(id))
    }

    pub fn stop(&self, id: Uuid) -> bool {
        self.manager.stop(id)
    }

    pub async fn audit_now(&self) -> Result<AuditReport> {
        let report = audit(&self.store, &self.cfg.audit_weights).await?;
        self.manager.set_last_report(report.clone());
        Ok(report)
    }

    /// On-demand derivation, sharing the pipeline implementation.
    pub async fn derive(&self, opts: DeriveOptions) -> Result<DeriveOutcome> {
        let ctx = RunContext::new(
            Arc::clone(&self.cfg),
            Profile::Delta,
            None,
            false,
            Arc::new(AtomicBool::new(false)),
        );
        derive_stage::run_derivation(&self.store, &ctx, opts).await
    }

    async fn run_job(
        &self,
        record: Arc<Mutex<JobRecord>>,
        stop: Arc<AtomicBool>,
        reset_graph: bool,
    ) {
        let id = record.lock().expect("job lock").id;
        let final_state = self
            .drive_stages(&record, stop, reset_graph)
            .await
            .unwrap_or_else(|err| {
                error!("job {id}: fatal: {err}");
                let mut job = record.lock().expect("job lock");
                job.error = Some(err.to_string());
                if let PipelineError::InvariantViolation { invariant } = &err {
                    job.invariant = Some(invariant.clone());
                }
                JobState::Failed
            });

        {
            let mut job = record.lock().expect("job lock");
            if let Err(err) = job.transition(final_state) {
                warn!("job {id}: {err}");
            }
        }
        self.manager.release(id);
        info!("job {id}: finished {}", final_state.as_str());
    }

    async fn drive_stages(
        &self,
        record: &Arc<Mutex<JobRecord>>,
        stop: Arc<AtomicBool>,
        reset_graph: bool,
    ) -> Result<JobState> {
        let (profile, subpath, strict) = {
            let mut job = record.lock().expect("job lock");
            job.transition(JobState::Running)?;
            (job.profile, job.subpath.clone(), job.strict)
        };

        if reset_graph || self.cfg.reset_graph {
            self.store.wipe().await?;
        }
        self.store.apply_schema().await?;

        let ctx = RunContext::new(Arc::clone(&self.cfg), profile, subpath, strict, stop);
        let mut artifacts = RunArtifacts::default();

        // The quick profile is commits + symbols only.
        let full_content = profile != Profile::Quick;
        let stages: Vec<(StageId, bool)> = vec![
            (StageId::Scan, true),
            (StageId::Commits, true),
            (StageId::Chunks, full_content),
            (StageId::Symbols, true),
            (StageId::Sprints, full_content),
            (StageId::CrossRef, full_content),
            (StageId::Derive, true),
            (StageId::Cleanup, true),
        ];

        let mut degraded = false;
        for (stage, enabled) in stages {
            if !enabled {
                continue;
            }
            if ctx.stop_requested() {
                return Ok(JobState::Cancelled);
            }

            let outcome = self.run_stage(stage, &ctx, &mut artifacts).await;
            match outcome {
                Ok(telemetry) => {
                    let stopped = telemetry.stopped_early;
                    record.lock().expect("job lock").stages.push(telemetry);
                    if stopped {
                        return Ok(JobState::Cancelled);
                    }
                }
                Err(err @ PipelineError::InvariantViolation { .. }) => return Err(err),
                Err(err) => {
                    warn!("stage {stage} failed: {err}");
                    degraded = true;
                    let mut t = StageTelemetry::begin(stage);
                    t.record_error("stage_failed", stage.as_str(), &err);
                    let mut job = record.lock().expect("job lock");
                    job.stages.push(t.finish());
                    if job.error.is_none() {
                        job.error = Some(err.to_string());
                    }
                    if strict {
                        return Ok(JobState::Failed);
                    }
                }
            }
        }

        if ctx.stop_requested() {
            return Ok(JobState::Cancelled);
        }

        // Persist the manifest so the next delta run has a baseline.
        if let Some(inventory) = &artifacts.inventory {
            let last = artifacts
                .latest_hash
                .clone()
                .or_else(|| artifacts.plan.as_ref().and_then(|p| p.since_commit.clone()));
            let manifest = RepoManifest::from_inventory(inventory, last);
            if let Err(err) = manifest.save(&self.cfg.manifest_path()) {
                warn!("manifest save failed: {err}");
            }
        }

        // Always audit what we have; the report is part of the job's value.
        match audit(&self.store, &self.cfg.audit_weights).await {
            Ok(report) => {
                let mut t = StageTelemetry::begin(StageId::Audit);
                t.set("quality_score", report.quality_score as i64);
                record.lock().expect("job lock").stages.push(t.finish());
                self.manager.set_last_report(report);
            }
            Err(err) => warn!("audit failed: {err}"),
        }

        if degraded {
            info!("job finished with degraded stages");
        }
        Ok(JobState::Succeeded)
    }

    async fn run_stage(
        &self,
        stage: StageId,
        ctx: &RunContext,
        artifacts: &mut RunArtifacts,
    ) -> Result<StageTelemetry> {
        info!("stage {stage}: start");
        match stage {
            StageId::Scan => scan_stage::run(ctx, &self.store, artifacts).await,
            StageId::Commits => commit_stage::run(ctx, &self.store, artifacts).await,
            StageId::Chunks => chunk_stage::run(ctx, &self.store, artifacts).await,
            StageId::Symbols => symbol_stage::run(ctx, &self.store, artifacts).await,
            StageId::Sprints => sprint_stage::run(ctx, &self.store, artifacts).await,
            StageId::CrossRef => xref_stage::run(ctx, &self.store, artifacts).await,
            StageId::Derive => derive_stage::run(ctx, &self.store, artifacts).await,
            StageId::Cleanup => cleanup::run(ctx, &self.store, artifacts).await,
            StageId::Audit => unreachable!("audit runs outside the stage loop"),
        }
    }
}
