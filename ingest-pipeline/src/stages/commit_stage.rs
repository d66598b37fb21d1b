//! Stage 2: commit backbone — Commit/Author nodes, TOUCHED edges, the
//! first-parent chain, and the PipelineState upper bound.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::Result;
use crate::stages::now_iso;
use crate::telemetry::{StageId, StageTelemetry};

use git_history::{CommitRecord, chain_pairs, extract_commits, latest_hash};
use graph_store::{EdgeSpec, EdgeType, GraphStore, NodeLabel};
use serde_json::{Value, json};
use tracing::info;

pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::Commits);

    let since = artifacts
        .plan
        .as_ref()
        .and_then(|p| p.since_commit.clone());
    let commits = extract_commits(
        &ctx.cfg.repo_root,
        since.as_deref(),
        ctx.cfg.max_workers,
    )
    .await?;

    t.set("commits_extracted", commits.len() as i64);
    if commits.is_empty() {
        artifacts.commits = commits;
        return Ok(t.finish());
    }

    let created_at = now_iso();
    let mut touched_edges = 0usize;

    for batch in commits.chunks(ctx.cfg.commit_batch_size) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }

        let commit_rows: Vec<Value> = batch.iter().map(|c| commit_row(c, &created_at)).collect();
        store.batch_upsert_nodes(NodeLabel::Commit, &commit_rows).await?;

        let author_rows: Vec<Value> = batch
            .iter()
            .map(|c| {
                json!({
                    "email": c.author_email,
                    "name": c.author_name,
                    "created_at": created_at,
                })
            })
            .collect();
        store.batch_upsert_nodes(NodeLabel::Author, &author_rows).await?;

        let authored: Vec<Value> = batch
            .iter()
            .map(|c| {
                json!({
                    "from": c.author_email,
                    "to": c.hash,
                    "props": {"created_at": created_at, "timestamp": c.timestamp},
                })
            })
            .collect();
        store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::Authored, NodeLabel::Author, NodeLabel::Commit),
                &authored,
            )
            .await?;

        let touched: Vec<Value> = batch
            .iter()
            .flat_map(|c| {
                let created_at = created_at.clone();
                c.changes.iter().map(move |ch| {
                    json!({
                        "from": c.hash,
                        "to": ch.path,
                        "props": {
                            "status": ch.status.as_str(),
                            "old_path": ch.old_path,
                            "timestamp": c.timestamp,
                            "created_at": created_at,
                        },
                    })
                })
            })
            .collect();
        touched_edges += store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::Touched, NodeLabel::Commit, NodeLabel::File),
                &touched,
            )
            .await?;
    }
    t.set("touched_edges", touched_edges as i64);

    // Chain post-step: the doubly-linked first-parent lineage.
    if !t.stopped_early {
        let pairs = chain_pairs(&commits);
        let by_hash: std::collections::HashMap<&str, &CommitRecord> =
            commits.iter().map(|c| (c.hash.as_str(), c)).collect();

        let next_rows: Vec<Value> = pairs
            .iter()
            .map(|(parent, child)| {
                let ts = by_hash.get(child.as_str()).map(|c| c.timestamp.clone());
                json!({
                    "from": parent,
                    "to": child,
                    "props": {"timestamp": ts, "created_at": created_at},
                })
            })
            .collect();
        let prev_rows: Vec<Value> = pairs
            .iter()
            .map(|(parent, child)| {
                let ts = by_hash.get(child.as_str()).map(|c| c.timestamp.clone());
                json!({
                    "from": child,
                    "to": parent,
                    "props": {"timestamp": ts, "created_at": created_at},
                })
            })
            .collect();
        for batch in next_rows.chunks(ctx.cfg.commit_batch_size) {
            store
                .batch_upsert_edges(
                    EdgeSpec::new(EdgeType::NextCommit, NodeLabel::Commit, NodeLabel::Commit),
                    batch,
                )
                .await?;
        }
        for batch in prev_rows.chunks(ctx.cfg.commit_batch_size) {
            store
                .batch_upsert_edges(
                    EdgeSpec::new(EdgeType::PrevCommit, NodeLabel::Commit, NodeLabel::Commit),
                    batch,
                )
                .await?;
        }
        t.set("chain_pairs", pairs.len() as i64);
    }

    // Temporal upper bound for later stages.
    if let Some(hash) = latest_hash(&commits) {
        store
            .run(
                "MERGE (p:PipelineState {id: 'singleton'}) \
                 SET p.latest_hash = $hash, p.updated_at = $now",
                vec![("hash", json!(hash)), ("now", json!(created_at))],
            )
            .await?;
        artifacts.latest_hash = Some(hash);
    }

    info!("commits: ingested {} commit(s)", commits.len());
    artifacts.commits = commits;
    Ok(t.finish())
}

fn commit_row(c: &CommitRecord, created_at: &str) -> Value {
    json!({
        "hash": c.hash,
        "timestamp": c.timestamp,
        "author": c.author_name,
        "author_email": c.author_email,
        "message": c.message,
        "parents": c.parents,
        "created_at": created_at,
    })
}
