//! Stage 5: Sprint nodes, window attachment, and per-sprint file rollups.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::Result;
use crate::stages::now_iso;
use crate::telemetry::{StageId, StageTelemetry};

use graph_store::{EdgeSpec, EdgeType, GraphStore, NodeLabel};
use serde_json::{Value, json};
use sprint_map::discover_sprints;
use tracing::info;

pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    _artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::Sprints);

    let root = ctx.cfg.repo_root.clone();
    let docs_roots = ctx.cfg.docs_roots.clone();
    let sprints = tokio::task::spawn_blocking(move || discover_sprints(&root, &docs_roots))
        .await
        .unwrap_or_default();
    t.set("sprints", sprints.len() as i64);
    if sprints.is_empty() {
        return Ok(t.finish());
    }

    let created_at = now_iso();
    let rows: Vec<Value> = sprints
        .iter()
        .map(|s| {
            json!({
                "number": s.number,
                "title": s.title,
                "start": s.start,
                "end": s.end,
                "folder": s.folder,
                "created_at": created_at,
            })
        })
        .collect();
    store.batch_upsert_nodes(NodeLabel::Sprint, &rows).await?;

    // Window attachment needs every commit, not just this run's delta.
    let commit_rows = store
        .fetch_maps(
            "MATCH (c:Commit) RETURN c.hash AS hash, c.timestamp AS ts",
            vec![],
            &["hash", "ts"],
        )
        .await?;

    let mut includes = 0usize;
    let mut contains_docs = 0usize;
    for sprint in &sprints {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }

        let included: Vec<Value> = commit_rows
            .iter()
            .filter_map(|row| {
                let hash = row.get("hash")?.as_str()?;
                let ts = row.get("ts")?.as_str()?;
                sprint.contains(ts).then(|| {
                    json!({
                        "from": sprint.number,
                        "to": hash,
                        "props": {"created_at": created_at, "timestamp": ts},
                    })
                })
            })
            .collect();
        includes += store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::Includes, NodeLabel::Sprint, NodeLabel::Commit),
                &included,
            )
            .await?;

        let doc_rows: Vec<Value> = sprint
            .docs
            .iter()
            .map(|doc| {
                json!({
                    "from": sprint.number,
                    "to": doc,
                    "props": {"created_at": created_at},
                })
            })
            .collect();
        contains_docs += store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::ContainsDoc, NodeLabel::Sprint, NodeLabel::Document),
                &doc_rows,
            )
            .await?;

        // Roll TOUCHED up to the sprint window.
        store
            .run(
                "MATCH (s:Sprint {number: $number})-[:INCLUDES]->(:Commit)-[:TOUCHED]->(f:File) \
                 WITH s, f, count(*) AS w \
                 MERGE (s)-[r:INVOLVES_FILE]->(f) \
                 SET r.weight = w, r.timestamp = s.start, r.created_at = $now",
                vec![
                    ("number", json!(sprint.number)),
                    ("now", json!(created_at)),
                ],
            )
            .await?;
    }

    t.set("includes_edges", includes as i64);
    t.set("contains_doc_edges", contains_docs as i64);
    info!("sprints: {} sprint(s) attached", sprints.len());
    Ok(t.finish())
}
