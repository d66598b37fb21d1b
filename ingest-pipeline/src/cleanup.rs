//! End-of-run cleanup: files the manifest no longer lists are removed with
//! their chunks, symbols and edges; watermarks whose basis is gone go too.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::Result;
use crate::telemetry::{StageId, StageTelemetry};

use graph_store::GraphStore;
use serde_json::{Value, json};
use tracing::info;

pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::Cleanup);

    let deleted: Vec<String> = artifacts
        .plan
        .as_ref()
        .map(|p| p.deleted.clone())
        .unwrap_or_default();
    t.set("files_deleted", deleted.len() as i64);

    if !deleted.is_empty() && !ctx.stop_requested() {
        let paths: Vec<Value> = deleted.iter().map(|p| json!(p)).collect();
        store
            .run(
                "UNWIND $paths AS p \
                 MATCH (f:File {path: p}) \
                 OPTIONAL MATCH (f)-[:CONTAINS_CHUNK]->(c:Chunk) \
                 OPTIONAL MATCH (s:Symbol)-[:DEFINED_IN]->(f) \
                 DETACH DELETE c, s, f",
                vec![("paths", Value::Array(paths))],
            )
            .await?;
        info!("cleanup: removed {} deleted file(s)", deleted.len());
    }

    // Watermarks without any commits behind them are meaningless.
    let commit_count = store
        .fetch_count("MATCH (c:Commit) RETURN count(c) AS n", vec![])
        .await?;
    if commit_count == 0 {
        store
            .run("MATCH (w:DerivationWatermark) DELETE w", vec![])
            .await?;
        t.set("watermarks_removed", 1);
    }

    Ok(t.finish())
}
