//! Stage 1: inventory scan and delta planning, plus File node upserts.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::{PipelineError, Result};
use crate::stages::now_iso;
use crate::telemetry::{StageId, StageTelemetry};

use graph_store::{GraphStore, NodeLabel};
use repo_scan::{FileRecord, RepoManifest, ScanOptions};
use serde_json::{Value, json};
use tracing::info;

pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::Scan);

    let opts = ScanOptions {
        include_untracked: ctx.cfg.include_untracked,
        ..ScanOptions::default()
    };
    let root = ctx.cfg.repo_root.clone();
    let inventory = tokio::task::spawn_blocking(move || repo_scan::scan(&root, &opts))
        .await
        .map_err(|e| PipelineError::Stage(format!("scan worker: {e}")))??;

    // Stored paths must be repo-relative POSIX. A violation here would
    // poison every downstream key, so it aborts the job.
    if let Some(bad) = inventory
        .files
        .iter()
        .find(|f| f.path.contains('\\') || f.path.starts_with('/') || drive_prefixed(&f.path))
    {
        return Err(PipelineError::InvariantViolation {
            invariant: format!("path-normalization: {}", bad.path),
        });
    }

    t.set("files_scanned", inventory.files.len() as i64);
    t.set("decode_fallbacks", inventory.stats.decode_fallbacks as i64);
    t.set("skipped_too_large", inventory.stats.skipped_too_large as i64);
    t.set("binary", inventory.stats.binary as i64);

    let previous = RepoManifest::load(&ctx.cfg.manifest_path());
    let plan = repo_scan::plan(
        &inventory,
        previous.as_ref(),
        ctx.profile,
        ctx.subpath.as_deref(),
    );
    t.set("added", plan.added.len() as i64);
    t.set("modified", plan.modified.len() as i64);
    t.set("deleted", plan.deleted.len() as i64);
    t.set("unchanged", plan.unchanged.len() as i64);

    // File nodes for everything the plan will touch downstream.
    let created_at = now_iso();
    let rows: Vec<Value> = plan
        .files_to_process()
        .filter_map(|path| inventory.get(path))
        .map(|f| file_row(f, &created_at))
        .collect();

    let mut created = 0usize;
    for batch in rows.chunks(ctx.cfg.chunk_batch_size) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
        created += store.batch_upsert_nodes(NodeLabel::File, batch).await?;
    }
    t.set("files_upserted", created as i64);

    info!(
        "scan: {} file(s), {} to process",
        inventory.files.len(),
        rows.len()
    );
    artifacts.inventory = Some(inventory);
    artifacts.plan = Some(plan);
    Ok(t.finish())
}

fn drive_prefixed(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(c), Some(':')) if c.is_ascii_alphabetic()
    )
}

fn file_row(f: &FileRecord, created_at: &str) -> Value {
    json!({
        "path": f.path,
        "kind": f.kind.as_str(),
        "language": f.language,
        "size": f.size,
        "mtime": f.mtime,
        "content_hash": f.content_hash,
        // The store holds flat properties; the decoding record is flattened.
        "decoding_encoding": f.decoding.as_ref().map(|d| d.encoding.clone()),
        "decoding_fallback_used": f.decoding.as_ref().map(|d| d.fallback_used).unwrap_or(false),
        "decoding_replacement_chars": f.decoding.as_ref().map(|d| d.replacement_chars).unwrap_or(0),
        "created_at": created_at,
    })
}
