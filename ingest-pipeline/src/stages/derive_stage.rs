//! Stage 7: evidence-based relationship derivation.
//!
//! Consults the per-family derivation watermarks, accumulates evidence from
//! commits, documents, code comments and the imports graph, combines it with
//! noisy-or, and writes the surviving edges plus Requirement nodes. The
//! watermarks advance atomically on success; a dry run computes everything
//! and writes nothing.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::Result;
use crate::stages::now_iso;
use crate::telemetry::{StageId, StageTelemetry};

use chrono::Utc;
use graph_derive::{
    ChunkInput, CommitInput, DerivedEdge, EvidenceAccumulator, RelKind, apply_code_comments,
    apply_commit_mentions, apply_depends_on, apply_doc_mentions, apply_evolves,
    collect_requirements,
};
use graph_store::{EdgeSpec, EdgeType, GraphStore, NodeLabel, Params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const FAMILIES: &[(&str, RelKind)] = &[
    ("implements", RelKind::Implements),
    ("evolves_from", RelKind::EvolvesFrom),
    ("depends_on", RelKind::DependsOn),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveOptions {
    /// Override the stored watermarks with an explicit lower bound.
    pub since: Option<String>,
    pub dry_run: bool,
    /// Family names to run; `None` means all.
    pub strategies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeriveOutcome {
    pub derived_counts: BTreeMap<String, i64>,
    pub confidence_stats: ConfidenceStats,
    pub duration_ms: u64,
    pub dry_run: bool,
}

/// Stage wrapper around [`run_derivation`].
pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    _artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::Derive);
    let outcome = run_derivation(store, ctx, DeriveOptions::default()).await?;
    for (kind, count) in &outcome.derived_counts {
        t.set(&format!("edges_{kind}"), *count);
    }
    t.set("confidence_count", outcome.confidence_stats.count as i64);
    if ctx.stop_requested() {
        t.stopped_early = true;
    }
    Ok(t.finish())
}

/// Full derivation pass, also exposed on the job-control surface.
pub async fn run_derivation(
    store: &GraphStore,
    ctx: &RunContext,
    opts: DeriveOptions,
) -> Result<DeriveOutcome> {
    let started = Utc::now();
    let enabled = |family: &str| {
        opts.strategies
            .as_ref()
            .map(|list| list.iter().any(|s| s == family))
            .unwrap_or(true)
    };

    // Per-family lower bounds (explicit `since` overrides the stored rows).
    let mut watermarks: BTreeMap<String, Option<String>> = BTreeMap::new();
    for (family, _) in FAMILIES {
        let value = match &opts.since {
            Some(s) => Some(s.clone()),
            None => read_watermark(store, family).await?,
        };
        watermarks.insert((*family).to_string(), value);
    }

    // Evidence inputs.
    let commits = fetch_commits(store).await?;
    let doc_chunks = fetch_chunks(store, "doc").await?;
    let code_chunks = fetch_chunks(store, "code").await?;
    let known_files = fetch_paths(store).await?;
    debug!(
        "derive: {} commit(s), {} doc chunk(s), {} code chunk(s)",
        commits.len(),
        doc_chunks.len(),
        code_chunks.len()
    );

    let mut acc = EvidenceAccumulator::new();

    if enabled("implements") {
        let since = watermarks["implements"].as_deref();
        let fresh: Vec<CommitInput> = commits
            .iter()
            .filter(|c| is_after(&c.timestamp, since))
            .cloned()
            .collect();
        apply_commit_mentions(&mut acc, &fresh);
        apply_doc_mentions(&mut acc, &doc_chunks, &known_files);
        apply_code_comments(&mut acc, &code_chunks);
    }
    if enabled("evolves_from") {
        let since = watermarks["evolves_from"].as_deref();
        let fresh: Vec<CommitInput> = commits
            .iter()
            .filter(|c| is_after(&c.timestamp, since))
            .cloned()
            .collect();
        apply_evolves(&mut acc, &fresh);
    }
    if enabled("depends_on") {
        // This run's candidates plus already-persisted IMPLEMENTS targets.
        let mut implements = acc.pairs(RelKind::Implements);
        for (req, file) in fetch_implements(store).await? {
            implements.entry(req).or_default().insert(file);
        }
        let imports = fetch_imports(store).await?;
        apply_depends_on(&mut acc, &implements, &imports);
    }

    let requirements = collect_requirements(&commits, &doc_chunks, &code_chunks);
    let edges = acc.finalize(ctx.cfg.min_confidence);

    let mut outcome = DeriveOutcome {
        dry_run: opts.dry_run,
        ..DeriveOutcome::default()
    };
    for edge in &edges {
        *outcome
            .derived_counts
            .entry(edge.kind.as_str().to_string())
            .or_insert(0) += 1;
    }
    outcome.confidence_stats = confidence_stats(&edges);

    if !opts.dry_run && !ctx.stop_requested() {
        write_requirements(store, &requirements).await?;
        write_edges(store, &edges, ctx.cfg.chunk_batch_size).await?;
        advance_watermarks(store, &commits, &opts).await?;
    }

    outcome.duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
    info!(
        "derive: {} edge(s) across {} kind(s){}",
        edges.len(),
        outcome.derived_counts.len(),
        if opts.dry_run { " (dry run)" } else { "" }
    );
    Ok(outcome)
}

async fn read_watermark(store: &GraphStore, family: &str) -> Result<Option<String>> {
    let rows = store
        .fetch_maps(
            "MATCH (w:DerivationWatermark {family: $family}) \
             RETURN w.last_processed_timestamp AS ts",
            vec![("family", json!(family))],
            &["ts"],
        )
        .await?;
    Ok(rows
        .first()
        .and_then(|r| r.get("ts"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

fn is_after(ts: &str, since: Option<&str>) -> bool {
    use chrono::DateTime;
    let Some(bound) = since else { return true };
    match (
        DateTime::parse_from_rfc3339(ts),
        DateTime::parse_from_rfc3339(bound),
    ) {
        (Ok(a), Ok(b)) => a > b,
        // Offsets vary; fall back to string order only when parsing fails.
        _ => ts > bound,
    }
}

async fn fetch_commits(store: &GraphStore) -> Result<Vec<CommitInput>> {
    let rows = store
        .fetch_maps(
            "MATCH (c:Commit) \
             OPTIONAL MATCH (c)-[:TOUCHED]->(f:File {kind: 'code'}) \
             RETURN c.hash AS hash, c.message AS message, c.timestamp AS ts, \
                    collect(f.path) AS files",
            vec![],
            &["hash", "message", "ts", "files"],
        )
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|r| {
            Some(CommitInput {
                hash: r.get("hash")?.as_str()?.to_string(),
                message: r.get("message")?.as_str().unwrap_or("").to_string(),
                timestamp: r.get("ts")?.as_str()?.to_string(),
                code_files: r
                    .get("files")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        })
        .collect())
}

async fn fetch_chunks(store: &GraphStore, kind: &str) -> Result<Vec<ChunkInput>> {
    let rows = store
        .fetch_maps(
            "MATCH (ch:Chunk {kind: $kind})-[:PART_OF]->(f:File) \
             RETURN ch.id AS id, f.path AS path, ch.text AS text",
            vec![("kind", json!(kind))],
            &["id", "path", "text"],
        )
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|r| {
            Some(ChunkInput {
                chunk_id: r.get("id")?.as_str()?.to_string(),
                file: r.get("path")?.as_str()?.to_string(),
                text: r.get("text")?.as_str()?.to_string(),
            })
        })
        .collect())
}

async fn fetch_paths(store: &GraphStore) -> Result<BTreeSet<String>> {
    let rows = store
        .fetch_maps("MATCH (f:File) RETURN f.path AS path", vec![], &["path"])
        .await?;
    Ok(rows
        .iter()
        .filter_map(|r| r.get("path").and_then(Value::as_str).map(str::to_string))
        .collect())
}

async fn fetch_implements(store: &GraphStore) -> Result<Vec<(String, String)>> {
    let rows = store
        .fetch_maps(
            "MATCH (r:Requirement)-[:IMPLEMENTS]->(f:File) \
             RETURN r.id AS id, f.path AS path",
            vec![],
            &["id", "path"],
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some((
                r.get("id")?.as_str()?.to_string(),
                r.get("path")?.as_str()?.to_string(),
            ))
        })
        .collect())
}

async fn fetch_imports(store: &GraphStore) -> Result<Vec<(String, String)>> {
    let rows = store
        .fetch_maps(
            "MATCH (a:File)-[:IMPORTS]->(b:File) RETURN a.path AS f, b.path AS t",
            vec![],
            &["f", "t"],
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some((
                r.get("f")?.as_str()?.to_string(),
                r.get("t")?.as_str()?.to_string(),
            ))
        })
        .collect())
}

async fn write_requirements(
    store: &GraphStore,
    requirements: &[graph_derive::RequirementRecord],
) -> Result<()> {
    let created_at = now_iso();
    let rows: Vec<Value> = requirements
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "title": r.title,
                "origin": r.origin,
                "created_at": created_at,
            })
        })
        .collect();
    store.batch_upsert_nodes(NodeLabel::Requirement, &rows).await?;
    Ok(())
}

async fn write_edges(store: &GraphStore, edges: &[DerivedEdge], batch_size: usize) -> Result<()> {
    let created_at = now_iso();
    let mut by_kind: BTreeMap<RelKind, Vec<Value>> = BTreeMap::new();
    for edge in edges {
        // Provenance is an opaque record; edge properties are flat, so it is
        // stored serialized.
        let provenance = serde_json::to_string(&edge.provenance).unwrap_or_default();
        by_kind.entry(edge.kind).or_default().push(json!({
            "from": edge.subject,
            "to": edge.object,
            "props": {
                "confidence": edge.confidence,
                "sources": edge.sources,
                "provenance": provenance,
                "first_seen_ts": edge.first_seen_ts,
                "last_seen_ts": edge.last_seen_ts,
                "created_at": created_at,
            },
        }));
    }

    for (kind, rows) in by_kind {
        let spec = match kind {
            RelKind::Implements => {
                EdgeSpec::new(EdgeType::Implements, NodeLabel::Requirement, NodeLabel::File)
            }
            RelKind::EvolvesFrom => EdgeSpec::new(
                EdgeType::EvolvesFrom,
                NodeLabel::Requirement,
                NodeLabel::Requirement,
            ),
            RelKind::DependsOn => EdgeSpec::new(
                EdgeType::DependsOn,
                NodeLabel::Requirement,
                NodeLabel::Requirement,
            ),
            RelKind::RelatesTo => {
                EdgeSpec::new(EdgeType::RelatesTo, NodeLabel::Requirement, NodeLabel::File)
            }
        };
        let stmt = derived_upsert_statement(&spec);
        for batch in rows.chunks(batch_size) {
            store
                .run(&stmt, vec![("rows", Value::Array(batch.to_vec()))])
                .await?;
        }
    }
    Ok(())
}

/// Monotone upsert for derived edges. A rerun past the watermark sees only a
/// subset of the original evidence; it must never lower a stored confidence
/// or shrink its sources. The SET items run in order, so the comparisons read
/// the pre-update confidence.
fn derived_upsert_statement(spec: &EdgeSpec) -> String {
    format!(
        "UNWIND $rows AS row \
         MATCH (a:{from} {{{fk}: row.from}}) \
         MATCH (b:{to} {{{tk}: row.to}}) \
         MERGE (a)-[r:{edge}]->(b) \
         ON CREATE SET r += row.props \
         ON MATCH SET \
           r.sources = CASE WHEN row.props.confidence > r.confidence \
                            THEN row.props.sources ELSE r.sources END, \
           r.provenance = CASE WHEN row.props.confidence > r.confidence \
                               THEN row.props.provenance ELSE r.provenance END, \
           r.last_seen_ts = CASE WHEN r.last_seen_ts IS NULL OR row.props.last_seen_ts > r.last_seen_ts \
                                 THEN coalesce(row.props.last_seen_ts, r.last_seen_ts) \
                                 ELSE r.last_seen_ts END, \
           r.confidence = CASE WHEN row.props.confidence > r.confidence \
                               THEN row.props.confidence ELSE r.confidence END",
        from = spec.from.as_str(),
        fk = spec.from.key_property(),
        to = spec.to.as_str(),
        tk = spec.to.key_property(),
        edge = spec.edge.as_str(),
    )
}

/// Advance every family watermark to the newest processed commit timestamp,
/// in one transaction.
async fn advance_watermarks(
    store: &GraphStore,
    commits: &[CommitInput],
    opts: &DeriveOptions,
) -> Result<()> {
    let Some(latest) = commits
        .iter()
        .max_by_key(|c| {
            chrono::DateTime::parse_from_rfc3339(&c.timestamp)
                .map(|dt| dt.timestamp())
                .unwrap_or(i64::MIN)
        })
        .map(|c| c.timestamp.clone())
    else {
        return Ok(());
    };
    let enabled = |family: &str| {
        opts.strategies
            .as_ref()
            .map(|list| list.iter().any(|s| s == family))
            .unwrap_or(true)
    };

    let mut statements: Vec<(String, Params)> = Vec::new();
    for (family, _) in FAMILIES {
        if !enabled(family) {
            continue;
        }
        statements.push((
            String::from(
                "MERGE (w:DerivationWatermark {family: $family}) \
                 SET w.last_processed_timestamp = $ts",
            ),
            vec![("family", json!(family)), ("ts", json!(latest.clone()))],
        ));
    }
    store.run_in_txn(statements).await?;
    Ok(())
}

fn confidence_stats(edges: &[DerivedEdge]) -> ConfidenceStats {
    if edges.is_empty() {
        return ConfidenceStats::default();
    }
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    let mut sum = 0.0;
    for e in edges {
        min = min.min(e.confidence);
        max = max.max(e.confidence);
        sum += e.confidence;
    }
    ConfidenceStats {
        count: edges.len(),
        min,
        max,
        mean: sum / edges.len() as f64,
    }
}
