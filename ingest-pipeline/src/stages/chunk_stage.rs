//! Stage 3: chunking — heading-scoped doc chunks and symbol-scoped code
//! chunks, written with both ownership edges in the same batch.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::Result;
use crate::stages::now_iso;
use crate::telemetry::{StageId, StageTelemetry};

use chunk_prep::{ChunkKind, ChunkRecord, chunk_code, chunk_document, document_title};
use futures::StreamExt;
use graph_store::{EdgeSpec, EdgeType, GraphStore, NodeLabel};
use repo_scan::FileKind;
use serde_json::{Value, json};
use std::time::Duration;
use symbol_index::{LanguageKind, SymbolRecord, parse_symbols};
use tracing::{info, warn};

/// Per-file output of the parallel parse/chunk step.
struct FileOutcome {
    path: String,
    chunks: Vec<ChunkRecord>,
    symbols: Vec<SymbolRecord>,
    title: Option<String>,
    parse_error: Option<String>,
    timed_out: bool,
}

pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::Chunks);

    let (inventory, plan) = match (&artifacts.inventory, &artifacts.plan) {
        (Some(i), Some(p)) => (i, p),
        _ => {
            t.record_error("missing_input", "-", "scan stage did not run");
            return Ok(t.finish());
        }
    };

    // (path, kind, language, text) for every file needing chunking.
    let work: Vec<(String, FileKind, Option<LanguageKind>, String)> = plan
        .files_to_process()
        .filter_map(|path| inventory.get(path))
        .filter(|f| matches!(f.kind, FileKind::Doc | FileKind::Code))
        .filter_map(|f| {
            f.text.as_ref().map(|text| {
                (
                    f.path.clone(),
                    f.kind,
                    LanguageKind::from_path(&f.path),
                    text.clone(),
                )
            })
        })
        .collect();

    let timeout = Duration::from_secs(ctx.cfg.per_file_timeout_s);
    let mut outcomes = futures::stream::iter(work.into_iter().map(|(path, kind, lang, text)| {
        process_file(path, kind, lang, text, timeout)
    }))
    .buffer_unordered(ctx.cfg.max_workers.max(1));

    let mut results: Vec<FileOutcome> = Vec::new();
    while let Some(outcome) = outcomes.next().await {
        if outcome.timed_out {
            t.record_error("timeout", &outcome.path, "per-file parse timeout");
        } else if let Some(err) = &outcome.parse_error {
            t.record_error("parse", &outcome.path, err);
        }
        results.push(outcome);
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
    }
    drop(outcomes);

    // Modified files get fresh chunk sets; stale ordinals must not survive.
    let stale: Vec<Value> = plan.modified.iter().map(|p| json!(p)).collect();
    if !stale.is_empty() {
        store
            .run(
                "UNWIND $paths AS p \
                 MATCH (:File {path: p})-[:CONTAINS_CHUNK]->(c:Chunk) \
                 DETACH DELETE c",
                vec![("paths", Value::Array(stale))],
            )
            .await?;
    }

    let created_at = now_iso();
    let mut all_chunks: Vec<ChunkRecord> = Vec::new();
    let mut doc_titles: Vec<Value> = Vec::new();
    for outcome in &results {
        all_chunks.extend(outcome.chunks.iter().cloned());
        if let Some(title) = &outcome.title {
            doc_titles.push(json!({"path": outcome.path, "title": title}));
        }
        artifacts.symbols.extend(outcome.symbols.iter().cloned());
    }

    let mut written = 0usize;
    for batch in all_chunks.chunks(ctx.cfg.chunk_batch_size) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
        let node_rows: Vec<Value> = batch.iter().map(|c| chunk_row(c, &created_at)).collect();
        let part_of: Vec<Value> = batch
            .iter()
            .map(|c| {
                json!({"from": c.id, "to": c.file, "props": {"created_at": created_at}})
            })
            .collect();
        let contains: Vec<Value> = batch
            .iter()
            .map(|c| {
                json!({"from": c.file, "to": c.id, "props": {"created_at": created_at}})
            })
            .collect();

        // Both directions land with the nodes; a stopped batch loses all three.
        store.batch_upsert_nodes(NodeLabel::Chunk, &node_rows).await?;
        store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::PartOf, NodeLabel::Chunk, NodeLabel::File),
                &part_of,
            )
            .await?;
        store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::ContainsChunk, NodeLabel::File, NodeLabel::Chunk),
                &contains,
            )
            .await?;
        written += batch.len();
    }

    // Promote doc files to Document and stamp their titles.
    if !doc_titles.is_empty() && !t.stopped_early {
        store
            .run(
                "UNWIND $rows AS row \
                 MATCH (f:File {path: row.path}) \
                 SET f:Document, f.title = row.title",
                vec![("rows", Value::Array(doc_titles))],
            )
            .await?;
    }
    // Doc files without an H1 still expose the doc view.
    if !t.stopped_early {
        store
            .run(
                "MATCH (f:File {kind: 'doc'}) WHERE NOT f:Document SET f:Document",
                vec![],
            )
            .await?;
    }

    t.set("chunks_created", written as i64);
    t.set(
        "doc_chunks",
        all_chunks.iter().filter(|c| c.kind == ChunkKind::Doc).count() as i64,
    );
    t.set(
        "code_chunks",
        all_chunks.iter().filter(|c| c.kind == ChunkKind::Code).count() as i64,
    );
    t.set("symbols_parsed", artifacts.symbols.len() as i64);

    info!("chunks: wrote {written} chunk(s)");
    artifacts.chunks = all_chunks;
    Ok(t.finish())
}

/// Parse and chunk one file on a blocking worker, under the soft timeout.
async fn process_file(
    path: String,
    kind: FileKind,
    lang: Option<LanguageKind>,
    text: String,
    timeout: Duration,
) -> FileOutcome {
    let task_path = path.clone();
    let work = tokio::task::spawn_blocking(move || {
        let mut symbols = Vec::new();
        let mut parse_error = None;
        let mut title = None;
        let chunks = match kind {
            FileKind::Doc => {
                title = document_title(&text);
                chunk_document(&task_path, &text)
            }
            _ => {
                if let Some(lang) = lang {
                    match parse_symbols(lang, &task_path, &text) {
                        Ok(s) => symbols = s,
                        Err(err) => parse_error = Some(err.to_string()),
                    }
                }
                chunk_code(&task_path, &text, &symbols)
            }
        };
        (chunks, symbols, title, parse_error)
    });

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok((chunks, symbols, title, parse_error))) => FileOutcome {
            path,
            chunks,
            symbols,
            title,
            parse_error,
            timed_out: false,
        },
        Ok(Err(join_err)) => FileOutcome {
            path,
            chunks: Vec::new(),
            symbols: Vec::new(),
            title: None,
            parse_error: Some(join_err.to_string()),
            timed_out: false,
        },
        Err(_) => {
            warn!("chunks: parse timeout for {path}");
            FileOutcome {
                path,
                chunks: Vec::new(),
                symbols: Vec::new(),
                title: None,
                parse_error: None,
                timed_out: true,
            }
        }
    }
}

fn chunk_row(c: &ChunkRecord, created_at: &str) -> Value {
    json!({
        "id": c.id,
        "file": c.file,
        "kind": c.kind.as_str(),
        "ordinal": c.ordinal,
        "text": c.text,
        "heading": c.heading,
        "symbol": c.symbol,
        "start_line": c.start_line,
        "end_line": c.end_line,
        "length": c.length,
        "created_at": created_at,
    })
}
