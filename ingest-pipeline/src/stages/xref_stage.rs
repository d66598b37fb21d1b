//! Stage 6: cross-reference fan-out — the highest-volume edges.
//!
//! Fulltext sweeps link chunks to symbols and libraries; pattern scans link
//! documents to files and commits; co-change weights land on CO_OCCURS_WITH.
//! MERGE semantics dedupe `(chunk, target)` pairs, so the written edge count
//! is routinely well below the raw hit count.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::Result;
use crate::stages::now_iso;
use crate::telemetry::{StageId, StageTelemetry};

use chunk_prep::ChunkKind;
use graph_derive::{
    ChunkInput, MentionHit, cap_top_k, doc_commit_mentions, doc_file_mentions,
    eligible_symbol_name,
};
use graph_store::{CHUNK_TEXT_INDEX, EdgeSpec, EdgeType, GraphStore, NodeLabel};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Names swept per stop-flag check.
const SWEEP_BATCH: usize = 200;
/// Fulltext hits requested per term.
const HITS_PER_TERM: usize = 100;

pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::CrossRef);
    let created_at = now_iso();

    // ---- MENTIONS_SYMBOL ------------------------------------------------
    let symbol_rows = store
        .fetch_maps(
            "MATCH (s:Symbol) RETURN s.uid AS uid, s.name AS name",
            vec![],
            &["uid", "name"],
        )
        .await?;
    let mut uids_by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in &symbol_rows {
        let (Some(uid), Some(name)) = (
            row.get("uid").and_then(Value::as_str),
            row.get("name").and_then(Value::as_str),
        ) else {
            continue;
        };
        if eligible_symbol_name(name) {
            uids_by_name
                .entry(name.to_string())
                .or_default()
                .push(uid.to_string());
        }
    }

    let mut raw_hits = 0usize;
    let mut symbol_hits: Vec<MentionHit> = Vec::new();
    let names: Vec<String> = uids_by_name.keys().cloned().collect();
    for batch in names.chunks(SWEEP_BATCH) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
        for name in batch {
            let hits = store
                .fulltext_search(CHUNK_TEXT_INDEX, name, HITS_PER_TERM)
                .await?;
            raw_hits += hits.len();
            for hit in hits {
                for uid in &uids_by_name[name] {
                    symbol_hits.push(MentionHit {
                        chunk_id: hit.key.clone(),
                        target_key: uid.clone(),
                        score: hit.score,
                    });
                }
            }
        }
    }

    let capped = cap_top_k(symbol_hits, ctx.cfg.mention_topk_per_chunk);
    t.set("symbol_hits_raw", raw_hits as i64);
    let rows: Vec<Value> = capped
        .iter()
        .map(|h| {
            json!({
                "from": h.chunk_id,
                "to": h.target_key,
                "props": {"score": h.score, "created_at": created_at},
            })
        })
        .collect();
    let mut symbol_edges = 0usize;
    for batch in rows.chunks(ctx.cfg.chunk_batch_size) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
        symbol_edges += store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::MentionsSymbol, NodeLabel::Chunk, NodeLabel::Symbol),
                batch,
            )
            .await?;
    }
    t.set("symbol_mention_edges", symbol_edges as i64);

    // ---- MENTIONS_LIBRARY (docs only) -----------------------------------
    let library_rows = store
        .fetch_maps(
            "MATCH (l:Library) RETURN l.slug AS slug, l.aliases AS aliases",
            vec![],
            &["slug", "aliases"],
        )
        .await?;
    let mut library_hits: Vec<MentionHit> = Vec::new();
    for batch in library_rows.chunks(SWEEP_BATCH) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
        for row in batch {
            let Some(slug) = row.get("slug").and_then(Value::as_str) else {
                continue;
            };
            let aliases: Vec<String> = row
                .get("aliases")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            for alias in aliases {
                if alias.len() < 3 {
                    continue;
                }
                let hits = store
                    .fulltext_search(CHUNK_TEXT_INDEX, &alias, HITS_PER_TERM)
                    .await?;
                for hit in hits {
                    // Chunk ids carry their kind; libraries only link to docs.
                    if hit.key.contains("#doc:") {
                        library_hits.push(MentionHit {
                            chunk_id: hit.key.clone(),
                            target_key: slug.to_string(),
                            score: hit.score,
                        });
                    }
                }
            }
        }
    }
    let capped = cap_top_k(library_hits, ctx.cfg.mention_topk_per_chunk);
    let rows: Vec<Value> = capped
        .iter()
        .map(|h| {
            json!({
                "from": h.chunk_id,
                "to": h.target_key,
                "props": {"score": h.score, "created_at": created_at},
            })
        })
        .collect();
    let mut library_edges = 0usize;
    for batch in rows.chunks(ctx.cfg.chunk_batch_size) {
        library_edges += store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::MentionsLibrary, NodeLabel::Chunk, NodeLabel::Library),
                batch,
            )
            .await?;
    }
    t.set("library_mention_edges", library_edges as i64);

    // ---- MENTIONS_FILE / MENTIONS_COMMIT --------------------------------
    let doc_chunks: Vec<ChunkInput> = artifacts
        .chunks
        .iter()
        .filter(|c| c.kind == ChunkKind::Doc)
        .map(|c| ChunkInput {
            chunk_id: c.id.clone(),
            file: c.file.clone(),
            text: c.text.clone(),
        })
        .collect();
    let known_files: BTreeSet<String> = artifacts
        .inventory
        .as_ref()
        .map(|i| i.path_set())
        .unwrap_or_default();
    let hash_rows = store
        .fetch_maps("MATCH (c:Commit) RETURN c.hash AS hash", vec![], &["hash"])
        .await?;
    let known_hashes: BTreeSet<String> = hash_rows
        .iter()
        .filter_map(|r| r.get("hash").and_then(Value::as_str).map(str::to_string))
        .collect();

    let file_mentions = doc_file_mentions(&doc_chunks, &known_files);
    let commit_mentions = doc_commit_mentions(&doc_chunks, &known_hashes);
    t.set("file_mentions", file_mentions.len() as i64);
    t.set("commit_mentions", commit_mentions.len() as i64);

    let rows: Vec<Value> = file_mentions
        .iter()
        .map(|(doc, file)| {
            json!({"from": doc, "to": file, "props": {"created_at": created_at}})
        })
        .collect();
    store
        .batch_upsert_edges(
            EdgeSpec::new(EdgeType::MentionsFile, NodeLabel::Document, NodeLabel::File),
            &rows,
        )
        .await?;
    let rows: Vec<Value> = commit_mentions
        .iter()
        .map(|(doc, hash)| {
            json!({"from": doc, "to": hash, "props": {"created_at": created_at}})
        })
        .collect();
    store
        .batch_upsert_edges(
            EdgeSpec::new(EdgeType::MentionsCommit, NodeLabel::Document, NodeLabel::Commit),
            &rows,
        )
        .await?;

    // ---- RELATES_TO: converging cross-references ------------------------
    // A document that names a file and a commit touching that same file gets
    // a weak bridge edge to the file.
    if !file_mentions.is_empty() && !commit_mentions.is_empty() {
        let touched_rows = store
            .fetch_maps(
                "MATCH (c:Commit)-[:TOUCHED]->(f:File) RETURN c.hash AS hash, f.path AS path",
                vec![],
                &["hash", "path"],
            )
            .await?;
        let touched: BTreeSet<(String, String)> = touched_rows
            .iter()
            .filter_map(|r| {
                Some((
                    r.get("hash")?.as_str()?.to_string(),
                    r.get("path")?.as_str()?.to_string(),
                ))
            })
            .collect();

        let mut bridge_rows = Vec::new();
        for (doc, file) in &file_mentions {
            let converges = commit_mentions
                .iter()
                .filter(|(d, _)| d == doc)
                .any(|(_, hash)| touched.contains(&(hash.clone(), file.clone())));
            if converges {
                bridge_rows.push(json!({
                    "from": doc,
                    "to": file,
                    "props": {
                        "created_at": created_at,
                        "sources": ["file-mention", "commit-mention"],
                    },
                }));
            }
        }
        t.set("relates_to_edges", bridge_rows.len() as i64);
        store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::RelatesTo, NodeLabel::Document, NodeLabel::File),
                &bridge_rows,
            )
            .await?;
    }

    // ---- CO_OCCURS_WITH -------------------------------------------------
    // Store-side aggregation over the whole commit window keeps the weights
    // incremental: re-running recomputes the same counts.
    store
        .run(
            "MATCH (c:Commit)-[:TOUCHED]->(f1:File) \
             MATCH (c)-[:TOUCHED]->(f2:File) \
             WHERE f1.path <> f2.path \
             WITH f1, f2, count(DISTINCT c) AS w \
             MERGE (f1)-[r:CO_OCCURS_WITH]->(f2) \
             SET r.weight = w, r.created_at = $now",
            vec![("now", json!(created_at))],
        )
        .await?;

    info!(
        "xref: {} symbol edge(s), {} library edge(s), {} file mention(s)",
        symbol_edges,
        library_edges,
        file_mentions.len()
    );
    Ok(t.finish())
}
