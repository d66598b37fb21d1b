//! Post-run integrity auditing.
//!
//! Read-only: every count tolerates a partially-populated (or empty) graph
//! and reports 0 rather than erroring. The quality score is a weighted sum of
//! named checks; the weights are configuration, not magic.

use crate::config::AuditWeights;
use crate::errors::Result;

use chrono::{DateTime, Utc};
use graph_store::{GraphStore, NodeLabel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

const SAMPLE_LIMIT: i64 = 10;
const TOP_LIBRARIES: i64 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeStats {
    pub by_encoding: BTreeMap<String, i64>,
    pub fallback_files: i64,
    pub fallback_samples: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryCoverage {
    pub by_source: BTreeMap<String, i64>,
    pub top_used: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub nodes_by_label: BTreeMap<String, i64>,
    pub edges_by_type: BTreeMap<String, i64>,
    pub orphans_by_label: BTreeMap<String, i64>,
    pub chunks_without_links: i64,
    pub broken_chain_links: i64,
    pub requirements_without_part_of: i64,
    pub libraries_without_links: i64,
    pub decode: DecodeStats,
    pub library_coverage: LibraryCoverage,
    /// Weighted sum of passing checks, 0..=100.
    pub quality_score: f64,
}

/// Run every check against the store.
pub async fn audit(store: &GraphStore, weights: &AuditWeights) -> Result<AuditReport> {
    let nodes_by_label = fetch_label_counts(
        store,
        "MATCH (n) UNWIND labels(n) AS label RETURN label AS label, count(*) AS n",
    )
    .await?;
    let edges_by_type = fetch_label_counts(
        store,
        "MATCH ()-[r]->() RETURN type(r) AS label, count(*) AS n",
    )
    .await?;

    let mut orphans_by_label = fetch_label_counts(
        store,
        "MATCH (n) WHERE NOT (n)--() UNWIND labels(n) AS label RETURN label AS label, count(*) AS n",
    )
    .await?;
    orphans_by_label.retain(|label, _| {
        ![
            NodeLabel::PipelineState.as_str(),
            NodeLabel::DerivationWatermark.as_str(),
        ]
        .contains(&label.as_str())
    });

    let chunks_without_links = store
        .fetch_count(
            "MATCH (c:Chunk) \
             WHERE NOT (c)-[:PART_OF]->(:File) OR NOT (:File)-[:CONTAINS_CHUNK]->(c) \
             RETURN count(c) AS n",
            vec![],
        )
        .await?;

    let broken_chain_links = store
        .fetch_count(
            "MATCH (a:Commit)-[:NEXT_COMMIT]->(b:Commit) \
             WHERE NOT (b)-[:PREV_COMMIT]->(a) \
             RETURN count(*) AS n",
            vec![],
        )
        .await?;

    let requirements_without_part_of = store
        .fetch_count(
            "MATCH (r:Requirement) \
             WHERE NOT (r)--(:Sprint) AND NOT (r)--(:Document) \
             RETURN count(r) AS n",
            vec![],
        )
        .await?;

    let libraries_without_links = store
        .fetch_count(
            "MATCH (l:Library) \
             WHERE NOT ()-[:USES_LIBRARY]->(l) AND NOT ()-[:MENTIONS_LIBRARY]->(l) \
             RETURN count(l) AS n",
            vec![],
        )
        .await?;

    let decode = decode_stats(store).await?;
    let library_coverage = library_coverage(store).await?;

    let total_files = *nodes_by_label.get("File").unwrap_or(&0);
    let quality_score = score(
        weights,
        chunks_without_links,
        broken_chain_links,
        orphans_by_label.values().sum(),
        requirements_without_part_of,
        libraries_without_links,
        decode.fallback_files,
        total_files,
    );

    info!("audit: quality_score={quality_score:.1}");
    Ok(AuditReport {
        generated_at: Utc::now(),
        nodes_by_label,
        edges_by_type,
        orphans_by_label,
        chunks_without_links,
        broken_chain_links,
        requirements_without_part_of,
        libraries_without_links,
        decode,
        library_coverage,
        quality_score,
    })
}

async fn fetch_label_counts(store: &GraphStore, cypher: &str) -> Result<BTreeMap<String, i64>> {
    let rows = store.fetch_maps(cypher, vec![], &["label", "n"]).await?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some((
                r.get("label")?.as_str()?.to_string(),
                r.get("n")?.as_i64().unwrap_or(0),
            ))
        })
        .collect())
}

async fn decode_stats(store: &GraphStore) -> Result<DecodeStats> {
    let by_encoding = fetch_label_counts(
        store,
        "MATCH (f:File) WHERE f.decoding_encoding IS NOT NULL \
         RETURN f.decoding_encoding AS label, count(*) AS n",
    )
    .await?;
    let fallback_files = store
        .fetch_count(
            "MATCH (f:File {decoding_fallback_used: true}) RETURN count(f) AS n",
            vec![],
        )
        .await?;
    let sample_rows = store
        .fetch_maps(
            "MATCH (f:File {decoding_fallback_used: true}) \
             RETURN f.path AS path ORDER BY f.path LIMIT 10",
            vec![],
            &["path"],
        )
        .await?;
    let fallback_samples = sample_rows
        .iter()
        .take(SAMPLE_LIMIT as usize)
        .filter_map(|r| r.get("path").and_then(Value::as_str).map(str::to_string))
        .collect();
    Ok(DecodeStats {
        by_encoding,
        fallback_files,
        fallback_samples,
    })
}

async fn library_coverage(store: &GraphStore) -> Result<LibraryCoverage> {
    let by_source = fetch_label_counts(
        store,
        "MATCH (l:Library) RETURN l.source AS label, count(*) AS n",
    )
    .await?;
    let top_rows = store
        .fetch_maps(
            "MATCH (:File)-[:USES_LIBRARY]->(l:Library) \
             RETURN l.slug AS label, count(*) AS n ORDER BY n DESC LIMIT 10",
            vec![],
            &["label", "n"],
        )
        .await?;
    let top_used = top_rows
        .iter()
        .take(TOP_LIBRARIES as usize)
        .filter_map(|r| {
            Some((
                r.get("label")?.as_str()?.to_string(),
                r.get("n")?.as_i64().unwrap_or(0),
            ))
        })
        .collect();
    Ok(LibraryCoverage {
        by_source,
        top_used,
    })
}

/// Weighted pass/fail aggregation. A failing check contributes nothing;
/// decode health passes while fallback files stay under 10% of all files.
#[allow(clippy::too_many_arguments)]
fn score(
    weights: &AuditWeights,
    chunks_without_links: i64,
    broken_chain_links: i64,
    orphans: i64,
    requirements_unattached: i64,
    libraries_unlinked: i64,
    fallback_files: i64,
    total_files: i64,
) -> f64 {
    let mut score = 0u32;
    if chunks_without_links == 0 {
        score += weights.bidirectional_chunks;
    }
    if broken_chain_links == 0 {
        score += weights.commit_chain;
    }
    if orphans == 0 {
        score += weights.orphans;
    }
    if requirements_unattached == 0 {
        score += weights.requirement_linkage;
    }
    if libraries_unlinked == 0 {
        score += weights.library_linkage;
    }
    let decode_ok = total_files == 0 || (fallback_files as f64) < (total_files as f64) * 0.10;
    if decode_ok {
        score += weights.decode_health;
    }
    score as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_graph_scores_full_marks() {
        let w = AuditWeights::default();
        assert_eq!(score(&w, 0, 0, 0, 0, 0, 0, 0), 100.0);
    }

    #[test]
    fn unattached_requirements_cost_their_weight() {
        let w = AuditWeights::default();
        let s = score(&w, 0, 0, 0, 3, 0, 0, 100);
        assert_eq!(s, (100 - w.requirement_linkage) as f64);
    }

    #[test]
    fn decode_health_uses_a_ratio() {
        let w = AuditWeights::default();
        // 5 of 100 files on fallback: healthy.
        assert_eq!(score(&w, 0, 0, 0, 0, 0, 5, 100), 100.0);
        // 50 of 100: unhealthy.
        assert_eq!(score(&w, 0, 0, 0, 0, 0, 50, 100), (100 - w.decode_health) as f64);
    }
}
