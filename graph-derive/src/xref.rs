//! Cross-reference scanning helpers.
//!
//! Pure building blocks for the linker stage: document-to-file and
//! document-to-commit mention scans, commit co-occurrence aggregation, and
//! the per-chunk top-k cap applied to fulltext symbol hits.

use crate::strategies::ChunkInput;

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

static FILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_./-]*\.[A-Za-z0-9]{1,6}\b").unwrap()
});
static HEX_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-f]{7,40}\b").unwrap());

/// Minimum token length for a symbol name to participate in mention sweeps.
pub const MIN_SYMBOL_TOKEN: usize = 3;

/// `(document_path, file_path)` pairs for paths named inside doc chunks.
pub fn doc_file_mentions(
    doc_chunks: &[ChunkInput],
    known_files: &BTreeSet<String>,
) -> Vec<(String, String)> {
    let mut out = BTreeSet::new();
    for chunk in doc_chunks {
        for m in FILE_PATH.find_iter(&chunk.text) {
            let path = m.as_str();
            if path != chunk.file && known_files.contains(path) {
                out.insert((chunk.file.clone(), path.to_string()));
            }
        }
    }
    out.into_iter().collect()
}

/// `(document_path, commit_hash)` pairs for hash-looking tokens that prefix a
/// known commit. Tokens shorter than 7 hex chars are ignored.
pub fn doc_commit_mentions(
    doc_chunks: &[ChunkInput],
    known_hashes: &BTreeSet<String>,
) -> Vec<(String, String)> {
    let mut out = BTreeSet::new();
    for chunk in doc_chunks {
        for m in HEX_REF.find_iter(&chunk.text) {
            let token = m.as_str();
            if let Some(full) = known_hashes.iter().find(|h| h.starts_with(token)) {
                out.insert((chunk.file.clone(), full.clone()));
            }
        }
    }
    out.into_iter().collect()
}

/// Co-change weights: for every ordered pair of files sharing a commit, the
/// number of commits they share.
pub fn co_occurrence(commit_files: &[(String, Vec<String>)]) -> BTreeMap<(String, String), u32> {
    let mut weights: BTreeMap<(String, String), u32> = BTreeMap::new();
    for (_hash, files) in commit_files {
        let mut unique: Vec<&String> = files.iter().collect::<BTreeSet<_>>().into_iter().collect();
        unique.sort();
        for a in &unique {
            for b in &unique {
                if a != b {
                    *weights
                        .entry(((*a).clone(), (*b).clone()))
                        .or_insert(0) += 1;
                }
            }
        }
    }
    weights
}

/// One fulltext hit: a symbol (or library) seen in a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct MentionHit {
    pub chunk_id: String,
    pub target_key: String,
    pub score: f64,
}

/// Keep at most `top_k` hits per chunk, best score first. The MERGE write
/// later dedupes `(chunk, target)` pairs, so the retained count can still
/// shrink further; that is expected.
pub fn cap_top_k(hits: Vec<MentionHit>, top_k: usize) -> Vec<MentionHit> {
    let mut per_chunk: HashMap<String, Vec<MentionHit>> = HashMap::new();
    for hit in hits {
        per_chunk.entry(hit.chunk_id.clone()).or_default().push(hit);
    }

    let mut out = Vec::new();
    let mut chunk_ids: Vec<String> = per_chunk.keys().cloned().collect();
    chunk_ids.sort();
    for chunk_id in chunk_ids {
        let mut hits = per_chunk.remove(&chunk_id).unwrap_or_default();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.target_key.cmp(&b.target_key))
        });
        hits.dedup_by(|a, b| a.target_key == b.target_key);
        hits.truncate(top_k);
        out.extend(hits);
    }
    out
}

/// Symbol names eligible for a mention sweep.
pub fn eligible_symbol_name(name: &str) -> bool {
    name.len() >= MIN_SYMBOL_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, file: &str, text: &str) -> ChunkInput {
        ChunkInput {
            chunk_id: id.to_string(),
            file: file.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn file_mentions_require_known_paths() {
        let known: BTreeSet<String> = [String::from("src/a.py")].into();
        let pairs = doc_file_mentions(
            &[chunk("d#doc:0", "docs/PRD.md", "see src/a.py and src/missing.py")],
            &known,
        );
        assert_eq!(pairs, vec![(String::from("docs/PRD.md"), String::from("src/a.py"))]);
    }

    #[test]
    fn commit_mentions_match_prefixes() {
        let known: BTreeSet<String> =
            [String::from("deadbeefcafe0123456789abcdef0123456789ab")].into();
        let pairs = doc_commit_mentions(
            &[chunk("d#doc:0", "docs/log.md", "fixed in deadbeefcafe, see notes")],
            &known,
        );
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1, "deadbeefcafe0123456789abcdef0123456789ab");
    }

    #[test]
    fn short_hex_tokens_are_ignored() {
        let known: BTreeSet<String> =
            [String::from("deadbeefcafe0123456789abcdef0123456789ab")].into();
        let pairs = doc_commit_mentions(&[chunk("d#doc:0", "docs/x.md", "dead beef")], &known);
        assert!(pairs.is_empty());
    }

    #[test]
    fn co_occurrence_counts_shared_commits() {
        let commits = vec![
            (String::from("c1"), vec![String::from("a"), String::from("b")]),
            (String::from("c2"), vec![String::from("a"), String::from("b"), String::from("c")]),
        ];
        let weights = co_occurrence(&commits);
        assert_eq!(weights[&(String::from("a"), String::from("b"))], 2);
        assert_eq!(weights[&(String::from("b"), String::from("a"))], 2);
        assert_eq!(weights[&(String::from("a"), String::from("c"))], 1);
    }

    #[test]
    fn top_k_keeps_best_scores_per_chunk() {
        let hits = vec![
            MentionHit { chunk_id: String::from("c1"), target_key: String::from("s1"), score: 0.2 },
            MentionHit { chunk_id: String::from("c1"), target_key: String::from("s2"), score: 0.9 },
            MentionHit { chunk_id: String::from("c1"), target_key: String::from("s3"), score: 0.5 },
            MentionHit { chunk_id: String::from("c2"), target_key: String::from("s1"), score: 0.1 },
        ];
        let capped = cap_top_k(hits, 2);
        let c1: Vec<&str> = capped
            .iter()
            .filter(|h| h.chunk_id == "c1")
            .map(|h| h.target_key.as_str())
            .collect();
        assert_eq!(c1, vec!["s2", "s3"]);
        assert_eq!(capped.iter().filter(|h| h.chunk_id == "c2").count(), 1);
    }

    #[test]
    fn symbol_eligibility_floor() {
        assert!(!eligible_symbol_name("go"));
        assert!(eligible_symbol_name("run"));
    }
}
