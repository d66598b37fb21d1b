//! Derivation strategies.
//!
//! Each strategy scans one evidence source (commit messages, document chunks,
//! code comments, the import graph) and feeds the shared accumulator. All
//! inputs are plain records so the strategies are store-agnostic.

use crate::evidence::{Evidence, EvidenceAccumulator, EvidenceKind, RelKind};

use petgraph::graphmap::DiGraphMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::debug;

/// Requirement ids like `FR-08-01` or `NFR-2-10`.
static REQ_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,4}-\d{1,3}-\d{1,3})\b").unwrap());

/// `supersedes FR-01-01`, `replaces FR-01-01`, `evolves from FR-01-01`.
static EVOLVES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:supersedes|replaces|evolves\s+from)\s+([A-Z]{2,4}-\d{1,3}-\d{1,3})\b")
        .unwrap()
});

/// Repo-relative code paths inside prose.
static FILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_./-]*\.(?:py|ts|tsx|js|jsx|go|rs|java|c|cc|cpp|h|hpp)\b")
        .unwrap()
});

/// One commit as the deriver sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInput {
    pub hash: String,
    pub message: String,
    pub timestamp: String,
    /// Code files this commit touched.
    pub code_files: Vec<String>,
}

/// One chunk as the deriver sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub chunk_id: String,
    pub file: String,
    pub text: String,
}

/// A requirement seen in any evidence source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub id: String,
    pub title: String,
    /// "doc" | "commit-message".
    pub origin: String,
}

pub fn find_requirement_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = REQ_ID
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Commit-message mentions: requirement id in the message plus touched code
/// files (base confidence 0.9 per file).
pub fn apply_commit_mentions(acc: &mut EvidenceAccumulator, commits: &[CommitInput]) {
    for commit in commits {
        let ids = find_requirement_ids(&commit.message);
        if ids.is_empty() || commit.code_files.is_empty() {
            continue;
        }
        for id in &ids {
            for file in &commit.code_files {
                acc.add(
                    id,
                    file,
                    RelKind::Implements,
                    Evidence::new(
                        EvidenceKind::CommitMention,
                        json!({"commit": commit.hash}),
                        Some(commit.timestamp.clone()),
                    ),
                );
            }
        }
    }
}

/// Document mentions: a requirement id and a known file path in the same
/// chunk (base confidence 0.5).
pub fn apply_doc_mentions(
    acc: &mut EvidenceAccumulator,
    doc_chunks: &[ChunkInput],
    known_files: &BTreeSet<String>,
) {
    for chunk in doc_chunks {
        let ids = find_requirement_ids(&chunk.text);
        if ids.is_empty() {
            continue;
        }
        let files = mentioned_files(&chunk.text, known_files);
        for id in &ids {
            for file in &files {
                acc.add(
                    id,
                    file,
                    RelKind::Implements,
                    Evidence::new(
                        EvidenceKind::DocMention,
                        json!({"chunk": chunk.chunk_id}),
                        None,
                    ),
                );
            }
        }
    }
}

/// Code comments carrying a requirement id implement it in that file (base
/// confidence 0.8).
pub fn apply_code_comments(acc: &mut EvidenceAccumulator, code_chunks: &[ChunkInput]) {
    for chunk in code_chunks {
        for line in chunk.text.lines() {
            if !is_comment_line(line) {
                continue;
            }
            for id in find_requirement_ids(line) {
                acc.add(
                    &id,
                    &chunk.file,
                    RelKind::Implements,
                    Evidence::new(
                        EvidenceKind::CodeComment,
                        json!({"chunk": chunk.chunk_id}),
                        None,
                    ),
                );
            }
        }
    }
}

/// Supersedes/replaces patterns in commit messages: the other requirement
/// named in the message evolves from the pattern's target (base 0.7).
pub fn apply_evolves(acc: &mut EvidenceAccumulator, commits: &[CommitInput]) {
    for commit in commits {
        for caps in EVOLVES.captures_iter(&commit.message) {
            let old = caps[1].to_string();
            let Some(new) = find_requirement_ids(&commit.message)
                .into_iter()
                .find(|id| *id != old)
            else {
                continue;
            };
            acc.add(
                &new,
                &old,
                RelKind::EvolvesFrom,
                Evidence::new(
                    EvidenceKind::MessagePattern,
                    json!({"commit": commit.hash}),
                    Some(commit.timestamp.clone()),
                ),
            );
        }
    }
}

/// Import-graph overlap between requirement-implementing files (base 0.6).
/// Gated: with no imports there is nothing to say, and no warning either.
pub fn apply_depends_on(
    acc: &mut EvidenceAccumulator,
    implements: &BTreeMap<String, BTreeSet<String>>,
    imports: &[(String, String)],
) -> usize {
    if imports.is_empty() {
        debug!("derive: imports graph empty, DEPENDS_ON skipped");
        return 0;
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (from, to) in imports {
        graph.add_edge(from.as_str(), to.as_str(), ());
    }

    let mut added = 0usize;
    for (req_a, files_a) in implements {
        for (req_b, files_b) in implements {
            if req_a == req_b {
                continue;
            }
            let linked = files_a.iter().any(|fa| {
                files_b
                    .iter()
                    .any(|fb| graph.contains_edge(fa.as_str(), fb.as_str()))
            });
            if linked {
                acc.add(
                    req_a,
                    req_b,
                    RelKind::DependsOn,
                    Evidence::new(
                        EvidenceKind::ImportOverlap,
                        json!({"requirements": [req_a, req_b]}),
                        None,
                    ),
                );
                added += 1;
            }
        }
    }
    added
}

/// Requirement nodes implied by the evidence sources. Commit-message origins
/// take the message's first line as title; doc origins use the chunk heading
/// when the caller has one (passed pre-joined in `text`).
pub fn collect_requirements(
    commits: &[CommitInput],
    doc_chunks: &[ChunkInput],
    code_chunks: &[ChunkInput],
) -> Vec<RequirementRecord> {
    let mut seen: BTreeMap<String, RequirementRecord> = BTreeMap::new();

    for chunk in doc_chunks {
        for id in find_requirement_ids(&chunk.text) {
            seen.entry(id.clone()).or_insert_with(|| RequirementRecord {
                id,
                title: first_line(&chunk.text),
                origin: String::from("doc"),
            });
        }
    }
    for commit in commits {
        for id in find_requirement_ids(&commit.message) {
            seen.entry(id.clone()).or_insert_with(|| RequirementRecord {
                id,
                title: first_line(&commit.message),
                origin: String::from("commit-message"),
            });
        }
    }
    for chunk in code_chunks {
        for line in chunk.text.lines().filter(|l| is_comment_line(l)) {
            for id in find_requirement_ids(line) {
                seen.entry(id.clone()).or_insert_with(|| RequirementRecord {
                    id,
                    title: line.trim().trim_start_matches(['#', '/', '*', ' ']).to_string(),
                    origin: String::from("doc"),
                });
            }
        }
    }

    seen.into_values().collect()
}

fn mentioned_files(text: &str, known_files: &BTreeSet<String>) -> Vec<String> {
    let mut out: Vec<String> = FILE_PATH
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|p| known_files.contains(p))
        .collect();
    out.sort();
    out.dedup();
    out
}

fn is_comment_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('#')
        || t.starts_with("//")
        || t.starts_with("/*")
        || t.starts_with('*')
        || t.starts_with("\"\"\"")
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str, message: &str, files: &[&str]) -> CommitInput {
        CommitInput {
            hash: hash.to_string(),
            message: message.to_string(),
            timestamp: String::from("2024-01-01T00:00:00+00:00"),
            code_files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn requirement_ids_are_found_and_deduped() {
        let ids = find_requirement_ids("FR-01-01 then FR-01-01 and NFR-2-10, but not FRX-1");
        assert_eq!(ids, vec!["FR-01-01", "NFR-2-10"]);
    }

    #[test]
    fn commit_mentions_link_requirement_to_touched_code() {
        let mut acc = EvidenceAccumulator::new();
        apply_commit_mentions(
            &mut acc,
            &[commit("abc", "Implements FR-01-01", &["src/a.py"])],
        );
        let edges = acc.finalize(0.3);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].subject, "FR-01-01");
        assert_eq!(edges[0].object, "src/a.py");
        assert!((edges[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn doc_mentions_need_a_known_path() {
        let mut acc = EvidenceAccumulator::new();
        let known: BTreeSet<String> = [String::from("src/a.py")].into();
        apply_doc_mentions(
            &mut acc,
            &[ChunkInput {
                chunk_id: String::from("docs/PRD.md#doc:0"),
                file: String::from("docs/PRD.md"),
                text: String::from("Implements FR-01-01 in src/a.py (not src/ghost.py)"),
            }],
            &known,
        );
        let edges = acc.finalize(0.3);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].sources, vec!["doc-mention"]);
        assert!((edges[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn code_comments_count_only_comment_lines() {
        let mut acc = EvidenceAccumulator::new();
        apply_code_comments(
            &mut acc,
            &[ChunkInput {
                chunk_id: String::from("src/a.py#code:0"),
                file: String::from("src/a.py"),
                text: String::from("# satisfies FR-02-02\nreq = \"FR-09-09\"\n"),
            }],
        );
        let edges = acc.finalize(0.3);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].subject, "FR-02-02");
    }

    #[test]
    fn evolves_links_new_to_old() {
        let mut acc = EvidenceAccumulator::new();
        apply_evolves(
            &mut acc,
            &[commit("abc", "FR-02-01 supersedes FR-01-01", &[])],
        );
        let edges = acc.finalize(0.3);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].subject, "FR-02-01");
        assert_eq!(edges[0].object, "FR-01-01");
        assert_eq!(edges[0].kind, RelKind::EvolvesFrom);
    }

    #[test]
    fn depends_on_is_gated_on_imports() {
        let mut implements = BTreeMap::new();
        implements.insert(
            String::from("FR-01-01"),
            BTreeSet::from([String::from("src/a.py")]),
        );
        implements.insert(
            String::from("FR-02-01"),
            BTreeSet::from([String::from("src/b.py")]),
        );

        let mut acc = EvidenceAccumulator::new();
        assert_eq!(apply_depends_on(&mut acc, &implements, &[]), 0);
        assert!(acc.is_empty());

        let imports = vec![(String::from("src/a.py"), String::from("src/b.py"))];
        let added = apply_depends_on(&mut acc, &implements, &imports);
        assert_eq!(added, 1);
        let edges = acc.finalize(0.3);
        assert_eq!(edges[0].subject, "FR-01-01");
        assert_eq!(edges[0].object, "FR-02-01");
    }

    #[test]
    fn requirements_prefer_doc_origin() {
        let reqs = collect_requirements(
            &[commit("abc", "Implements FR-01-01", &["src/a.py"])],
            &[ChunkInput {
                chunk_id: String::from("d#doc:0"),
                file: String::from("docs/PRD.md"),
                text: String::from("FR-01-01 ship the scanner"),
            }],
            &[],
        );
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].origin, "doc");
        assert_eq!(reqs[0].title, "FR-01-01 ship the scanner");
    }
}
