//! Evidence accumulation and noisy-or confidence combination.
//!
//! Every strategy contributes `(subject, object, kind)`-keyed evidence; the
//! final confidence treats each source as an independent positive indicator:
//! `1 - prod(1 - c_i)`, clamped to 0.99. Edges below the configured floor are
//! discarded at finalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Derived relationship families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelKind {
    Implements,
    EvolvesFrom,
    DependsOn,
    RelatesTo,
}

impl RelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelKind::Implements => "IMPLEMENTS",
            RelKind::EvolvesFrom => "EVOLVES_FROM",
            RelKind::DependsOn => "DEPENDS_ON",
            RelKind::RelatesTo => "RELATES_TO",
        }
    }
}

/// Known evidence sources and their base confidences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceKind {
    /// Commit message names a requirement and the commit touches code.
    CommitMention,
    /// Document text names a requirement near a file path.
    DocMention,
    /// A code comment carries a requirement id.
    CodeComment,
    /// A commit message matches a supersedes/replaces/evolves pattern.
    MessagePattern,
    /// Import-graph overlap between requirement-implementing files.
    ImportOverlap,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::CommitMention => "commit-mention",
            EvidenceKind::DocMention => "doc-mention",
            EvidenceKind::CodeComment => "code-comment",
            EvidenceKind::MessagePattern => "message-pattern",
            EvidenceKind::ImportOverlap => "import-overlap",
        }
    }

    pub fn base_confidence(&self) -> f64 {
        match self {
            EvidenceKind::CommitMention => 0.9,
            EvidenceKind::DocMention => 0.5,
            EvidenceKind::CodeComment => 0.8,
            EvidenceKind::MessagePattern => 0.7,
            EvidenceKind::ImportOverlap => 0.6,
        }
    }
}

/// One piece of evidence for a candidate edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub confidence: f64,
    /// Where the evidence came from (commit hash, chunk id, ...).
    pub provenance: Value,
    /// Timestamp of the underlying fact, RFC3339, when known.
    pub observed_at: Option<String>,
}

impl Evidence {
    pub fn new(kind: EvidenceKind, provenance: Value, observed_at: Option<String>) -> Self {
        Self {
            kind,
            confidence: kind.base_confidence(),
            provenance,
            observed_at,
        }
    }
}

/// A finalized derived edge ready for upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedEdge {
    pub subject: String,
    pub object: String,
    pub kind: RelKind,
    pub confidence: f64,
    /// Distinct contributing evidence kinds.
    pub sources: Vec<String>,
    pub provenance: Vec<Value>,
    pub first_seen_ts: Option<String>,
    pub last_seen_ts: Option<String>,
}

/// Shared accumulator for all strategies in one derivation run.
#[derive(Debug, Default)]
pub struct EvidenceAccumulator {
    entries: BTreeMap<(String, String, RelKind), Vec<Evidence>>,
}

impl EvidenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subject: &str, object: &str, kind: RelKind, evidence: Evidence) {
        // Self-edges carry no information.
        if subject == object {
            return;
        }
        self.entries
            .entry((subject.to_string(), object.to_string(), kind))
            .or_default()
            .push(evidence);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Subject -> objects currently holding evidence for `kind`. Used to seed
    /// the import-overlap strategy with this run's IMPLEMENTS candidates.
    pub fn pairs(&self, kind: RelKind) -> BTreeMap<String, std::collections::BTreeSet<String>> {
        let mut out: BTreeMap<String, std::collections::BTreeSet<String>> = BTreeMap::new();
        for (subject, object, k) in self.entries.keys() {
            if *k == kind {
                out.entry(subject.clone()).or_default().insert(object.clone());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combine evidence into edges, dropping anything below `min_confidence`.
    pub fn finalize(self, min_confidence: f64) -> Vec<DerivedEdge> {
        let mut out = Vec::new();
        for ((subject, object, kind), evidence) in self.entries {
            let confidence = combine(evidence.iter().map(|e| e.confidence));
            if confidence < min_confidence {
                continue;
            }

            let mut sources: Vec<String> =
                evidence.iter().map(|e| e.kind.as_str().to_string()).collect();
            sources.sort();
            sources.dedup();

            let mut timestamps: Vec<&String> =
                evidence.iter().filter_map(|e| e.observed_at.as_ref()).collect();
            timestamps.sort();

            out.push(DerivedEdge {
                subject,
                object,
                kind,
                confidence,
                sources,
                provenance: evidence.iter().map(|e| e.provenance.clone()).collect(),
                first_seen_ts: timestamps.first().map(|s| (*s).clone()),
                last_seen_ts: timestamps.last().map(|s| (*s).clone()),
            });
        }
        out
    }
}

/// Noisy-or combination, clamped to 0.99.
pub fn combine(confidences: impl Iterator<Item = f64>) -> f64 {
    let mut miss = 1.0f64;
    for c in confidences {
        miss *= 1.0 - c.clamp(0.0, 1.0);
    }
    (1.0 - miss).min(0.99)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn two_half_sources_combine_to_three_quarters() {
        let combined = combine([0.5, 0.5].into_iter());
        assert!((combined - 0.75).abs() < 1e-9);
    }

    #[test]
    fn combination_is_clamped() {
        let combined = combine([0.9, 0.9, 0.9, 0.9].into_iter());
        assert!(combined <= 0.99);
    }

    #[test]
    fn low_confidence_edges_are_discarded() {
        let mut acc = EvidenceAccumulator::new();
        acc.add(
            "FR-01-01",
            "src/a.py",
            RelKind::Implements,
            Evidence {
                kind: EvidenceKind::DocMention,
                confidence: 0.2,
                provenance: json!({"chunk": "docs/a.md#doc:0"}),
                observed_at: None,
            },
        );
        assert!(acc.finalize(0.3).is_empty());
    }

    #[test]
    fn sources_are_deduped_and_timestamps_span() {
        let mut acc = EvidenceAccumulator::new();
        for (ts, kind) in [
            ("2024-01-02T00:00:00+00:00", EvidenceKind::CommitMention),
            ("2024-01-01T00:00:00+00:00", EvidenceKind::CommitMention),
            ("2024-01-03T00:00:00+00:00", EvidenceKind::DocMention),
        ] {
            acc.add(
                "FR-01-01",
                "src/a.py",
                RelKind::Implements,
                Evidence::new(kind, json!({}), Some(ts.to_string())),
            );
        }
        let edges = acc.finalize(0.3);
        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert_eq!(edge.sources, vec!["commit-mention", "doc-mention"]);
        assert_eq!(edge.first_seen_ts.as_deref(), Some("2024-01-01T00:00:00+00:00"));
        assert_eq!(edge.last_seen_ts.as_deref(), Some("2024-01-03T00:00:00+00:00"));
    }

    #[test]
    fn self_edges_are_ignored() {
        let mut acc = EvidenceAccumulator::new();
        acc.add(
            "FR-01-01",
            "FR-01-01",
            RelKind::DependsOn,
            Evidence::new(EvidenceKind::ImportOverlap, json!({}), None),
        );
        assert!(acc.is_empty());
    }
}
