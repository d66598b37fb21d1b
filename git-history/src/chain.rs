//! First-parent chain linking.
//!
//! Every commit with at least one parent yields one `PREV_COMMIT` pair to its
//! first parent; the inverse `NEXT_COMMIT` is written from the same pair. The
//! chain is recomputed as a post-step over the extracted set so partial delta
//! runs keep extending the existing lineage.

use crate::extract::CommitRecord;
use chrono::DateTime;

/// `(parent_hash, commit_hash)` pairs along first-parent lineage, ordered by
/// commit instant so chain writes replay chronologically.
pub fn chain_pairs(commits: &[CommitRecord]) -> Vec<(String, String)> {
    let mut ordered: Vec<&CommitRecord> = commits.iter().collect();
    ordered.sort_by(|a, b| instant_key(a).cmp(&instant_key(b)));

    ordered
        .iter()
        .filter_map(|c| {
            c.parents
                .first()
                .map(|parent| (parent.clone(), c.hash.clone()))
        })
        .collect()
}

/// The newest hash in the set, used as the ingestion upper bound.
pub fn latest_hash(commits: &[CommitRecord]) -> Option<String> {
    commits
        .iter()
        .max_by(|a, b| instant_key(a).cmp(&instant_key(b)))
        .map(|c| c.hash.clone())
}

/// Timestamps carry arbitrary offsets, so ordering must compare instants
/// rather than strings. Unparseable values sort first.
fn instant_key(c: &CommitRecord) -> (i64, &str) {
    let epoch = DateTime::parse_from_rfc3339(&c.timestamp)
        .map(|dt| dt.timestamp())
        .unwrap_or(i64::MIN);
    (epoch, c.hash.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CommitRecord;

    fn commit(hash: &str, ts: &str, parents: &[&str]) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            author_name: String::from("a"),
            author_email: String::from("a@example.com"),
            timestamp: ts.to_string(),
            message: String::new(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            changes: Vec::new(),
        }
    }

    #[test]
    fn root_commit_has_no_pair() {
        let commits = vec![commit("a", "2024-01-01T00:00:00+00:00", &[])];
        assert!(chain_pairs(&commits).is_empty());
    }

    #[test]
    fn pairs_follow_first_parent_chronologically() {
        let commits = vec![
            commit("c", "2024-01-03T00:00:00+00:00", &["b"]),
            commit("b", "2024-01-02T00:00:00+00:00", &["a"]),
            commit("a", "2024-01-01T00:00:00+00:00", &[]),
        ];
        let pairs = chain_pairs(&commits);
        assert_eq!(pairs, vec![
            (String::from("a"), String::from("b")),
            (String::from("b"), String::from("c")),
        ]);
    }

    #[test]
    fn merge_commit_links_first_parent_only() {
        let commits = vec![commit("m", "2024-01-04T00:00:00+00:00", &["b", "x"])];
        let pairs = chain_pairs(&commits);
        assert_eq!(pairs, vec![(String::from("b"), String::from("m"))]);
    }

    #[test]
    fn latest_hash_is_newest() {
        let commits = vec![
            commit("a", "2024-01-01T00:00:00+00:00", &[]),
            commit("b", "2024-01-02T00:00:00+00:00", &["a"]),
        ];
        assert_eq!(latest_hash(&commits).as_deref(), Some("b"));
    }
}
