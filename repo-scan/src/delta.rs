//! Delta planning: diff the fresh inventory against the previous manifest.

use crate::manifest::RepoManifest;
use crate::scan::FileInventory;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Run profile selected at job start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Process everything; optionally preceded by a graph wipe.
    Full,
    /// Manifest-based delta (the default).
    Delta,
    /// Commits + symbols only: no doc chunking, no fulltext sweeps.
    Quick,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Full => "full",
            Profile::Delta => "delta",
            Profile::Quick => "quick",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Profile::Full),
            "delta" => Some(Profile::Delta),
            "quick" => Some(Profile::Quick),
            _ => None,
        }
    }
}

/// The work plan for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaPlan {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    /// Commits newer than this hash form the delta commit set; `None` means
    /// the whole history.
    pub since_commit: Option<String>,
}

impl DeltaPlan {
    /// Files that downstream content stages (chunking, symbols) must process.
    pub fn files_to_process(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Compare inventory and previous manifest under the selected profile.
///
/// `subpath` scopes added/modified/unchanged to files under the prefix;
/// deletions outside the scope are ignored rather than destructive.
pub fn plan(
    inventory: &FileInventory,
    previous: Option<&RepoManifest>,
    profile: Profile,
    subpath: Option<&str>,
) -> DeltaPlan {
    let in_scope = |path: &str| match subpath {
        Some(prefix) => {
            let prefix = prefix.trim_end_matches('/');
            path == prefix || path.starts_with(&format!("{prefix}/"))
        }
        None => true,
    };

    let mut out = DeltaPlan::default();

    match (profile, previous) {
        (Profile::Full, _) | (_, None) => {
            // No usable baseline: everything in scope is new work.
            for f in &inventory.files {
                if in_scope(&f.path) {
                    out.added.push(f.path.clone());
                }
            }
        }
        (_, Some(prev)) => {
            for f in &inventory.files {
                if !in_scope(&f.path) {
                    continue;
                }
                match prev.files.get(&f.path) {
                    None => out.added.push(f.path.clone()),
                    Some(entry) if entry.content_hash != f.content_hash => {
                        out.modified.push(f.path.clone())
                    }
                    Some(_) => out.unchanged.push(f.path.clone()),
                }
            }
            let current = inventory.path_set();
            for path in prev.files.keys() {
                if in_scope(path) && !current.contains(path) {
                    out.deleted.push(path.clone());
                }
            }
            out.since_commit = prev.last_ingested_commit.clone();
        }
    }

    // The full profile reprocesses history from the root.
    if profile == Profile::Full {
        out.since_commit = None;
    }

    info!(
        "plan: profile={} added={} modified={} deleted={} unchanged={} since={}",
        profile.as_str(),
        out.added.len(),
        out.modified.len(),
        out.deleted.len(),
        out.unchanged.len(),
        out.since_commit.as_deref().unwrap_or("-"),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{MANIFEST_SCHEMA_VERSION, ManifestEntry, RepoManifest};
    use crate::scan::{FileInventory, FileKind, FileRecord, ScanStats};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn record(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            kind: FileKind::Code,
            language: Some(String::from("python")),
            size: 1,
            mtime: 0.0,
            content_hash: hash.to_string(),
            decoding: None,
            text: None,
        }
    }

    fn inventory(files: Vec<FileRecord>) -> FileInventory {
        FileInventory {
            root: PathBuf::from("/repo"),
            files,
            stats: ScanStats::default(),
        }
    }

    fn previous(entries: &[(&str, &str)]) -> RepoManifest {
        let mut files = BTreeMap::new();
        for (path, hash) in entries {
            files.insert(
                path.to_string(),
                ManifestEntry {
                    size: 1,
                    mtime: 0.0,
                    content_hash: hash.to_string(),
                    encoding: String::from("utf-8"),
                    fallback_used: false,
                },
            );
        }
        RepoManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            repo_root: String::from("/repo"),
            last_ingested_commit: Some(String::from("abc123")),
            files,
        }
    }

    #[test]
    fn classifies_added_modified_deleted_unchanged() {
        let inv = inventory(vec![
            record("src/new.py", "n1"),
            record("src/kept.py", "k1"),
            record("src/changed.py", "c2"),
        ]);
        let prev = previous(&[("src/kept.py", "k1"), ("src/changed.py", "c1"), ("src/gone.py", "g1")]);
        let plan = plan(&inv, Some(&prev), Profile::Delta, None);
        assert_eq!(plan.added, vec!["src/new.py"]);
        assert_eq!(plan.modified, vec!["src/changed.py"]);
        assert_eq!(plan.deleted, vec!["src/gone.py"]);
        assert_eq!(plan.unchanged, vec!["src/kept.py"]);
        assert_eq!(plan.since_commit.as_deref(), Some("abc123"));
    }

    #[test]
    fn unchanged_tree_is_a_noop() {
        let inv = inventory(vec![record("src/a.py", "h1")]);
        let prev = previous(&[("src/a.py", "h1")]);
        let plan = plan(&inv, Some(&prev), Profile::Delta, None);
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged.len(), 1);
    }

    #[test]
    fn full_profile_ignores_baseline() {
        let inv = inventory(vec![record("src/a.py", "h1")]);
        let prev = previous(&[("src/a.py", "h1")]);
        let plan = plan(&inv, Some(&prev), Profile::Full, None);
        assert_eq!(plan.added, vec!["src/a.py"]);
        assert!(plan.since_commit.is_none());
    }

    #[test]
    fn subpath_scopes_the_plan() {
        let inv = inventory(vec![record("src/a.py", "a2"), record("lib/b.py", "b2")]);
        let prev = previous(&[("src/a.py", "a1"), ("lib/b.py", "b1"), ("lib/c.py", "c1")]);
        let plan = plan(&inv, Some(&prev), Profile::Delta, Some("src"));
        assert_eq!(plan.modified, vec!["src/a.py"]);
        assert!(plan.deleted.is_empty());
        assert!(plan.unchanged.is_empty());
    }
}
