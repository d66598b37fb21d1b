//! Persisted run manifest: the content-addressed record of the previous run.
//!
//! Stored as JSON next to the graph data, keyed by repo-relative path. The
//! map is a `BTreeMap` so serialization is canonically ordered and reruns on
//! an unchanged tree produce byte-equal manifests.

use crate::errors::Result;
use crate::scan::FileInventory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub size: u64,
    pub mtime: f64,
    pub content_hash: String,
    pub encoding: String,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoManifest {
    pub schema_version: u32,
    pub repo_root: String,
    pub last_ingested_commit: Option<String>,
    pub files: BTreeMap<String, ManifestEntry>,
}

impl RepoManifest {
    pub fn empty(repo_root: &Path) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            repo_root: repo_root.to_string_lossy().into_owned(),
            last_ingested_commit: None,
            files: BTreeMap::new(),
        }
    }

    /// Build a manifest snapshot of the current inventory, carrying forward
    /// the last ingested commit until the commit stage advances it.
    pub fn from_inventory(inventory: &FileInventory, last_ingested_commit: Option<String>) -> Self {
        let mut files = BTreeMap::new();
        for f in &inventory.files {
            files.insert(
                f.path.clone(),
                ManifestEntry {
                    size: f.size,
                    mtime: f.mtime,
                    content_hash: f.content_hash.clone(),
                    encoding: f
                        .decoding
                        .as_ref()
                        .map(|d| d.encoding.clone())
                        .unwrap_or_else(|| String::from("binary")),
                    fallback_used: f.decoding.as_ref().map(|d| d.fallback_used).unwrap_or(false),
                },
            );
        }
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            repo_root: inventory.root.to_string_lossy().into_owned(),
            last_ingested_commit,
            files,
        }
    }

    /// Load the previous manifest. Anything unreadable (absent file, schema
    /// mismatch, parse error) is treated as "no previous run".
    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&raw) {
            Ok(m) if m.schema_version == MANIFEST_SCHEMA_VERSION => Some(m),
            Ok(m) => {
                warn!(
                    "manifest: schema version {} != {}, ignoring previous manifest",
                    m.schema_version, MANIFEST_SCHEMA_VERSION
                );
                None
            }
            Err(err) => {
                warn!("manifest: unreadable previous manifest: {err}");
                None
            }
        }
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        info!("manifest: saved {} file(s) -> {}", self.files.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> RepoManifest {
        let mut files = BTreeMap::new();
        files.insert(
            String::from("src/a.py"),
            ManifestEntry {
                size: 10,
                mtime: 1.5,
                content_hash: String::from("ab"),
                encoding: String::from("utf-8"),
                fallback_used: false,
            },
        );
        RepoManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            repo_root: String::from("/repo"),
            last_ingested_commit: Some(String::from("deadbeef")),
            files,
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("manifest.json");
        let m = sample();
        m.save(&path).unwrap();
        assert_eq!(RepoManifest::load(&path), Some(m));
    }

    #[test]
    fn schema_mismatch_is_no_previous_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut m = sample();
        m.schema_version = 99;
        std::fs::write(&path, serde_json::to_string(&m).unwrap()).unwrap();
        assert_eq!(RepoManifest::load(&path), None);
    }

    #[test]
    fn serialization_is_canonically_ordered() {
        let m = sample();
        let a = serde_json::to_string(&m).unwrap();
        let b = serde_json::to_string(&m.clone()).unwrap();
        assert_eq!(a, b);
    }
}
