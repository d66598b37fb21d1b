//! Repository inventory scanning.
//!
//! Enumerates tracked files from the VCS index (optionally augmented with a
//! working-tree walk), classifies them, reads text through the decode ladder
//! and hashes content. All paths are repo-relative POSIX.

use crate::decode::{DecodeInfo, decode_text, looks_binary};
use crate::errors::{Error, Result};

use git2::Repository;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Coarse file classification driving which stages touch the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Code,
    Doc,
    Config,
    Data,
    Other,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Code => "code",
            FileKind::Doc => "doc",
            FileKind::Config => "config",
            FileKind::Data => "data",
            FileKind::Other => "other",
        }
    }
}

/// One scanned file. `text` is kept in memory for the chunking stages and is
/// never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Repo-relative POSIX path (the File node key).
    pub path: String,
    pub kind: FileKind,
    pub language: Option<String>,
    pub size: u64,
    /// Seconds since epoch, fractional.
    pub mtime: f64,
    /// SHA-256 of the raw bytes, lowercase hex.
    pub content_hash: String,
    /// Absent for binary files.
    pub decoding: Option<DecodeInfo>,
    #[serde(skip)]
    pub text: Option<String>,
}

/// Scan counters surfaced in stage telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub tracked: usize,
    pub untracked_added: usize,
    pub skipped_too_large: usize,
    pub binary: usize,
    pub decode_fallbacks: usize,
}

/// The scan result: every eligible file plus counters.
#[derive(Debug, Clone)]
pub struct FileInventory {
    pub root: PathBuf,
    pub files: Vec<FileRecord>,
    pub stats: ScanStats,
}

impl FileInventory {
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Set of all scanned paths, for import resolution and delta diffing.
    pub fn path_set(&self) -> BTreeSet<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub include_untracked: bool,
    /// Files larger than this are skipped with a warning.
    pub max_file_bytes: u64,
    /// Glob patterns excluded from the inventory.
    pub ignore_globs: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_untracked: false,
            max_file_bytes: 10 * 1024 * 1024,
            ignore_globs: vec![
                String::from("**/.repograph/**"),
                String::from("**/node_modules/**"),
                String::from("**/target/**"),
                String::from("**/__pycache__/**"),
            ],
        }
    }
}

fn build_globset(patterns: &[String]) -> Option<globset::GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        match globset::Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => warn!("scan: bad ignore glob {pattern:?}: {err}"),
        }
    }
    builder.build().ok()
}

/// Walk the repository once and build the inventory.
pub fn scan(repo_root: &Path, opts: &ScanOptions) -> Result<FileInventory> {
    let root = dunce::canonicalize(repo_root).map_err(|_| Error::MissingRoot(repo_root.into()))?;
    info!("scan: start -> {}", root.display());

    let mut rel_paths: BTreeSet<String> = BTreeSet::new();

    let repo = Repository::open(&root)?;
    let index = repo.index()?;
    for entry in index.iter() {
        let rel = String::from_utf8_lossy(&entry.path).into_owned();
        rel_paths.insert(normalize_rel(&rel));
    }
    let mut stats = ScanStats {
        tracked: rel_paths.len(),
        ..ScanStats::default()
    };

    if opts.include_untracked {
        for rel in walk_working_tree(&root) {
            if rel_paths.insert(rel) {
                stats.untracked_added += 1;
            }
        }
    }

    let ignore = build_globset(&opts.ignore_globs);

    let mut files = Vec::with_capacity(rel_paths.len());
    for rel in rel_paths {
        if let Some(set) = &ignore {
            if set.is_match(&rel) {
                debug!("scan: ignore (glob) {rel}");
                continue;
            }
        }
        let abs = root.join(&rel);
        let meta = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(err) => {
                debug!("scan: metadata failed for {rel}: {err}");
                continue;
            }
        };
        // Symlinks are resolved, but only when they stay inside the repo.
        let meta = if meta.file_type().is_symlink() {
            match dunce::canonicalize(&abs) {
                Ok(target) if target.starts_with(&root) => match fs::metadata(&abs) {
                    Ok(m) if m.is_file() => m,
                    _ => continue,
                },
                _ => {
                    debug!("scan: symlink leaves repo, skipped: {rel}");
                    continue;
                }
            }
        } else if meta.is_file() {
            meta
        } else {
            continue;
        };

        let size = meta.len();
        if size > opts.max_file_bytes {
            warn!("scan: skip (size {size} > max {}) {rel}", opts.max_file_bytes);
            stats.skipped_too_large += 1;
            continue;
        }

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let bytes = match fs::read(&abs) {
            Ok(b) => b,
            Err(err) => {
                warn!("scan: read failed for {rel}: {err}");
                continue;
            }
        };
        let content_hash = sha256_hex(&bytes);

        if looks_binary(&bytes) {
            stats.binary += 1;
            files.push(FileRecord {
                path: rel,
                kind: FileKind::Other,
                language: None,
                size,
                mtime,
                content_hash,
                decoding: None,
                text: None,
            });
            continue;
        }

        let (text, decoding) = decode_text(&bytes);
        if decoding.fallback_used {
            stats.decode_fallbacks += 1;
        }
        let kind = classify(&rel);
        let language = language_for(&rel);
        files.push(FileRecord {
            path: rel,
            kind,
            language,
            size,
            mtime,
            content_hash,
            decoding: Some(decoding),
            text: Some(text),
        });
    }

    info!(
        "scan: done, total={} (tracked={}, untracked={}, too_large={}, binary={}, fallbacks={})",
        files.len(),
        stats.tracked,
        stats.untracked_added,
        stats.skipped_too_large,
        stats.binary,
        stats.decode_fallbacks
    );

    Ok(FileInventory { root, files, stats })
}

/// Classify by extension and path pattern. Documentation trees win over
/// extension so planning material under `docs/` is treated as doc even when
/// it is a script or a config sample.
pub fn classify(rel: &str) -> FileKind {
    let lower = rel.to_ascii_lowercase();
    if lower.starts_with("docs/") || lower.contains("/docs/") {
        return FileKind::Doc;
    }
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    if name.starts_with("requirements") && name.ends_with(".txt") {
        return FileKind::Config;
    }
    match ext_of(&lower) {
        "md" | "markdown" | "rst" | "txt" => FileKind::Doc,
        "py" | "ts" | "tsx" | "js" | "jsx" | "go" | "rs" | "java" | "cpp" | "cc" | "c" | "h"
        | "hpp" => FileKind::Code,
        "json" | "yaml" | "yml" | "toml" | "ini" | "cfg" => FileKind::Config,
        "csv" | "tsv" | "jsonl" | "ndjson" | "parquet" => FileKind::Data,
        _ => {
            let name = lower.rsplit('/').next().unwrap_or(&lower);
            if name.starts_with("dockerfile") {
                FileKind::Config
            } else {
                FileKind::Other
            }
        }
    }
}

/// Language tag for code files, by extension.
pub fn language_for(rel: &str) -> Option<String> {
    let lang = match ext_of(&rel.to_ascii_lowercase()) {
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        _ => return None,
    };
    Some(lang.to_string())
}

/// Forward slashes only, no leading "./".
pub fn normalize_rel(rel: &str) -> String {
    let s = rel.replace('\\', "/");
    s.trim_start_matches("./").to_string()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

fn ext_of(lower: &str) -> &str {
    lower.rsplit('/').next().unwrap_or(lower).rsplit('.').next().unwrap_or("")
}

fn walk_working_tree(root: &Path) -> Vec<String> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(keep_entry);
    let mut out = Vec::new();
    for entry in walker.filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            out.push(normalize_rel(&rel.to_string_lossy()));
        }
    }
    out
}

/// Skip heavy/vendor folders before descending.
fn keep_entry(entry: &DirEntry) -> bool {
    if entry.file_type().is_dir() {
        if let Some(name) = entry.file_name().to_str() {
            return !matches!(
                name,
                ".git"
                    | ".repograph"
                    | "node_modules"
                    | "target"
                    | "build"
                    | "dist"
                    | ".venv"
                    | "__pycache__"
            );
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_path_and_extension() {
        assert_eq!(classify("src/a.py"), FileKind::Code);
        assert_eq!(classify("README.md"), FileKind::Doc);
        assert_eq!(classify("docs/sprint-1/plan.yaml"), FileKind::Doc);
        assert_eq!(classify("config/app.toml"), FileKind::Config);
        assert_eq!(classify("Dockerfile.dev"), FileKind::Config);
        assert_eq!(classify("requirements-dev.txt"), FileKind::Config);
        assert_eq!(classify("data/events.jsonl"), FileKind::Data);
        assert_eq!(classify("assets/logo.png"), FileKind::Other);
    }

    #[test]
    fn language_mapping() {
        assert_eq!(language_for("x/y.py").as_deref(), Some("python"));
        assert_eq!(language_for("a.tsx").as_deref(), Some("typescript"));
        assert_eq!(language_for("a.png"), None);
    }

    #[test]
    fn normalization_strips_backslashes_and_dot_prefix() {
        assert_eq!(normalize_rel("src\\win\\path.py"), "src/win/path.py");
        assert_eq!(normalize_rel("./src/a.py"), "src/a.py");
    }

    #[test]
    fn ext_handles_nested_names() {
        assert_eq!(ext_of("a/b/c.spec.ts"), "ts");
        assert_eq!(ext_of("makefile"), "makefile");
    }
}
