//! Commit extraction: walks the history oldest-first and emits one record per
//! commit with its per-file change set (rename following enabled).
//!
//! Extraction is pure with respect to the store: records are plain data the
//! commit stage turns into batched upserts. Diffing fans out across blocking
//! workers, each holding its own repository handle (libgit2 handles are not
//! thread-shareable).

use crate::errors::{Error, Result};

use chrono::{FixedOffset, TimeZone};
use futures::future::try_join_all;
use git2::{Delta, DiffFindOptions, DiffOptions, Oid, Repository, Sort};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-file change status, mirroring `--name-status` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Renamed,
    Deleted,
    Copied,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Renamed => "renamed",
            ChangeStatus::Deleted => "deleted",
            ChangeStatus::Copied => "copied",
        }
    }
}

/// One file touched by a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    /// Repo-relative POSIX path after the change.
    pub path: String,
    pub status: ChangeStatus,
    /// Previous path for renames and copies.
    pub old_path: Option<String>,
}

/// One commit, fully extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    /// RFC3339 with the committer's own UTC offset.
    pub timestamp: String,
    pub message: String,
    pub parents: Vec<String>,
    pub changes: Vec<FileChange>,
}

/// Walk the history reachable from HEAD, oldest first. With `since`, only
/// commits after that hash are returned (the delta commit set). Diff work is
/// spread over `max_workers` blocking tasks.
pub async fn extract_commits(
    repo_root: &Path,
    since: Option<&str>,
    max_workers: usize,
) -> Result<Vec<CommitRecord>> {
    let oids = list_oids(repo_root, since)?;
    if oids.is_empty() {
        info!("commits: nothing to extract");
        return Ok(Vec::new());
    }

    let workers = max_workers.clamp(1, num_cpus::get()).min(oids.len());
    let chunk_size = oids.len().div_ceil(workers);
    info!(
        "commits: extracting {} commit(s) across {} worker(s)",
        oids.len(),
        workers
    );

    let root: PathBuf = repo_root.to_path_buf();
    let mut tasks = Vec::with_capacity(workers);
    for chunk in oids.chunks(chunk_size) {
        let chunk: Vec<String> = chunk.to_vec();
        let root = root.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            extract_range_sync(&root, &chunk)
        }));
    }

    let mut out = Vec::with_capacity(oids.len());
    for batch in try_join_all(tasks)
        .await
        .map_err(|e| Error::Worker(e.to_string()))?
    {
        out.extend(batch?);
    }
    Ok(out)
}

/// List commit hashes oldest-first along the time-sorted walk.
pub fn list_oids(repo_root: &Path, since: Option<&str>) -> Result<Vec<String>> {
    let repo = Repository::open(repo_root)?;
    let mut walk = repo.revwalk()?;
    if walk.push_head().is_err() {
        // Unborn HEAD: an empty repository has no commits to walk.
        return Ok(Vec::new());
    }
    walk.set_sorting(Sort::TIME | Sort::REVERSE)?;
    if let Some(hash) = since {
        let oid = Oid::from_str(hash).map_err(|_| Error::BadHash(hash.to_string()))?;
        if repo.find_commit(oid).is_ok() {
            walk.hide(oid)?;
        } else {
            warn!("commits: since-hash {hash} not found, walking full history");
        }
    }
    let mut oids = Vec::new();
    for oid in walk {
        oids.push(oid?.to_string());
    }
    Ok(oids)
}

/// Synchronous extraction of a specific hash range; one repository handle per
/// call so it can run on a blocking worker.
pub fn extract_range_sync(repo_root: &Path, hashes: &[String]) -> Result<Vec<CommitRecord>> {
    let repo = Repository::open(repo_root)?;
    let mut out = Vec::with_capacity(hashes.len());
    for hash in hashes {
        let oid = Oid::from_str(hash).map_err(|_| Error::BadHash(hash.clone()))?;
        let commit = repo.find_commit(oid)?;

        let author = commit.author();
        let timestamp = format_commit_time(commit.time().seconds(), commit.time().offset_minutes());
        let parents: Vec<String> = commit.parent_ids().map(|p| p.to_string()).collect();

        let changes = match diff_against_first_parent(&repo, &commit) {
            Ok(c) => c,
            Err(err) => {
                warn!("commits: diff failed for {hash}: {err}");
                Vec::new()
            }
        };

        out.push(CommitRecord {
            hash: hash.clone(),
            author_name: author.name().unwrap_or("unknown").to_string(),
            author_email: author.email().unwrap_or("unknown").to_string(),
            timestamp,
            message: commit.message().unwrap_or("").to_string(),
            parents,
            changes,
        });
    }
    debug!("commits: worker extracted {} record(s)", out.len());
    Ok(out)
}

/// RFC3339 with the offset the commit itself carries. A bogus offset falls
/// back to UTC rather than producing a naive timestamp.
pub fn format_commit_time(seconds: i64, offset_minutes: i32) -> String {
    let offset = FixedOffset::east_opt(offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    match offset.timestamp_opt(seconds, 0) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339(),
        _ => offset
            .timestamp_opt(0, 0)
            .single()
            .expect("epoch is representable")
            .to_rfc3339(),
    }
}

fn diff_against_first_parent(
    repo: &Repository,
    commit: &git2::Commit<'_>,
) -> Result<Vec<FileChange>> {
    let tree = commit.tree()?;
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree()?),
        Err(_) => None,
    };

    let mut opts = DiffOptions::new();
    let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

    let mut find = DiffFindOptions::new();
    find.renames(true).copies(true);
    diff.find_similar(Some(&mut find))?;

    let mut changes = Vec::new();
    for delta in diff.deltas() {
        let status = match delta.status() {
            Delta::Added => ChangeStatus::Added,
            Delta::Modified => ChangeStatus::Modified,
            Delta::Renamed => ChangeStatus::Renamed,
            Delta::Deleted => ChangeStatus::Deleted,
            Delta::Copied => ChangeStatus::Copied,
            _ => continue,
        };
        let path = match status {
            ChangeStatus::Deleted => delta.old_file().path(),
            _ => delta.new_file().path(),
        };
        let Some(path) = path else { continue };
        let old_path = match status {
            ChangeStatus::Renamed | ChangeStatus::Copied => delta
                .old_file()
                .path()
                .map(|p| posix(&p.to_string_lossy())),
            _ => None,
        };
        changes.push(FileChange {
            path: posix(&path.to_string_lossy()),
            status,
            old_path,
        });
    }
    Ok(changes)
}

fn posix(path: &str) -> String {
    path.replace('\\', "/")
}
