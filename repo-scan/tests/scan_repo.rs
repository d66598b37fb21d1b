//! Scanning a throwaway repository end to end: classification, hashing,
//! decode fallback, manifest diffing.

use git2::{IndexAddOption, Repository, Signature, Time};
use repo_scan::{FileKind, Profile, RepoManifest, ScanOptions, plan, scan};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn commit_all(repo: &Repository, message: &str) {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"], IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::new("t", "t@example.com", &Time::new(1_700_000_000, 0)).unwrap();
    let parent = repo
        .head()
        .ok()
        .and_then(|h| h.target())
        .map(|oid| repo.find_commit(oid).unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

fn write(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

#[test]
fn scans_classifies_and_diffs() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    write(dir.path(), "src/app.py", b"def main():\n    pass\n");
    write(dir.path(), "docs/PRD.md", b"# Plan\n");
    write(dir.path(), "requirements.txt", b"requests==2.32.0\n");
    write(dir.path(), "legacy/notes.txt", b"caf\xE9 notes\n");
    write(dir.path(), "assets/blob.bin", b"\x00\x01\x02\x03");
    commit_all(&repo, "seed");

    let inventory = scan(dir.path(), &ScanOptions::default()).unwrap();
    assert_eq!(inventory.files.len(), 5);

    let app = inventory.get("src/app.py").unwrap();
    assert_eq!(app.kind, FileKind::Code);
    assert_eq!(app.language.as_deref(), Some("python"));
    assert_eq!(app.content_hash.len(), 64);
    assert!(app.text.as_deref().unwrap().contains("def main"));

    assert_eq!(inventory.get("docs/PRD.md").unwrap().kind, FileKind::Doc);
    assert_eq!(
        inventory.get("requirements.txt").unwrap().kind,
        FileKind::Config
    );

    let legacy = inventory.get("legacy/notes.txt").unwrap();
    let decoding = legacy.decoding.as_ref().unwrap();
    assert!(decoding.fallback_used);
    assert_eq!(decoding.encoding, "windows-1252");

    let blob = inventory.get("assets/blob.bin").unwrap();
    assert_eq!(blob.kind, FileKind::Other);
    assert!(blob.decoding.is_none());
    assert_eq!(inventory.stats.binary, 1);

    // First run: everything is added.
    let first = plan(&inventory, None, Profile::Delta, None);
    assert_eq!(first.added.len(), 5);

    // Unchanged rerun against the saved manifest is a no-op.
    let manifest = RepoManifest::from_inventory(&inventory, Some(String::from("abc")));
    let manifest_path = dir.path().join("state/manifest.json");
    manifest.save(&manifest_path).unwrap();
    let reloaded = RepoManifest::load(&manifest_path).unwrap();

    let inventory2 = scan(dir.path(), &ScanOptions::default()).unwrap();
    let second = plan(&inventory2, Some(&reloaded), Profile::Delta, None);
    assert!(second.is_noop());
    assert_eq!(second.unchanged.len(), 5);
    assert_eq!(second.since_commit.as_deref(), Some("abc"));

    // Byte-equal manifests across unchanged reruns.
    let manifest2 = RepoManifest::from_inventory(&inventory2, Some(String::from("abc")));
    assert_eq!(
        serde_json::to_string(&manifest).unwrap(),
        serde_json::to_string(&manifest2).unwrap()
    );
}

#[test]
fn untracked_files_need_the_flag() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    write(dir.path(), "tracked.md", b"# T\n");
    commit_all(&repo, "seed");
    write(dir.path(), "scratch.md", b"# S\n");

    let without = scan(dir.path(), &ScanOptions::default()).unwrap();
    assert!(without.get("scratch.md").is_none());

    let with = scan(
        dir.path(),
        &ScanOptions {
            include_untracked: true,
            ..ScanOptions::default()
        },
    )
    .unwrap();
    assert!(with.get("scratch.md").is_some());
    assert_eq!(with.stats.untracked_added, 1);
}
