//! End-to-end extraction against throwaway repositories.

use git2::{Repository, Signature, Time};
use git_history::{ChangeStatus, chain_pairs, extract_commits, latest_hash, list_oids};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn sig(seconds: i64) -> Signature<'static> {
    Signature::new("Test Author", "author@example.com", &Time::new(seconds, 120)).unwrap()
}

fn commit_all(repo: &Repository, message: &str, seconds: i64) -> String {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let signature = sig(seconds);
    let parent = repo
        .head()
        .ok()
        .and_then(|h| h.target())
        .map(|oid| repo.find_commit(oid).unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
        .to_string()
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn extracts_statuses_and_chain() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    write(dir.path(), "src/a.py", "def foo():\n    pass\n");
    let first = commit_all(&repo, "add foo", 1_700_000_000);

    write(dir.path(), "src/a.py", "def foo():\n    return 1\n");
    write(dir.path(), "docs/PRD.md", "# Plan\n");
    let second = commit_all(&repo, "grow foo", 1_700_000_100);

    let commits = extract_commits(dir.path(), None, 2).await.unwrap();
    assert_eq!(commits.len(), 2);

    let c1 = commits.iter().find(|c| c.hash == first).unwrap();
    assert_eq!(c1.changes.len(), 1);
    assert_eq!(c1.changes[0].status, ChangeStatus::Added);
    assert_eq!(c1.changes[0].path, "src/a.py");
    assert!(c1.parents.is_empty());
    // Offsets survive extraction (+02:00 from Time::new(.., 120)).
    assert!(c1.timestamp.ends_with("+02:00"), "got {}", c1.timestamp);

    let c2 = commits.iter().find(|c| c.hash == second).unwrap();
    assert_eq!(c2.parents, vec![first.clone()]);
    let statuses: Vec<_> = c2.changes.iter().map(|ch| (ch.path.as_str(), ch.status)).collect();
    assert!(statuses.contains(&("src/a.py", ChangeStatus::Modified)));
    assert!(statuses.contains(&("docs/PRD.md", ChangeStatus::Added)));

    let pairs = chain_pairs(&commits);
    assert_eq!(pairs, vec![(first, second.clone())]);
    assert_eq!(latest_hash(&commits), Some(second));
}

#[tokio::test]
async fn follows_renames() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    write(dir.path(), "src/a.py", "def foo():\n    pass\n# stable body\n");
    commit_all(&repo, "add a", 1_700_000_000);

    fs::rename(dir.path().join("src/a.py"), dir.path().join("src/b.py")).unwrap();
    let mut index = repo.index().unwrap();
    index.remove_path(Path::new("src/a.py")).unwrap();
    index.add_path(Path::new("src/b.py")).unwrap();
    index.write().unwrap();
    let rename = commit_all(&repo, "rename a to b", 1_700_000_200);

    let commits = extract_commits(dir.path(), None, 1).await.unwrap();
    let c = commits.iter().find(|c| c.hash == rename).unwrap();
    assert_eq!(c.changes.len(), 1);
    assert_eq!(c.changes[0].status, ChangeStatus::Renamed);
    assert_eq!(c.changes[0].path, "src/b.py");
    assert_eq!(c.changes[0].old_path.as_deref(), Some("src/a.py"));
}

#[tokio::test]
async fn since_hash_limits_the_walk() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    write(dir.path(), "a.txt", "one\n");
    let first = commit_all(&repo, "one", 1_700_000_000);
    write(dir.path(), "b.txt", "two\n");
    let second = commit_all(&repo, "two", 1_700_000_100);

    let delta = extract_commits(dir.path(), Some(&first), 1).await.unwrap();
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].hash, second);
}

#[test]
fn empty_repo_yields_no_oids() {
    let dir = TempDir::new().unwrap();
    Repository::init(dir.path()).unwrap();
    assert!(list_oids(dir.path(), None).unwrap().is_empty());
}
