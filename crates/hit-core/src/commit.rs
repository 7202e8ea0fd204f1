use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use crate::conflict::ConflictState;
use crate::hash::ObjectHash;
use crate::index::Index;
use crate::log;
use crate::refs;
use crate::repo::{Repo, RepoError};
use crate::store::Store;
use crate::tree;

/// Commit record as stored in the per-branch logs. `hash` is the content
/// hash of the commit's tree; a commit is identified by its tree.
/// `other_parent` is non-zero only for merge commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: ObjectHash,
    pub parent: ObjectHash,
    #[serde(default)]
    pub other_parent: ObjectHash,
    pub message: String,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Record the staged tree as a commit on the current branch.
///
/// In merge state the parents and (if the caller gave none) the message come
/// from the conflict state, and any remote commits carried there are folded
/// into the log. The log is written before the ref so a crash between the
/// two leaves the commit discoverable. The index `changed` flag and the
/// conflict state are cleared only after both are on disk.
pub fn create_commit(
    repo: &Repo,
    store: &Store,
    author: &str,
    message: &str,
) -> anyhow::Result<ObjectHash> {
    let state = ConflictState::load(repo)?;
    if let Some(state) = &state {
        if state.has_unresolved() {
            let path = state
                .unresolved_paths()
                .first()
                .map(|p| p.to_string())
                .unwrap_or_default();
            return Err(RepoError::UnresolvedConflict(path).into());
        }
    }

    let branch = refs::read_head(repo)?;
    let (parent, other_parent, message) = match &state {
        Some(state) => (
            state.parent,
            state.other_parent,
            if message.is_empty() {
                state.message.clone()
            } else {
                message.to_string()
            },
        ),
        None => (
            refs::read_branch(repo, &branch)?,
            ObjectHash::ZERO,
            message.to_string(),
        ),
    };

    let tree_hash = tree::build_from_stage(repo, store)?;

    let commit = Commit {
        hash: tree_hash,
        parent,
        other_parent,
        message,
        author: author.to_string(),
        timestamp: OffsetDateTime::now_utc(),
    };

    let local = log::read_branch_log(repo, &branch)?;
    let carried = state
        .as_ref()
        .map(|s| s.remote_commits.clone())
        .unwrap_or_default();
    let merged = log::merge_commits(local, std::iter::once(commit.clone()).chain(carried));
    log::write_branch_log(repo, &branch, &merged)?;

    refs::write_branch(repo, &branch, &tree_hash)?;

    let mut index = Index::load(repo)?;
    index.changed = false;
    index.save(repo)?;

    if state.is_some() {
        ConflictState::clear(repo)?;
    }

    info!(branch = %branch, commit = %tree_hash, "created commit");
    Ok(tree_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{add_all, add_file};
    use crate::tree::load_tree;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Repo, Store) {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let store = Store::new(repo.clone());
        (temp, repo, store)
    }

    #[test]
    fn add_commit_log_end_to_end() {
        let (temp, repo, store) = setup();
        fs::write(temp.path().join("a.txt"), b"hello\n").expect("write");
        add_file(&repo, &store, &temp.path().join("a.txt")).expect("add");

        let commit_hash = create_commit(&repo, &store, "tester", "x").expect("commit");

        // ref advanced to the tree hash
        assert_eq!(
            refs::read_branch(&repo, "master").expect("tip"),
            commit_hash
        );

        // single log entry with the right identity
        let log = log::read_branch_log(&repo, "master").expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].hash, commit_hash);
        assert_eq!(log[0].message, "x");
        assert_eq!(log[0].author, "tester");
        assert!(log[0].parent.is_zero());
        assert!(log[0].other_parent.is_zero());

        // the blob landed at objects/<hh>/<rest>
        let blob = crate::hash::hash_bytes(b"hello\n");
        let hex = blob.to_hex();
        assert!(temp
            .path()
            .join(".hit")
            .join("objects")
            .join(&hex[..2])
            .join(&hex[2..])
            .is_file());

        // the commit's tree resolves and references the blob
        let tree = load_tree(&store, &commit_hash).expect("tree");
        assert_eq!(tree.entries.get("a.txt"), Some(&blob));
        assert!(store.exists(&blob));

        // a second commit chains onto the first
        fs::write(temp.path().join("b.txt"), b"B").expect("write");
        add_file(&repo, &store, &temp.path().join("b.txt")).expect("add");
        let second = create_commit(&repo, &store, "tester", "y").expect("commit");
        let log = log::read_branch_log(&repo, "master").expect("log");
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].hash, second);
        assert_eq!(log[1].parent, commit_hash);
    }

    #[test]
    fn commit_without_staged_changes_fails() {
        let (_temp, repo, store) = setup();
        let err = create_commit(&repo, &store, "tester", "nothing").expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::NoStagedChanges)
        ));
    }

    #[test]
    fn commit_clears_changed_flag() {
        let (temp, repo, store) = setup();
        fs::write(temp.path().join("a.txt"), b"one").expect("write");
        add_all(&repo, &store, temp.path()).expect("add");
        assert!(Index::load(&repo).expect("load").changed);

        create_commit(&repo, &store, "tester", "first").expect("commit");
        let index = Index::load(&repo).expect("reload");
        assert!(!index.changed);
        assert!(index.entries.contains_key("a.txt"));
    }

    #[test]
    fn revert_after_stage_leaves_log_untouched() {
        let (temp, repo, store) = setup();
        fs::write(temp.path().join("a.txt"), b"hello\n").expect("write");
        add_file(&repo, &store, &temp.path().join("a.txt")).expect("add");
        create_commit(&repo, &store, "tester", "x").expect("commit");

        fs::write(temp.path().join("a.txt"), b"world\n").expect("edit");
        add_file(&repo, &store, &temp.path().join("a.txt")).expect("stage edit");
        crate::index::revert_path(&repo, &store, &temp.path().join("a.txt")).expect("revert");

        assert_eq!(fs::read(temp.path().join("a.txt")).expect("read"), b"hello\n");
        let index = Index::load(&repo).expect("load");
        assert_eq!(
            index.entries.get("a.txt"),
            Some(&crate::hash::hash_bytes(b"hello\n"))
        );
        assert_eq!(log::read_branch_log(&repo, "master").expect("log").len(), 1);
    }

    #[test]
    fn commit_serde_schema() {
        let commit = Commit {
            hash: crate::hash::hash_bytes(b"tree"),
            parent: ObjectHash::ZERO,
            other_parent: ObjectHash::ZERO,
            message: "msg".to_string(),
            author: "tester".to_string(),
            timestamp: time::macros::datetime!(2024-06-01 12:00 UTC),
        };
        let json = serde_json::to_string(&commit).expect("serialize");
        assert!(json.contains("\"otherParent\""));
        assert!(json.contains("\"timestamp\":\"2024-06-01T12:00:00Z\""));

        // otherParent may be omitted entirely in older payloads
        let legacy = r#"{"hash":"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa","parent":"","message":"m","author":"a","timestamp":"2024-06-01T12:00:00Z"}"#;
        let parsed: Commit = serde_json::from_str(legacy).expect("deserialize");
        assert!(parsed.other_parent.is_zero());
        assert!(parsed.parent.is_zero());
    }
}
