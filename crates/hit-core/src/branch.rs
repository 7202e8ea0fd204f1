use tracing::info;

use crate::hash::ObjectHash;
use crate::log;
use crate::refs;
use crate::repo::{Repo, RepoError};
use crate::store::Store;
use crate::tree;
use crate::worktree;

/// Create `name` at the current branch's tip, copy its log, and point HEAD
/// at the new branch. The working tree is untouched.
pub fn create_branch(repo: &Repo, name: &str) -> anyhow::Result<()> {
    let current = refs::read_head(repo)?;
    let tip = refs::read_branch(repo, &current)?;
    create_branch_at(repo, name, &tip)
}

/// Like `create_branch` but the new tip is an explicit commit hash.
pub fn create_branch_at(repo: &Repo, name: &str, tip: &ObjectHash) -> anyhow::Result<()> {
    validate_branch_name(name)?;
    if refs::branch_exists(repo, name) {
        return Err(RepoError::AlreadyExists(format!("branch '{name}'")).into());
    }

    let current = refs::read_head(repo)?;
    refs::write_branch(repo, name, tip)?;

    let current_log = log::read_branch_log(repo, &current)?;
    log::write_branch_log(repo, name, &current_log)?;

    refs::write_head(repo, name)?;
    info!(branch = name, tip = %tip, "created branch");
    Ok(())
}

/// Switch HEAD to `name` and reconcile the working tree with its tip.
/// Refused while the working tree diverges from the index.
pub fn switch_branch(repo: &Repo, store: &Store, name: &str) -> anyhow::Result<()> {
    if !refs::branch_exists(repo, name) {
        return Err(RepoError::NotFound(format!("branch '{name}'")).into());
    }

    if !worktree::is_workspace_clean(repo)? {
        return Err(RepoError::DirtyWorkspace.into());
    }

    refs::write_head(repo, name)?;
    let tip = refs::read_branch(repo, name)?;
    let tree = tree::load_tree(store, &tip)?;
    worktree::apply_tree(repo, store, &tree)?;
    info!(branch = name, tip = %tip, "switched branch");
    Ok(())
}

pub fn list_branches(repo: &Repo) -> anyhow::Result<Vec<String>> {
    refs::list_branches(repo)
}

/// Delete a branch ref and its log. A safe delete refuses while the
/// branch's tip differs from HEAD's tip.
pub fn delete_branch(repo: &Repo, name: &str, force: bool) -> anyhow::Result<()> {
    if !refs::branch_exists(repo, name) {
        return Err(RepoError::NotFound(format!("branch '{name}'")).into());
    }

    let current = refs::read_head(repo)?;
    if name == current {
        return Err(RepoError::InvalidArg(format!(
            "cannot delete the checked-out branch '{name}'"
        ))
        .into());
    }

    if !force {
        let branch_tip = refs::read_branch(repo, name)?;
        let head_tip = refs::read_branch(repo, &current)?;
        if branch_tip != head_tip {
            anyhow::bail!("branch '{name}' is not fully merged; use -D to force the delete");
        }
    }

    std::fs::remove_file(repo.branch_ref_path(name))?;
    let log_path = repo.branch_log_path(name);
    if log_path.exists() {
        std::fs::remove_file(log_path)?;
    }
    info!(branch = name, "deleted branch");
    Ok(())
}

fn validate_branch_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains("..")
        || name.starts_with('-')
        || name == "."
    {
        return Err(RepoError::InvalidArg(format!("branch name '{name}'")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::create_commit;
    use crate::index::add_file;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Repo, Store) {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let store = Store::new(repo.clone());
        (temp, repo, store)
    }

    fn write_and_commit(
        temp: &tempfile::TempDir,
        repo: &Repo,
        store: &Store,
        name: &str,
        content: &[u8],
        message: &str,
    ) -> ObjectHash {
        fs::write(temp.path().join(name), content).expect("write");
        add_file(repo, store, &temp.path().join(name)).expect("add");
        create_commit(repo, store, "tester", message).expect("commit")
    }

    #[test]
    fn create_branch_copies_tip_and_log() {
        let (temp, repo, store) = setup();
        let first = write_and_commit(&temp, &repo, &store, "a.txt", b"one\n", "first");

        create_branch(&repo, "feature").expect("branch");
        assert_eq!(refs::read_head(&repo).expect("head"), "feature");
        assert_eq!(refs::read_branch(&repo, "feature").expect("tip"), first);
        assert_eq!(
            log::read_branch_log(&repo, "feature").expect("log"),
            log::read_branch_log(&repo, "master").expect("log")
        );
    }

    #[test]
    fn create_existing_branch_fails() {
        let (_temp, repo, _store) = setup();
        create_branch(&repo, "feature").expect("branch");
        refs::write_head(&repo, "master").expect("head back");
        let err = create_branch(&repo, "feature").expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::AlreadyExists(_))
        ));
    }

    #[test]
    fn switch_refuses_dirty_worktree() {
        let (temp, repo, store) = setup();
        write_and_commit(&temp, &repo, &store, "a.txt", b"hello\n", "first");

        fs::write(temp.path().join("a.txt"), b"dirty\n").expect("dirty");
        let err = switch_branch(&repo, &store, "master").expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::DirtyWorkspace)
        ));
        assert_eq!(refs::read_head(&repo).expect("head"), "master");
    }

    #[test]
    fn switch_restores_target_tree() {
        let (temp, repo, store) = setup();
        write_and_commit(&temp, &repo, &store, "a.txt", b"base\n", "base");

        create_branch(&repo, "feature").expect("branch");
        write_and_commit(&temp, &repo, &store, "b.txt", b"feature file\n", "feature work");

        switch_branch(&repo, &store, "master").expect("switch");
        assert_eq!(refs::read_head(&repo).expect("head"), "master");
        assert!(!temp.path().join("b.txt").exists());
        assert_eq!(fs::read(temp.path().join("a.txt")).expect("read"), b"base\n");

        switch_branch(&repo, &store, "feature").expect("switch back");
        assert_eq!(
            fs::read(temp.path().join("b.txt")).expect("read"),
            b"feature file\n"
        );
    }

    #[test]
    fn safe_delete_refuses_diverged_branch() {
        let (temp, repo, store) = setup();
        write_and_commit(&temp, &repo, &store, "a.txt", b"base\n", "base");

        create_branch(&repo, "feature").expect("branch");
        write_and_commit(&temp, &repo, &store, "b.txt", b"extra\n", "ahead");
        switch_branch(&repo, &store, "master").expect("switch");

        assert!(delete_branch(&repo, "feature", false).is_err());
        delete_branch(&repo, "feature", true).expect("force delete");
        assert!(!refs::branch_exists(&repo, "feature"));
        assert!(!repo.branch_log_path("feature").exists());
    }

    #[test]
    fn cannot_delete_checked_out_branch() {
        let (_temp, repo, _store) = setup();
        let err = delete_branch(&repo, "master", true).expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::InvalidArg(_))
        ));
    }

    #[test]
    fn branch_names_are_validated() {
        let (_temp, repo, _store) = setup();
        for bad in ["", "a/b", "-x", "..", "."] {
            let err = create_branch(&repo, bad).expect_err("should fail");
            assert!(matches!(
                err.downcast_ref::<RepoError>(),
                Some(RepoError::InvalidArg(_))
            ));
        }
    }
}
