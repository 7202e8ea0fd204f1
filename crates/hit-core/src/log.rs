use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::commit::Commit;
use crate::hash::ObjectHash;
use crate::repo::{Repo, RepoError};
use crate::util::atomic_write;

/// Per-branch commit log: a JSON array kept sorted by timestamp ascending.
/// A branch with no log file yet reads as empty.
pub fn read_branch_log(repo: &Repo, branch: &str) -> anyhow::Result<Vec<Commit>> {
    read_log_file(&repo.branch_log_path(branch))
}

pub fn write_branch_log(repo: &Repo, branch: &str, commits: &[Commit]) -> anyhow::Result<()> {
    write_log_file(&repo.branch_log_path(branch), commits)
}

pub fn read_remote_log(repo: &Repo, remote: &str, branch: &str) -> anyhow::Result<Vec<Commit>> {
    read_log_file(&repo.remote_log_path(remote, branch))
}

pub fn write_remote_log(
    repo: &Repo,
    remote: &str,
    branch: &str,
    commits: &[Commit],
) -> anyhow::Result<()> {
    write_log_file(&repo.remote_log_path(remote, branch), commits)
}

/// Append `extra` to `base`, drop duplicate hashes (first occurrence wins),
/// and sort ascending by timestamp. The sort is stable so commits sharing a
/// timestamp keep their insertion order.
pub fn merge_commits(base: Vec<Commit>, extra: impl IntoIterator<Item = Commit>) -> Vec<Commit> {
    let mut seen: HashSet<ObjectHash> = HashSet::new();
    let mut out = Vec::with_capacity(base.len());
    for commit in base.into_iter().chain(extra) {
        if seen.insert(commit.hash) {
            out.push(commit);
        }
    }
    out.sort_by_key(|commit| commit.timestamp);
    out
}

pub fn find_commit<'a>(log: &'a [Commit], hash: &ObjectHash) -> Option<&'a Commit> {
    log.iter().find(|commit| commit.hash == *hash)
}

fn read_log_file(path: &Path) -> anyhow::Result<Vec<Commit>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&data)
        .map_err(|err| RepoError::Corrupt(format!("commit log {}: {err}", path.display())).into())
}

fn write_log_file(path: &Path, commits: &[Commit]) -> anyhow::Result<()> {
    let data = serde_json::to_vec(commits)?;
    atomic_write(path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use time::macros::datetime;

    fn commit(tag: &str, at: time::OffsetDateTime) -> Commit {
        Commit {
            hash: hash_bytes(tag.as_bytes()),
            parent: ObjectHash::ZERO,
            other_parent: ObjectHash::ZERO,
            message: tag.to_string(),
            author: "tester".to_string(),
            timestamp: at,
        }
    }

    #[test]
    fn empty_branch_log_reads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        assert!(read_branch_log(&repo, "master").expect("read").is_empty());
        assert!(read_branch_log(&repo, "ghost").expect("read").is_empty());
    }

    #[test]
    fn log_roundtrip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let commits = vec![
            commit("a", datetime!(2024-01-01 10:00 UTC)),
            commit("b", datetime!(2024-01-01 11:00 UTC)),
        ];
        write_branch_log(&repo, "master", &commits).expect("write");
        let back = read_branch_log(&repo, "master").expect("read");
        assert_eq!(back, commits);
    }

    #[test]
    fn merge_dedups_and_sorts_by_timestamp() {
        let a = commit("a", datetime!(2024-01-01 10:00 UTC));
        let b = commit("b", datetime!(2024-01-01 12:00 UTC));
        let c = commit("c", datetime!(2024-01-01 11:00 UTC));

        let merged = merge_commits(vec![a.clone(), b.clone()], vec![b.clone(), c.clone()]);
        let names: Vec<&str> = merged.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn merge_is_stable_for_equal_timestamps() {
        let at = datetime!(2024-01-01 10:00 UTC);
        let merged = merge_commits(vec![commit("x", at)], vec![commit("y", at)]);
        let names: Vec<&str> = merged.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn corrupt_log_surfaces() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        std::fs::write(repo.branch_log_path("master"), b"{ not json").expect("write");
        let err = read_branch_log(&repo, "master").expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::Corrupt(_))
        ));
    }
}
