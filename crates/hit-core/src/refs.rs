use std::fs;
use std::path::Path;

use crate::hash::ObjectHash;
use crate::repo::{Repo, RepoError};
use crate::util::atomic_write;

/// Read the branch HEAD points at. Only symbolic `ref: refs/heads/<branch>`
/// heads exist; anything else is corrupt.
pub fn read_head(repo: &Repo) -> anyhow::Result<String> {
    let data = fs::read_to_string(repo.head_path())?;
    let rest = data
        .strip_prefix("ref: refs/heads/")
        .ok_or_else(|| RepoError::Corrupt(format!("HEAD contents {data:?}")))?;
    Ok(rest.trim_end().to_string())
}

pub fn write_head(repo: &Repo, branch: &str) -> anyhow::Result<()> {
    let data = format!("ref: refs/heads/{branch}\n");
    atomic_write(&repo.head_path(), data.as_bytes())
}

pub fn branch_exists(repo: &Repo, branch: &str) -> bool {
    repo.branch_ref_path(branch).is_file()
}

/// Tip of a local branch. The zero hash means the branch has no commits yet.
pub fn read_branch(repo: &Repo, branch: &str) -> anyhow::Result<ObjectHash> {
    read_ref_file(&repo.branch_ref_path(branch), &format!("branch {branch}"))
}

pub fn write_branch(repo: &Repo, branch: &str, hash: &ObjectHash) -> anyhow::Result<()> {
    atomic_write(&repo.branch_ref_path(branch), hash.to_hex().as_bytes())
}

pub fn read_remote_ref(repo: &Repo, remote: &str, branch: &str) -> anyhow::Result<ObjectHash> {
    read_ref_file(
        &repo.remote_ref_path(remote, branch),
        &format!("remote branch {remote}/{branch}"),
    )
}

pub fn write_remote_ref(
    repo: &Repo,
    remote: &str,
    branch: &str,
    hash: &ObjectHash,
) -> anyhow::Result<()> {
    atomic_write(
        &repo.remote_ref_path(remote, branch),
        hash.to_hex().as_bytes(),
    )
}

pub fn list_branches(repo: &Repo) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    let heads = repo.heads_dir();
    if !heads.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(heads)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            out.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    out.sort();
    Ok(out)
}

fn read_ref_file(path: &Path, what: &str) -> anyhow::Result<ObjectHash> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(RepoError::NotFound(what.to_string()).into());
        }
        Err(err) => return Err(err.into()),
    };
    ObjectHash::from_hex(data.trim_end())
        .ok_or_else(|| RepoError::Corrupt(format!("ref {what}: {data:?}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    #[test]
    fn head_roundtrip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        assert_eq!(read_head(&repo).expect("head"), "master");

        write_head(&repo, "feature").expect("write");
        assert_eq!(read_head(&repo).expect("head"), "feature");
    }

    #[test]
    fn init_branch_tip_is_zero() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        assert!(read_branch(&repo, "master").expect("tip").is_zero());
    }

    #[test]
    fn branch_ref_roundtrip_and_listing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let tip = hash_bytes(b"tree");
        write_branch(&repo, "feature", &tip).expect("write");

        assert_eq!(read_branch(&repo, "feature").expect("read"), tip);
        assert_eq!(
            list_branches(&repo).expect("list"),
            vec!["feature".to_string(), "master".to_string()]
        );
    }

    #[test]
    fn missing_ref_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let err = read_branch(&repo, "ghost").expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::NotFound(_))
        ));
        let err = read_remote_ref(&repo, "origin", "master").expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::NotFound(_))
        ));
    }

    #[test]
    fn remote_ref_roundtrip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let tip = hash_bytes(b"remote tree");
        write_remote_ref(&repo, "origin", "master", &tip).expect("write");
        assert_eq!(read_remote_ref(&repo, "origin", "master").expect("read"), tip);
    }
}
