use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::util::atomic_write;

pub const REPO_DIR_NAME: &str = ".hit";
pub const OBJECTS_DIR: &str = "objects";
pub const HEAD_FILE: &str = "HEAD";
pub const CONFIG_FILE: &str = "config";
pub const INDEX_FILE: &str = "index.json";
pub const CONFLICTS_FILE: &str = "conflicts.json";
pub const IGNORE_FILE: &str = ".hitignore";
pub const DEFAULT_BRANCH: &str = "master";

/// Error kinds surfaced to the command layer. Everything else travels as a
/// plain `anyhow` chain.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not a hit repository (no .hit found in {0} or any parent)")]
    NotRepository(PathBuf),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("corrupt repository data: {0}")]
    Corrupt(String),
    #[error("path is ignored by .hitignore: {0}")]
    Ignored(String),
    #[error("no staged changes to commit")]
    NoStagedChanges,
    #[error("uncommitted changes in the working tree; commit or revert them first")]
    DirtyWorkspace,
    #[error("unresolved merge conflict in {0}")]
    UnresolvedConflict(String),
    #[error("merge produced {0} conflicted file(s); resolve and commit to finish")]
    MergeConflicts(usize),
    #[error("no common ancestor between the merged histories")]
    NoCommonAncestor,
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

#[derive(Clone, Debug)]
pub struct Repo {
    worktree: PathBuf,
    repo_dir: PathBuf,
}

impl Repo {
    /// Create the `.hit` skeleton under `worktree` and seed the default
    /// branch: a zero-hash ref, an empty log, an empty index, and a config
    /// with no remotes.
    pub fn init(worktree: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = worktree.as_ref();
        if !root.exists() {
            fs::create_dir_all(root)?;
        }

        let repo_dir = root.join(REPO_DIR_NAME);
        if repo_dir.exists() {
            return Err(RepoError::AlreadyExists(format!(
                "repository at {}",
                repo_dir.display()
            ))
            .into());
        }

        fs::create_dir_all(repo_dir.join(OBJECTS_DIR))?;
        fs::create_dir_all(repo_dir.join("refs").join("heads"))?;
        fs::create_dir_all(repo_dir.join("logs").join("refs").join("heads"))?;

        atomic_write(
            &repo_dir.join(HEAD_FILE),
            format!("ref: refs/heads/{DEFAULT_BRANCH}\n").as_bytes(),
        )?;
        atomic_write(
            &repo_dir.join("refs").join("heads").join(DEFAULT_BRANCH),
            "0".repeat(40).as_bytes(),
        )?;
        atomic_write(
            &repo_dir
                .join("logs")
                .join("refs")
                .join("heads")
                .join(DEFAULT_BRANCH),
            b"[]",
        )?;
        atomic_write(&repo_dir.join(CONFIG_FILE), b"{\n  \"remotes\": {}\n}")?;
        atomic_write(
            &repo_dir.join(INDEX_FILE),
            b"{\n  \"entries\": {},\n  \"changed\": false\n}",
        )?;

        Ok(Self {
            worktree: root.to_path_buf(),
            repo_dir,
        })
    }

    /// Open the repository rooted exactly at `worktree`.
    pub fn open(worktree: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = worktree.as_ref();
        let repo_dir = root.join(REPO_DIR_NAME);
        if !repo_dir.is_dir() {
            return Err(RepoError::NotRepository(root.to_path_buf()).into());
        }
        Ok(Self {
            worktree: root.to_path_buf(),
            repo_dir,
        })
    }

    /// Walk up from `start` until a directory containing `.hit` is found.
    pub fn discover(start: impl AsRef<Path>) -> anyhow::Result<Self> {
        let start = start.as_ref();
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(REPO_DIR_NAME).is_dir() {
                return Self::open(&dir);
            }
            if !dir.pop() {
                return Err(RepoError::NotRepository(start.to_path_buf()).into());
            }
        }
    }

    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.repo_dir.join(OBJECTS_DIR)
    }

    pub fn head_path(&self) -> PathBuf {
        self.repo_dir.join(HEAD_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.repo_dir.join(CONFIG_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.repo_dir.join(INDEX_FILE)
    }

    pub fn conflicts_path(&self) -> PathBuf {
        self.repo_dir.join(CONFLICTS_FILE)
    }

    pub fn ignore_path(&self) -> PathBuf {
        self.worktree.join(IGNORE_FILE)
    }

    pub fn heads_dir(&self) -> PathBuf {
        self.repo_dir.join("refs").join("heads")
    }

    pub fn branch_ref_path(&self, branch: &str) -> PathBuf {
        self.heads_dir().join(branch)
    }

    pub fn remote_ref_path(&self, remote: &str, branch: &str) -> PathBuf {
        self.repo_dir
            .join("refs")
            .join("remotes")
            .join(remote)
            .join(branch)
    }

    pub fn branch_log_path(&self, branch: &str) -> PathBuf {
        self.repo_dir
            .join("logs")
            .join("refs")
            .join("heads")
            .join(branch)
    }

    pub fn remote_log_path(&self, remote: &str, branch: &str) -> PathBuf {
        self.repo_dir
            .join("logs")
            .join("refs")
            .join("remotes")
            .join(remote)
            .join(branch)
    }
}
