use serde::{Deserialize, Serialize};

use crate::commit::Commit;
use crate::hash::ObjectHash;
use crate::repo::{Repo, RepoError};
use crate::util::atomic_write;

pub const MARKER_CURRENT: &str = "<<<<<<< HEAD (Current Branch)";
pub const MARKER_SEPARATOR: &str = "=======";
pub const MARKER_TARGET: &str = ">>>>>>> Target Branch";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Conflict,
    Resolved,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictFile {
    pub file_path: String,
    pub current_hash: ObjectHash,
    pub target_hash: ObjectHash,
    pub ancestor_hash: ObjectHash,
    pub content: String,
    pub status: ConflictStatus,
}

/// Durable record of an in-progress merge. Exists on disk
/// (`.hit/conflicts.json`) exactly while the repository is in merge state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictState {
    pub parent: ObjectHash,
    pub other_parent: ObjectHash,
    pub conflicts: Vec<ConflictFile>,
    pub resolved: Vec<String>,
    pub is_merge_state: bool,
    pub message: String,
    #[serde(default)]
    pub remote_commits: Vec<Commit>,
}

impl ConflictState {
    pub fn new_merge(parent: ObjectHash, other_parent: ObjectHash, message: String) -> Self {
        Self {
            parent,
            other_parent,
            conflicts: Vec::new(),
            resolved: Vec::new(),
            is_merge_state: true,
            message,
            remote_commits: Vec::new(),
        }
    }

    pub fn add_conflict(
        &mut self,
        file_path: String,
        current_hash: ObjectHash,
        target_hash: ObjectHash,
        ancestor_hash: ObjectHash,
        content: String,
    ) {
        self.conflicts.push(ConflictFile {
            file_path,
            current_hash,
            target_hash,
            ancestor_hash,
            content,
            status: ConflictStatus::Conflict,
        });
    }

    pub fn attach_remote_commits(&mut self, commits: Vec<Commit>) {
        self.remote_commits = commits;
    }

    pub fn mark_resolved(&mut self, file_path: &str) {
        for conflict in &mut self.conflicts {
            if conflict.file_path == file_path {
                conflict.status = ConflictStatus::Resolved;
                if !self.resolved.iter().any(|p| p == file_path) {
                    self.resolved.push(file_path.to_string());
                }
                break;
            }
        }
    }

    pub fn has_unresolved(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.status == ConflictStatus::Conflict)
    }

    pub fn unresolved_paths(&self) -> Vec<&str> {
        self.conflicts
            .iter()
            .filter(|c| c.status == ConflictStatus::Conflict)
            .map(|c| c.file_path.as_str())
            .collect()
    }

    pub fn is_file_in_conflict(&self, file_path: &str) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.file_path == file_path && c.status == ConflictStatus::Conflict)
    }

    pub fn is_file_listed(&self, file_path: &str) -> bool {
        self.conflicts.iter().any(|c| c.file_path == file_path)
    }

    pub fn save(&self, repo: &Repo) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        atomic_write(&repo.conflicts_path(), &data)
    }

    pub fn load(repo: &Repo) -> anyhow::Result<Option<Self>> {
        let path = repo.conflicts_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(path)?;
        let state = serde_json::from_slice(&data)
            .map_err(|err| RepoError::Corrupt(format!("conflicts.json: {err}")))?;
        Ok(Some(state))
    }

    pub fn clear(repo: &Repo) -> anyhow::Result<()> {
        let path = repo.conflicts_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// A file carrying any marker prefix is still unresolved.
pub fn has_conflict_markers(content: &[u8]) -> bool {
    let text = String::from_utf8_lossy(content);
    text.contains("<<<<<<< ") || text.contains("=======") || text.contains(">>>>>>> ")
}
