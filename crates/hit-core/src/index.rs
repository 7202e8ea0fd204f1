use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conflict::{has_conflict_markers, ConflictState};
use crate::hash::ObjectHash;
use crate::ignore::HitIgnore;
use crate::repo::{Repo, RepoError};
use crate::store::Store;
use crate::tree;
use crate::util::atomic_write;
use crate::worktree;

/// Staging area: the set of paths that will appear in the next tree.
/// `changed` is set by every staging mutation and cleared by the commit
/// engine after a commit fully lands.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub entries: BTreeMap<String, ObjectHash>,
    #[serde(default)]
    pub changed: bool,
}

impl Index {
    pub fn load(repo: &Repo) -> anyhow::Result<Self> {
        let path = repo.index_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&data)
            .map_err(|err| RepoError::Corrupt(format!("index.json: {err}")).into())
    }

    pub fn save(&self, repo: &Repo) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        atomic_write(&repo.index_path(), &data)
    }
}

/// Repo-relative, forward-slash form of `path`. Rejects paths outside the
/// working tree.
pub fn rel_path(repo: &Repo, path: &Path) -> anyhow::Result<String> {
    let abs = std::path::absolute(path)?;
    let rel = abs
        .strip_prefix(repo.worktree())
        .map_err(|_| RepoError::InvalidArg(format!("{} is outside the repository", path.display())))?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(RepoError::InvalidArg(format!(
                    "unsupported path component in {}",
                    path.display()
                ))
                .into())
            }
        }
    }
    Ok(parts.join("/"))
}

/// Hash a workspace file into the object store and record it in the index.
///
/// A file that vanished is dropped from the index before the NotFound error
/// surfaces, so a bulk add self-heals stale entries. A file still carrying
/// conflict markers is rejected; a successfully added file that is listed in
/// the conflict state is marked resolved.
pub fn add_file(repo: &Repo, store: &Store, path: &Path) -> anyhow::Result<ObjectHash> {
    let rel = rel_path(repo, path)?;
    if rel.is_empty() {
        return Err(RepoError::InvalidArg("cannot add the repository root as a file".into()).into());
    }

    let abs = repo.worktree().join(&rel);
    if !abs.is_file() {
        let mut index = Index::load(repo)?;
        if index.entries.remove(&rel).is_some() {
            index.changed = true;
            index.save(repo)?;
        }
        return Err(RepoError::NotFound(format!("file {rel}")).into());
    }

    let ignore = HitIgnore::load(repo)?;
    if ignore.is_ignored(&rel, false) {
        return Err(RepoError::Ignored(rel).into());
    }

    let content = fs::read(&abs)?;
    if has_conflict_markers(&content) {
        return Err(RepoError::UnresolvedConflict(rel).into());
    }

    let hash = store.write(&content)?;

    let mut index = Index::load(repo)?;
    if index.entries.get(&rel) != Some(&hash) {
        index.entries.insert(rel.clone(), hash);
        index.changed = true;
        index.save(repo)?;
        debug!(path = %rel, hash = %hash, "staged file");
    }

    if let Some(mut state) = ConflictState::load(repo)? {
        if state.is_file_listed(&rel) {
            state.mark_resolved(&rel);
            state.save(repo)?;
        }
    }

    Ok(hash)
}

/// Stage every non-ignored file under `dir`, then drop index entries under
/// `dir` whose workspace files no longer exist. Files that are ignored or
/// still conflicted are skipped rather than failing the batch.
pub fn add_all(repo: &Repo, store: &Store, dir: &Path) -> anyhow::Result<usize> {
    let prefix = rel_path(repo, dir)?;
    let ignore = HitIgnore::load(repo)?;
    let files = worktree::walk_files(repo, &ignore)?;

    let mut added = 0usize;
    for rel in &files {
        if !under_prefix(rel, &prefix) {
            continue;
        }
        match add_file(repo, store, &repo.worktree().join(rel)) {
            Ok(_) => added += 1,
            Err(err) => match err.downcast_ref::<RepoError>() {
                Some(RepoError::Ignored(_))
                | Some(RepoError::UnresolvedConflict(_))
                | Some(RepoError::NotFound(_)) => continue,
                _ => return Err(err),
            },
        }
    }

    let mut index = Index::load(repo)?;
    let stale: Vec<String> = index
        .entries
        .keys()
        .filter(|rel| under_prefix(rel, &prefix) && !repo.worktree().join(rel.as_str()).is_file())
        .cloned()
        .collect();
    if !stale.is_empty() {
        for rel in stale {
            index.entries.remove(&rel);
        }
        index.changed = true;
        index.save(repo)?;
    }

    Ok(added)
}

/// Restore the index entry for `path` from HEAD's tree: re-point it at the
/// committed hash, or drop it when HEAD does not know the path.
pub fn reset_path(repo: &Repo, store: &Store, path: &Path) -> anyhow::Result<()> {
    let rel = rel_path(repo, path)?;
    let head = tree::head_tree(repo, store)?;
    let mut index = Index::load(repo)?;

    match head.entries.get(&rel) {
        Some(hash) => {
            index.entries.insert(rel, *hash);
        }
        None => {
            if index.entries.remove(&rel).is_none() {
                return Err(RepoError::NotFound(format!("staged entry {rel}")).into());
            }
        }
    }
    index.changed = true;
    index.save(repo)
}

/// Restore the workspace file for `path` to its last committed state. A
/// path HEAD does not know falls back to the staged hash. The index is
/// reconciled to the restored hash.
pub fn revert_path(repo: &Repo, store: &Store, path: &Path) -> anyhow::Result<ObjectHash> {
    let rel = rel_path(repo, path)?;

    if let Some(state) = ConflictState::load(repo)? {
        if state.is_file_in_conflict(&rel) {
            return Err(RepoError::UnresolvedConflict(rel).into());
        }
    }

    let head = tree::head_tree(repo, store)?;
    let mut index = Index::load(repo)?;

    let head_hash = head.entries.get(&rel).copied();
    let staged_hash = index.entries.get(&rel).copied();

    let target = match (head_hash, staged_hash) {
        (Some(committed), _) => committed,
        (None, Some(staged)) => staged,
        (None, None) => return Err(RepoError::NotFound(format!("tracked file {rel}")).into()),
    };

    worktree::restore_file(repo, store, &rel, &target)?;

    if index.entries.get(&rel) != Some(&target) {
        index.entries.insert(rel, target);
        index.changed = true;
        index.save(repo)?;
    }
    Ok(target)
}

fn under_prefix(rel: &str, prefix: &str) -> bool {
    prefix.is_empty() || rel == prefix || rel.starts_with(&format!("{prefix}/"))
}
