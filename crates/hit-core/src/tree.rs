use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hash::ObjectHash;
use crate::index::Index;
use crate::refs;
use crate::repo::{Repo, RepoError};
use crate::store::Store;

/// Snapshot of the staged paths, stored as a JSON blob under its own content
/// hash. That hash doubles as the commit hash for the rest of the system.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    #[serde(default)]
    pub entries: BTreeMap<String, ObjectHash>,
    #[serde(default)]
    pub parent: ObjectHash,
}

/// Load the tree named by a commit hash. The zero hash reads as an empty
/// tree so callers never special-case the initial commit.
pub fn load_tree(store: &Store, hash: &ObjectHash) -> anyhow::Result<Tree> {
    if hash.is_zero() {
        return Ok(Tree::default());
    }
    let data = store.load(hash)?;
    serde_json::from_slice(&data)
        .map_err(|err| RepoError::Corrupt(format!("tree {hash}: {err}")).into())
}

/// Tree at the tip of the currently checked-out branch.
pub fn head_tree(repo: &Repo, store: &Store) -> anyhow::Result<Tree> {
    let branch = refs::read_head(repo)?;
    let tip = refs::read_branch(repo, &branch)?;
    load_tree(store, &tip)
}

/// Freeze the index into a tree object and return its hash. Fails with
/// NoStagedChanges when nothing was staged since the last commit. The
/// `changed` flag is left untouched; the commit engine clears it once the
/// whole commit lands.
pub fn build_from_stage(repo: &Repo, store: &Store) -> anyhow::Result<ObjectHash> {
    let index = Index::load(repo)?;
    if !index.changed {
        return Err(RepoError::NoStagedChanges.into());
    }

    let branch = refs::read_head(repo)?;
    let parent = refs::read_branch(repo, &branch)?;

    let mut entries = BTreeMap::new();
    for (path, hash) in index.entries {
        entries.insert(path.replace('\\', "/"), hash);
    }

    let tree = Tree { entries, parent };
    let data = serde_json::to_vec(&tree)?;
    let hash = store.write(&data)?;
    debug!(tree = %hash, files = tree.entries.len(), "built tree from stage");
    Ok(hash)
}

pub fn write_tree(store: &Store, tree: &Tree) -> anyhow::Result<ObjectHash> {
    let data = serde_json::to_vec(tree)?;
    store.write(&data)
}
