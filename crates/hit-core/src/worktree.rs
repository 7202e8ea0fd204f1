use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::hash::{hash_bytes, ObjectHash};
use crate::ignore::HitIgnore;
use crate::index::Index;
use crate::repo::Repo;
use crate::store::Store;
use crate::tree::Tree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub path: String,
    pub status: ChangeStatus,
}

/// Relative paths of every non-ignored file under the working tree.
pub fn walk_files(repo: &Repo, ignore: &HitIgnore) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    walk_dir(repo.worktree(), repo.worktree(), ignore, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk_dir(
    root: &Path,
    dir: &Path,
    ignore: &HitIgnore,
    out: &mut Vec<String>,
) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = rel_str(root, &path);
        let is_dir = entry.file_type()?.is_dir();
        if ignore.is_ignored(&rel, is_dir) {
            continue;
        }
        if is_dir {
            walk_dir(root, &path, ignore, out)?;
        } else if entry.file_type()?.is_file() {
            out.push(rel);
        }
    }
    Ok(())
}

/// Hash every non-ignored workspace file. Re-reads only; nothing is written
/// to the object store.
pub fn snapshot(repo: &Repo) -> anyhow::Result<BTreeMap<String, ObjectHash>> {
    let ignore = HitIgnore::load(repo)?;
    let mut out = BTreeMap::new();
    for rel in walk_files(repo, &ignore)? {
        let content = fs::read(repo.worktree().join(&rel))?;
        out.insert(rel, hash_bytes(&content));
    }
    Ok(out)
}

/// Added/Modified/Deleted between two path->hash maps, sorted by path.
pub fn diff(
    from: &BTreeMap<String, ObjectHash>,
    to: &BTreeMap<String, ObjectHash>,
) -> Vec<Change> {
    let mut out = Vec::new();
    for (path, hash) in to {
        match from.get(path) {
            None => out.push(Change {
                path: path.clone(),
                status: ChangeStatus::Added,
            }),
            Some(old) if old != hash => out.push(Change {
                path: path.clone(),
                status: ChangeStatus::Modified,
            }),
            Some(_) => {}
        }
    }
    for path in from.keys() {
        if !to.contains_key(path) {
            out.push(Change {
                path: path.clone(),
                status: ChangeStatus::Deleted,
            });
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// The working tree is clean when its snapshot equals the index exactly.
pub fn is_workspace_clean(repo: &Repo) -> anyhow::Result<bool> {
    let index = Index::load(repo)?;
    Ok(snapshot(repo)? == index.entries)
}

/// Write the blob named by `hash` to `rel`, creating parent directories.
pub fn restore_file(repo: &Repo, store: &Store, rel: &str, hash: &ObjectHash) -> anyhow::Result<()> {
    let full = repo.worktree().join(rel);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = store.load(hash)?;
    fs::write(&full, content)?;
    Ok(())
}

/// Reconcile the working tree and index with `tree`: delete indexed files
/// the tree no longer tracks (ignored paths are retained), restore every
/// tracked file, then replace the index with the tree's entries.
pub fn apply_tree(repo: &Repo, store: &Store, tree: &Tree) -> anyhow::Result<()> {
    let ignore = HitIgnore::load(repo)?;
    let index = Index::load(repo)?;

    for path in index.entries.keys() {
        if tree.entries.contains_key(path) || ignore.is_ignored(path, false) {
            continue;
        }
        let full = repo.worktree().join(path);
        match fs::remove_file(&full) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }

    let mut entries = BTreeMap::new();
    for (path, hash) in &tree.entries {
        if ignore.is_ignored(path, false) {
            continue;
        }
        restore_file(repo, store, path, hash)?;
        entries.insert(path.clone(), *hash);
    }

    let index = Index {
        entries,
        changed: false,
    };
    index.save(repo)?;
    debug!(files = tree.entries.len(), "applied tree to working tree");
    Ok(())
}

fn rel_str(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Repo, Store) {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let store = Store::new(repo.clone());
        (temp, repo, store)
    }

    #[test]
    fn snapshot_skips_repo_dir_and_ignored() {
        let (temp, repo, _store) = setup();
        fs::write(temp.path().join("keep.txt"), b"ok").expect("write");
        fs::write(temp.path().join("skip.log"), b"no").expect("write");
        fs::write(temp.path().join(".hitignore"), b"*.log\n").expect("write");

        let snap = snapshot(&repo).expect("snapshot");
        assert!(snap.contains_key("keep.txt"));
        assert!(snap.contains_key(".hitignore"));
        assert!(!snap.contains_key("skip.log"));
        assert!(snap.keys().all(|p| !p.starts_with(".hit/")));
    }

    #[test]
    fn diff_classifies_changes() {
        let mut from = BTreeMap::new();
        from.insert("same".to_string(), hash_bytes(b"1"));
        from.insert("edited".to_string(), hash_bytes(b"old"));
        from.insert("gone".to_string(), hash_bytes(b"x"));

        let mut to = BTreeMap::new();
        to.insert("same".to_string(), hash_bytes(b"1"));
        to.insert("edited".to_string(), hash_bytes(b"new"));
        to.insert("fresh".to_string(), hash_bytes(b"y"));

        let changes = diff(&from, &to);
        assert_eq!(
            changes,
            vec![
                Change {
                    path: "edited".to_string(),
                    status: ChangeStatus::Modified
                },
                Change {
                    path: "fresh".to_string(),
                    status: ChangeStatus::Added
                },
                Change {
                    path: "gone".to_string(),
                    status: ChangeStatus::Deleted
                },
            ]
        );
    }

    #[test]
    fn apply_tree_restores_and_deletes() {
        let (temp, repo, store) = setup();

        // stage two files, commit-like state via direct index write
        fs::write(temp.path().join("stale.txt"), b"stale").expect("write");
        let stale_hash = store.write(b"stale").expect("blob");
        let kept_hash = store.write(b"kept contents\n").expect("blob");

        let mut index = Index::load(&repo).expect("load");
        index.entries.insert("stale.txt".to_string(), stale_hash);
        index.changed = true;
        index.save(&repo).expect("save");

        let mut tree = Tree::default();
        tree.entries.insert("dir/kept.txt".to_string(), kept_hash);

        apply_tree(&repo, &store, &tree).expect("apply");

        assert!(!temp.path().join("stale.txt").exists());
        assert_eq!(
            fs::read(temp.path().join("dir/kept.txt")).expect("read"),
            b"kept contents\n"
        );
        let index = Index::load(&repo).expect("reload");
        assert_eq!(index.entries, tree.entries);
        assert!(!index.changed);
    }

    #[test]
    fn apply_tree_retains_ignored_paths() {
        let (temp, repo, store) = setup();
        fs::write(temp.path().join(".hitignore"), b"secret.txt\n").expect("write");
        fs::write(temp.path().join("secret.txt"), b"keep me").expect("write");

        let mut index = Index::load(&repo).expect("load");
        index
            .entries
            .insert("secret.txt".to_string(), hash_bytes(b"keep me"));
        index.save(&repo).expect("save");

        apply_tree(&repo, &store, &Tree::default()).expect("apply");
        assert!(temp.path().join("secret.txt").exists());
    }

    #[test]
    fn clean_check_tracks_index_exactly() {
        let (temp, repo, store) = setup();
        fs::write(temp.path().join("a.txt"), b"one").expect("write");
        crate::index::add_file(&repo, &store, &temp.path().join("a.txt")).expect("add");
        assert!(is_workspace_clean(&repo).expect("clean"));

        fs::write(temp.path().join("a.txt"), b"two").expect("edit");
        assert!(!is_workspace_clean(&repo).expect("dirty"));

        fs::write(temp.path().join("a.txt"), b"one").expect("restore");
        assert!(is_workspace_clean(&repo).expect("clean again"));

        fs::write(temp.path().join("extra.txt"), b"x").expect("untracked");
        assert!(!is_workspace_clean(&repo).expect("untracked dirty"));
    }
}
