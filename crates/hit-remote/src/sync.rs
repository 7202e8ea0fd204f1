use std::path::{Path, PathBuf};

use hit_core::{
    merge, read_branch_log, write_branch_log, write_remote_log, Index, MergeOutcome, ObjectHash,
    Repo, RepoError, Store,
};
use tracing::info;

use crate::api::{ApiClient, BranchPayload, ClonePayload};
use crate::transfer::for_each_parallel;

/// Upload every local object, publish the branch log, and record the
/// resulting remote-tracking ref and log.
pub fn push(repo: &Repo, store: &Store, remote_name: &str, branch: &str) -> anyhow::Result<()> {
    let config = hit_core::RemoteConfig::load(repo)?;
    let remote_url = config.url(remote_name)?.to_string();
    let api = ApiClient::from_session()?;

    let hashes = store.list_objects()?;
    info!(objects = hashes.len(), remote = remote_name, "pushing objects");
    for_each_parallel(hashes, |hash| upload_object(&api, store, &remote_url, &hash))?;

    let (head_exists, server_head) = api.head_commit(&remote_url, branch)?;
    let commits = read_branch_log(repo, branch)?;
    api.create_commits(&remote_url, branch, &commits)?;

    let remote_head = if head_exists && !server_head.is_zero() {
        server_head
    } else {
        commits.last().map(|c| c.hash).unwrap_or(ObjectHash::ZERO)
    };
    hit_core::write_remote_ref(repo, remote_name, branch, &remote_head)?;
    write_remote_log(repo, remote_name, branch, &commits)?;

    info!(branch, remote = remote_name, "push complete");
    Ok(())
}

fn upload_object(
    api: &ApiClient,
    store: &Store,
    remote_url: &str,
    hash: &ObjectHash,
) -> anyhow::Result<()> {
    let signed = api.signed_upload_url(remote_url, hash)?;
    if signed.exists {
        return Ok(());
    }
    let compressed = std::fs::read(store.object_path(hash))?;
    api.put_signed(&signed.signed_url, compressed)?;
    api.confirm_upload(remote_url, hash)
}

/// Mirror the remote's branches into remote-tracking refs and logs, seed
/// missing local branches, and download every object the payload names.
pub fn fetch(repo: &Repo, store: &Store, remote_name: &str) -> anyhow::Result<()> {
    let config = hit_core::RemoteConfig::load(repo)?;
    let remote_url = config.url(remote_name)?.to_string();
    let api = ApiClient::from_session()?;

    let payload = api.clone_payload(&remote_url)?;
    apply_fetched_branches(repo, remote_name, &payload.branches)?;
    download_objects(&api, store, &payload.hashes)?;

    info!(
        branches = payload.branches.len(),
        objects = payload.hashes.len(),
        remote = remote_name,
        "fetch complete"
    );
    Ok(())
}

fn apply_fetched_branches(
    repo: &Repo,
    remote_name: &str,
    branches: &[BranchPayload],
) -> anyhow::Result<()> {
    for branch in branches {
        hit_core::write_remote_ref(repo, remote_name, &branch.name, &branch.head_commit)?;
        write_remote_log(repo, remote_name, &branch.name, &branch.commits)?;

        if !hit_core::branch_exists(repo, &branch.name) {
            hit_core::write_branch(repo, &branch.name, &branch.head_commit)?;
            write_branch_log(repo, &branch.name, &branch.commits)?;
        }
    }
    Ok(())
}

fn download_objects(api: &ApiClient, store: &Store, hashes: &[String]) -> anyhow::Result<()> {
    let mut missing = Vec::new();
    for hex in hashes {
        let hash = ObjectHash::from_hex(hex)
            .ok_or_else(|| RepoError::Corrupt(format!("remote sent hash {hex:?}")))?;
        if !store.exists(&hash) {
            missing.push(hash);
        }
    }
    info!(total = hashes.len(), missing = missing.len(), "downloading objects");
    for_each_parallel(missing, |hash| {
        let compressed = api.download_object(&hash)?;
        store.write_compressed(&hash, &compressed)?;
        // round-trip through the store so corrupt payloads surface here
        store.load(&hash)?;
        Ok(())
    })
}

/// Fetch, then merge the remote-tracking branch into its local counterpart.
pub fn pull(
    repo: &Repo,
    store: &Store,
    remote_name: &str,
    branch: &str,
    author: &str,
) -> anyhow::Result<MergeOutcome> {
    fetch(repo, store, remote_name)?;
    merge(repo, store, branch, branch, remote_name, author)
}

/// Clone `url` into a fresh directory under `parent`, named after the URL's
/// last path segment. Returns the new repository root.
pub fn clone(url: &str, parent: &Path) -> anyhow::Result<PathBuf> {
    let name = clone_dir_name(url)?;
    let dest = parent.join(&name);
    if dest.join(hit_core::REPO_DIR_NAME).exists() {
        return Err(RepoError::AlreadyExists(format!("repository at {}", dest.display())).into());
    }

    let api = ApiClient::from_session()?;
    let payload = api.clone_payload(url)?;

    let repo = Repo::init(&dest)?;
    let store = Store::new(repo.clone());
    populate_clone(&repo, &store, &api, &payload)?;

    info!(url, dest = %dest.display(), "clone complete");
    Ok(dest)
}

fn populate_clone(
    repo: &Repo,
    store: &Store,
    api: &ApiClient,
    payload: &ClonePayload,
) -> anyhow::Result<()> {
    let head_branch = if payload.head_branch.is_empty() {
        hit_core::DEFAULT_BRANCH.to_string()
    } else {
        payload.head_branch.clone()
    };
    hit_core::write_head(repo, &head_branch)?;

    let mut head_commit = ObjectHash::ZERO;
    for branch in &payload.branches {
        if branch.name == head_branch {
            head_commit = branch.head_commit;
        }
        hit_core::write_branch(repo, &branch.name, &branch.head_commit)?;
        write_branch_log(repo, &branch.name, &branch.commits)?;
    }

    // drop the init-seeded default branch when the server does not have it
    if !payload.branches.iter().any(|b| b.name == hit_core::DEFAULT_BRANCH)
        && head_branch != hit_core::DEFAULT_BRANCH
    {
        std::fs::remove_file(repo.branch_ref_path(hit_core::DEFAULT_BRANCH))?;
        std::fs::remove_file(repo.branch_log_path(hit_core::DEFAULT_BRANCH))?;
    }

    let config = payload
        .config
        .clone()
        .unwrap_or_else(|| serde_json::json!({ "remotes": {} }));
    hit_core::atomic_write(
        &repo.config_path(),
        &serde_json::to_vec_pretty(&config)?,
    )?;

    download_objects(api, store, &payload.hashes)?;

    let head_tree = hit_core::load_tree(store, &head_commit)?;
    let index = Index {
        entries: head_tree.entries.clone(),
        changed: false,
    };
    index.save(repo)?;

    let entries: Vec<(String, ObjectHash)> = head_tree
        .entries
        .iter()
        .map(|(path, hash)| (path.clone(), *hash))
        .collect();
    for_each_parallel(entries, |(path, hash)| {
        hit_core::restore_file(repo, store, &path, &hash)
    })?;

    Ok(())
}

/// `https://host/me/repo.hit` clones into `repo/`.
fn clone_dir_name(url: &str) -> anyhow::Result<String> {
    let last = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let name = last.split('.').next().unwrap_or_default();
    if name.is_empty() {
        return Err(RepoError::InvalidArg(format!("clone url '{url}'")).into());
    }
    Ok(name.to_string())
}
