use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use similar::{ChangeTag, DiffOp, TextDiff};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::commit::Commit;
use crate::conflict::{ConflictState, MARKER_CURRENT, MARKER_SEPARATOR, MARKER_TARGET};
use crate::hash::ObjectHash;
use crate::index::Index;
use crate::log;
use crate::refs;
use crate::repo::{Repo, RepoError};
use crate::store::Store;
use crate::tree::{self, Tree};
use crate::worktree;

#[derive(Debug)]
pub enum MergeOutcome {
    AlreadyUpToDate,
    FastForward(ObjectHash),
    Merged(ObjectHash),
    Conflicts(Vec<String>),
}

/// Merge the remote-tracking branch `<remote>/<target_branch>` into the
/// local `current_branch`.
///
/// Resolution order: already-up-to-date, already-merged-on-remote,
/// fast-forward, then a full three-way tree merge against the lowest common
/// ancestor. A conflicting merge persists durable conflict state and leaves
/// marker files in the working tree; completing it is the commit engine's
/// job.
pub fn merge(
    repo: &Repo,
    store: &Store,
    current_branch: &str,
    target_branch: &str,
    remote: &str,
    author: &str,
) -> anyhow::Result<MergeOutcome> {
    let current = refs::read_branch(repo, current_branch)?;
    let target = refs::read_remote_ref(repo, remote, target_branch)?;

    if target == current {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    let remote_log = log::read_remote_log(repo, remote, target_branch)?;
    let local_log = log::read_branch_log(repo, current_branch)?;

    if remote_merged_current(&remote_log, &current) {
        fast_forward(repo, store, current_branch, &target, local_log, &remote_log)?;
        return Ok(MergeOutcome::FastForward(target));
    }

    let lca = common_ancestor(&local_log, &current, &remote_log, &target)
        .ok_or(RepoError::NoCommonAncestor)?;

    if current == lca {
        fast_forward(repo, store, current_branch, &target, local_log, &remote_log)?;
        return Ok(MergeOutcome::FastForward(target));
    }

    let current_tree = tree::load_tree(store, &current)?;
    let target_tree = tree::load_tree(store, &target)?;
    let ancestor_tree = tree::load_tree(store, &lca)?;

    let message = default_merge_message(current_branch, target_branch, &current, &target);
    let mut merged_entries: BTreeMap<String, ObjectHash> = BTreeMap::new();
    let mut conflicts: Vec<(String, ObjectHash, ObjectHash, ObjectHash, String)> = Vec::new();

    let mut paths: HashSet<&String> = HashSet::new();
    paths.extend(current_tree.entries.keys());
    paths.extend(target_tree.entries.keys());
    paths.extend(ancestor_tree.entries.keys());

    for path in paths {
        let cur = current_tree.entries.get(path);
        let tgt = target_tree.entries.get(path);
        let anc = ancestor_tree.entries.get(path);

        if cur == tgt {
            if let Some(hash) = cur {
                merged_entries.insert(path.clone(), *hash);
            }
            continue;
        }
        match (cur, tgt) {
            (Some(hash), None) => {
                merged_entries.insert(path.clone(), *hash);
            }
            (None, Some(hash)) => {
                merged_entries.insert(path.clone(), *hash);
            }
            (Some(cur_hash), Some(tgt_hash)) => {
                // ancestor identity short-circuits: only one side moved
                if anc == Some(cur_hash) {
                    merged_entries.insert(path.clone(), *tgt_hash);
                    continue;
                }
                if anc == Some(tgt_hash) {
                    merged_entries.insert(path.clone(), *cur_hash);
                    continue;
                }

                let cur_text = String::from_utf8_lossy(&store.load(cur_hash)?).into_owned();
                let tgt_text = String::from_utf8_lossy(&store.load(tgt_hash)?).into_owned();
                let (content, conflicted) = match anc {
                    Some(anc_hash) => {
                        let anc_text =
                            String::from_utf8_lossy(&store.load(anc_hash)?).into_owned();
                        merge_three_way(&anc_text, &cur_text, &tgt_text)
                    }
                    None => merge_file_contents(&cur_text, &tgt_text),
                };
                // the merged blob is persisted either way; conflicted content
                // must never reach the index
                let blob = store.write(content.as_bytes())?;
                if conflicted {
                    conflicts.push((
                        path.clone(),
                        *cur_hash,
                        *tgt_hash,
                        anc.copied().unwrap_or(ObjectHash::ZERO),
                        content,
                    ));
                } else {
                    merged_entries.insert(path.clone(), blob);
                }
            }
            (None, None) => {}
        }
    }

    if !conflicts.is_empty() {
        let mut state = ConflictState::new_merge(current, target, message);
        for (path, cur_hash, tgt_hash, anc_hash, content) in &conflicts {
            state.add_conflict(path.clone(), *cur_hash, *tgt_hash, *anc_hash, content.clone());
        }
        state.attach_remote_commits(remote_suffix(&remote_log, &lca));
        state.save(repo)?;

        let mut index = Index::load(repo)?;
        for (path, hash) in &merged_entries {
            index.entries.insert(path.clone(), *hash);
        }
        index.changed = true;
        index.save(repo)?;

        for (path, hash) in &merged_entries {
            worktree::restore_file(repo, store, path, hash)?;
        }
        for (path, _, _, _, content) in &conflicts {
            let full = repo.worktree().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full, content)?;
        }

        let paths: Vec<String> = conflicts.into_iter().map(|(path, ..)| path).collect();
        info!(count = paths.len(), "merge stopped on conflicts");
        return Ok(MergeOutcome::Conflicts(paths));
    }

    let merged_tree = Tree {
        entries: merged_entries,
        parent: current,
    };
    let tree_hash = tree::write_tree(store, &merged_tree)?;

    let commit = Commit {
        hash: tree_hash,
        parent: current,
        other_parent: target,
        message,
        author: author.to_string(),
        timestamp: OffsetDateTime::now_utc(),
    };

    let merged_log = log::merge_commits(
        local_log,
        std::iter::once(commit).chain(remote_log.iter().cloned()),
    );
    log::write_branch_log(repo, current_branch, &merged_log)?;
    refs::write_branch(repo, current_branch, &tree_hash)?;
    worktree::apply_tree(repo, store, &merged_tree)?;

    info!(commit = %tree_hash, "three-way merge completed");
    Ok(MergeOutcome::Merged(tree_hash))
}

/// Three-way, line-level merge against a common ancestor.
///
/// Each side's edits are taken as hunks over the ancestor; regions touched
/// by only one side apply cleanly, regions where both sides agree apply
/// cleanly, and diverging regions become a conflict-marker block inside the
/// reassembled text.
pub fn merge_three_way(ancestor: &str, current: &str, target: &str) -> (String, bool) {
    let anc_lines = split_lines(ancestor);
    let cur_hunks = side_hunks(&anc_lines, &split_lines(current));
    let tgt_hunks = side_hunks(&anc_lines, &split_lines(target));

    let mut out = String::new();
    let mut conflicted = false;
    let mut pos = 0usize;
    let mut ci = 0usize;
    let mut ti = 0usize;

    loop {
        let next = match (
            cur_hunks.get(ci).map(|h| h.anc_start),
            tgt_hunks.get(ti).map(|h| h.anc_start),
        ) {
            (None, None) => break,
            (a, b) => a.into_iter().chain(b).min().unwrap(),
        };

        for line in &anc_lines[pos..next] {
            out.push_str(line);
        }

        // grow the changed region until no hunk from either side touches it
        let lo = next;
        let mut hi = next;
        let mut cur_used: Vec<&Hunk> = Vec::new();
        let mut tgt_used: Vec<&Hunk> = Vec::new();
        loop {
            let mut grew = false;
            while let Some(hunk) = cur_hunks.get(ci) {
                if hunk.anc_start <= hi {
                    hi = hi.max(hunk.anc_end);
                    cur_used.push(hunk);
                    ci += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            while let Some(hunk) = tgt_hunks.get(ti) {
                if hunk.anc_start <= hi {
                    hi = hi.max(hunk.anc_end);
                    tgt_used.push(hunk);
                    ti += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            if !grew {
                break;
            }
        }

        let cur_text = apply_hunks(&anc_lines, lo, hi, &cur_used);
        let tgt_text = apply_hunks(&anc_lines, lo, hi, &tgt_used);
        if tgt_used.is_empty() || cur_text == tgt_text {
            out.push_str(&cur_text);
        } else if cur_used.is_empty() {
            out.push_str(&tgt_text);
        } else {
            conflicted = true;
            let mut current_side = cur_text;
            let mut target_side = tgt_text;
            flush_conflict_block(&mut out, &mut current_side, &mut target_side);
        }
        pos = hi;
    }

    for line in &anc_lines[pos..] {
        out.push_str(line);
    }
    (out, conflicted)
}

#[derive(Clone, Debug)]
struct Hunk {
    anc_start: usize,
    anc_end: usize,
    lines: Vec<String>,
}

fn side_hunks(ancestor: &[&str], side: &[&str]) -> Vec<Hunk> {
    let diff = TextDiff::from_slices(ancestor, side);
    let mut out = Vec::new();
    for op in diff.ops() {
        match *op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => out.push(Hunk {
                anc_start: old_index,
                anc_end: old_index + old_len,
                lines: Vec::new(),
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => out.push(Hunk {
                anc_start: old_index,
                anc_end: old_index,
                lines: side[new_index..new_index + new_len]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => out.push(Hunk {
                anc_start: old_index,
                anc_end: old_index + old_len,
                lines: side[new_index..new_index + new_len]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
    out
}

/// Render one side's view of the ancestor region `[lo, hi)`: replacement
/// hunks interleaved with the untouched ancestor lines between them.
fn apply_hunks(ancestor: &[&str], lo: usize, hi: usize, hunks: &[&Hunk]) -> String {
    let mut out = String::new();
    let mut pos = lo;
    for hunk in hunks {
        for line in &ancestor[pos..hunk.anc_start] {
            out.push_str(line);
        }
        for line in &hunk.lines {
            out.push_str(line);
        }
        pos = hunk.anc_end;
    }
    for line in &ancestor[pos..hi] {
        out.push_str(line);
    }
    out
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Two-way, line-level merge for contents with no usable ancestor.
///
/// When the diff is one-sided (only insertions or only deletions) the edit
/// applies cleanly: equal regions are copied, inserts included, deletes
/// dropped. Mixed edits reassemble the full text with a conflict-marker
/// block at every insert/delete boundary.
pub fn merge_file_contents(current: &str, target: &str) -> (String, bool) {
    let diff = TextDiff::from_lines(current, target);
    let changes: Vec<(ChangeTag, String)> = diff
        .iter_all_changes()
        .map(|change| (change.tag(), change.value().to_string()))
        .collect();

    let has_insert = changes.iter().any(|(tag, _)| *tag == ChangeTag::Insert);
    let has_delete = changes.iter().any(|(tag, _)| *tag == ChangeTag::Delete);

    if !has_insert && !has_delete {
        return (current.to_string(), false);
    }

    if !(has_insert && has_delete) {
        let mut out = String::new();
        for (tag, value) in &changes {
            match tag {
                ChangeTag::Equal | ChangeTag::Insert => out.push_str(value),
                ChangeTag::Delete => {}
            }
        }
        return (out, false);
    }

    let mut out = String::new();
    let mut current_side = String::new();
    let mut target_side = String::new();
    for (tag, value) in &changes {
        match tag {
            ChangeTag::Delete => current_side.push_str(value),
            ChangeTag::Insert => target_side.push_str(value),
            ChangeTag::Equal => {
                flush_conflict_block(&mut out, &mut current_side, &mut target_side);
                out.push_str(value);
            }
        }
    }
    flush_conflict_block(&mut out, &mut current_side, &mut target_side);
    (out, true)
}

fn flush_conflict_block(out: &mut String, current_side: &mut String, target_side: &mut String) {
    if current_side.is_empty() && target_side.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(MARKER_CURRENT);
    out.push('\n');
    out.push_str(current_side);
    if !current_side.is_empty() && !current_side.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(MARKER_SEPARATOR);
    out.push('\n');
    out.push_str(target_side);
    if !target_side.is_empty() && !target_side.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(MARKER_TARGET);
    out.push('\n');
    current_side.clear();
    target_side.clear();
}

/// The remote already recorded a merge of `current`: its log holds `current`
/// itself plus a later merge commit naming `current` as the other parent.
fn remote_merged_current(remote_log: &[Commit], current: &ObjectHash) -> bool {
    let mut seen_current = false;
    for commit in remote_log {
        if commit.hash == *current {
            seen_current = true;
        }
        if seen_current && commit.other_parent == *current {
            return true;
        }
    }
    false
}

fn fast_forward(
    repo: &Repo,
    store: &Store,
    branch: &str,
    target: &ObjectHash,
    local_log: Vec<Commit>,
    remote_log: &[Commit],
) -> anyhow::Result<()> {
    let merged_log = log::merge_commits(local_log, remote_log.iter().cloned());
    log::write_branch_log(repo, branch, &merged_log)?;
    refs::write_branch(repo, branch, target)?;
    let target_tree = tree::load_tree(store, target)?;
    worktree::apply_tree(repo, store, &target_tree)?;
    info!(branch, target = %target, "fast-forwarded");
    Ok(())
}

/// First hash reachable from `current` that also appears in `target`'s
/// ancestry. Walks parent and other-parent edges breadth-first over the
/// hash-keyed logs; the zero hash bounds the traversal.
fn common_ancestor(
    local_log: &[Commit],
    current: &ObjectHash,
    remote_log: &[Commit],
    target: &ObjectHash,
) -> Option<ObjectHash> {
    let current_ancestors = ancestors(local_log, current);
    let target_ancestors: HashSet<ObjectHash> = ancestors(remote_log, target).into_iter().collect();
    current_ancestors
        .into_iter()
        .find(|hash| target_ancestors.contains(hash))
}

fn ancestors(log: &[Commit], start: &ObjectHash) -> Vec<ObjectHash> {
    let by_hash: HashMap<ObjectHash, &Commit> =
        log.iter().map(|commit| (commit.hash, commit)).collect();

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([*start]);
    let mut order = Vec::new();
    while let Some(hash) = queue.pop_front() {
        if hash.is_zero() || !visited.insert(hash) {
            continue;
        }
        order.push(hash);
        if let Some(commit) = by_hash.get(&hash) {
            queue.push_back(commit.parent);
            queue.push_back(commit.other_parent);
        }
    }
    debug!(start = %start, count = order.len(), "collected ancestors");
    order
}

/// Suffix of the remote log starting at the first commit built directly on
/// the common ancestor; carried into the conflict state so the completing
/// commit can fold the remote history into the local log.
fn remote_suffix(remote_log: &[Commit], lca: &ObjectHash) -> Vec<Commit> {
    match remote_log.iter().position(|commit| commit.parent == *lca) {
        Some(idx) => remote_log[idx..].to_vec(),
        None => Vec::new(),
    }
}

fn default_merge_message(
    current_branch: &str,
    target_branch: &str,
    current: &ObjectHash,
    target: &ObjectHash,
) -> String {
    if current_branch == target_branch {
        format!("Merging commit {target} into {current}")
    } else {
        format!("Merge branch '{target_branch}' into {current_branch}")
    }
}
