mod branch;
mod commit;
mod config;
mod conflict;
mod hash;
mod ignore;
mod index;
mod log;
mod merge;
mod refs;
mod repo;
mod store;
mod tree;
mod util;
mod worktree;

pub use branch::{
    create_branch, create_branch_at, delete_branch, list_branches, switch_branch,
};
pub use commit::{create_commit, Commit};
pub use config::{add_remote, remove_remote, Remote, RemoteConfig};
pub use conflict::{
    has_conflict_markers, ConflictFile, ConflictState, ConflictStatus, MARKER_CURRENT,
    MARKER_SEPARATOR, MARKER_TARGET,
};
pub use hash::{hash_bytes, ObjectHash};
pub use ignore::HitIgnore;
pub use index::{add_all, add_file, rel_path, reset_path, revert_path, Index};
pub use log::{
    find_commit, merge_commits, read_branch_log, read_remote_log, write_branch_log,
    write_remote_log,
};
pub use merge::{merge, merge_file_contents, merge_three_way, MergeOutcome};
pub use refs::{
    branch_exists, read_branch, read_head, read_remote_ref, write_branch, write_head,
    write_remote_ref,
};
pub use repo::{Repo, RepoError, DEFAULT_BRANCH, REPO_DIR_NAME};
pub use store::{list_objects, object_path, Store};
pub use tree::{build_from_stage, head_tree, load_tree, write_tree, Tree};
pub use util::atomic_write;
pub use worktree::{
    apply_tree, diff, is_workspace_clean, restore_file, snapshot, walk_files, Change, ChangeStatus,
};
