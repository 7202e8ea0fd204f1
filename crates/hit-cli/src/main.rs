use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use hit_core::{
    ChangeStatus, Commit, ConflictStatus, Index, MergeOutcome, Repo, RepoError, Store,
};
use time::format_description::well_known::Rfc3339;

#[derive(Parser)]
#[command(name = "hit", version, about = "hit - a content-addressed version control system")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository in the current directory
    Init,
    /// Stage files ("." stages the whole tree)
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Restore files to their last committed state
    Revert {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Record the staged tree as a commit
    Commit {
        #[arg(short, long)]
        message: String,
    },
    /// Show the commit history of the current branch
    Log,
    /// Show staged, unstaged, and conflicted files
    Status,
    /// List branches, or delete one with -d / -D
    Branch {
        #[arg(short = 'd', long = "delete")]
        delete: bool,
        #[arg(short = 'D', long = "force-delete")]
        force_delete: bool,
        name: Option<String>,
    },
    /// Switch branches, or create one with -b
    Checkout {
        #[arg(short = 'b', long = "branch")]
        new_branch: bool,
        name: String,
        commit: Option<String>,
    },
    /// Merge a remote-tracking branch into the current branch
    Merge { args: Vec<String> },
    /// Download refs, logs, and objects from a remote
    Fetch { remote: Option<String> },
    /// Fetch and merge in one step
    Pull { args: Vec<String> },
    /// Upload objects and publish the branch log
    Push {
        #[arg(short = 'u')]
        set_upstream: bool,
        args: Vec<String>,
    },
    /// List, add, or remove remotes
    Remote { args: Vec<String> },
    /// Clone a remote repository into a new directory
    Clone { url: String },
    /// Log in through the browser
    Login,
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    User,
    /// Print the version number
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Init => {
            Repo::init(".")?;
            println!("Initialized empty hit repository in .hit/");
        }
        Commands::Add { paths } => {
            let (repo, store) = open_repo()?;
            for path in paths {
                if is_bulk_target(&path) {
                    hit_core::add_all(&repo, &store, &path)?;
                } else {
                    hit_core::add_file(&repo, &store, &path)?;
                    println!("Added to stage: {}", path.display());
                }
            }
        }
        Commands::Revert { paths } => {
            let (repo, store) = open_repo()?;
            for path in paths {
                if is_bulk_target(&path) {
                    revert_all(&repo, &store, &path)?;
                } else {
                    hit_core::revert_path(&repo, &store, &path)?;
                    println!("Reverted: {}", path.display());
                }
            }
        }
        Commands::Commit { message } => {
            let (repo, store) = open_repo()?;
            let hash = hit_core::create_commit(&repo, &store, &default_author(), &message)?;
            println!("[hit] Commit created: {hash}");
        }
        Commands::Log => {
            let (repo, _store) = open_repo()?;
            let branch = hit_core::read_head(&repo)?;
            let commits = hit_core::read_branch_log(&repo, &branch)?;
            if commits.is_empty() {
                println!("No commits found");
            } else {
                for commit in &commits {
                    print_commit(commit);
                }
            }
        }
        Commands::Status => {
            let (repo, store) = open_repo()?;
            print_status(&repo, &store)?;
        }
        Commands::Branch {
            delete,
            force_delete,
            name,
        } => {
            let (repo, _store) = open_repo()?;
            if delete || force_delete {
                let name = name.ok_or_else(|| {
                    RepoError::InvalidArg("branch name required for deletion".into())
                })?;
                hit_core::delete_branch(&repo, &name, force_delete)?;
                println!("Deleted branch '{name}'");
            } else {
                let current = hit_core::read_head(&repo)?;
                for branch in hit_core::list_branches(&repo)? {
                    if branch == current {
                        println!("* {branch}");
                    } else {
                        println!("  {branch}");
                    }
                }
            }
        }
        Commands::Checkout {
            new_branch,
            name,
            commit,
        } => {
            let (repo, store) = open_repo()?;
            if new_branch {
                if !hit_core::is_workspace_clean(&repo)? {
                    return Err(RepoError::DirtyWorkspace.into());
                }
                match commit {
                    Some(rev) => {
                        let hash = hit_core::ObjectHash::from_hex(&rev).ok_or_else(|| {
                            RepoError::InvalidArg(format!("commit hash '{rev}'"))
                        })?;
                        hit_core::create_branch_at(&repo, &name, &hash)?;
                    }
                    None => hit_core::create_branch(&repo, &name)?,
                }
                println!("Switched to a new branch '{name}'");
            } else {
                hit_core::switch_branch(&repo, &store, &name)?;
                println!("Switched to branch '{name}'");
            }
        }
        Commands::Merge { args } => {
            let (repo, store) = open_repo()?;
            let current = hit_core::read_head(&repo)?;
            let (remote, target) = match args.as_slice() {
                [] => ("origin".to_string(), current.clone()),
                [remote] => (remote.clone(), current.clone()),
                [remote, branch, ..] => (remote.clone(), branch.clone()),
            };
            let outcome =
                hit_core::merge(&repo, &store, &current, &target, &remote, &default_author())?;
            report_merge(outcome, &target)?;
        }
        Commands::Fetch { remote } => {
            let (repo, store) = open_repo()?;
            let remote = remote.unwrap_or_else(|| "origin".to_string());
            hit_remote::fetch(&repo, &store, &remote)?;
            println!("Fetched from remote '{remote}'");
        }
        Commands::Pull { args } => {
            let (repo, store) = open_repo()?;
            let current = hit_core::read_head(&repo)?;
            let (remote, branch) = match args.as_slice() {
                [] => ("origin".to_string(), current),
                [remote] => (remote.clone(), current),
                [remote, branch, ..] => (remote.clone(), branch.clone()),
            };
            let outcome = hit_remote::pull(&repo, &store, &remote, &branch, &default_author())?;
            report_merge(outcome, &branch)?;
        }
        Commands::Push { set_upstream, args } => {
            let (repo, store) = open_repo()?;
            let (remote, branch) = match (set_upstream, args.as_slice()) {
                (true, [remote, branch, ..]) => (remote.clone(), branch.clone()),
                (true, _) => {
                    return Err(RepoError::InvalidArg(
                        "usage: hit push -u <remote> <branch>".into(),
                    )
                    .into())
                }
                (false, []) => ("origin".to_string(), hit_core::read_head(&repo)?),
                (false, [branch, ..]) => ("origin".to_string(), branch.clone()),
            };
            hit_remote::push(&repo, &store, &remote, &branch)?;
            println!("Pushed '{branch}' to remote '{remote}'");
        }
        Commands::Remote { args } => {
            let (repo, _store) = open_repo()?;
            match args.as_slice() {
                [] => {
                    let config = hit_core::RemoteConfig::load(&repo)?;
                    if config.remotes.is_empty() {
                        println!("No remotes configured");
                    }
                    for (name, remote) in &config.remotes {
                        println!("{name}\t{}", remote.url);
                    }
                }
                [cmd, name, url, ..] if cmd == "add" => {
                    hit_core::add_remote(&repo, name, url)?;
                    println!("Remote '{name}' added");
                }
                [cmd, name, ..] if cmd == "remove" => {
                    hit_core::remove_remote(&repo, name)?;
                    println!("Remote '{name}' removed");
                }
                _ => {
                    return Err(RepoError::InvalidArg(
                        "usage: hit remote [add <name> <url> | remove <name>]".into(),
                    )
                    .into())
                }
            }
        }
        Commands::Clone { url } => {
            let dest = hit_remote::clone(&url, &env::current_dir()?)?;
            println!("Cloned into {}", dest.display());
        }
        Commands::Login => match hit_remote::login()? {
            hit_remote::LoginResult::LoggedIn(session) => {
                println!("Logged in as {}", session.email);
            }
            hit_remote::LoginResult::Expired => anyhow::bail!("login session expired"),
            hit_remote::LoginResult::Deleted => anyhow::bail!("login session was deleted"),
            hit_remote::LoginResult::TimedOut => anyhow::bail!("login timed out"),
        },
        Commands::Logout => {
            hit_remote::logout()?;
            println!("Logged out");
        }
        Commands::User => match hit_remote::current_user()? {
            Some(session) => println!("User: {}", session.email),
            None => println!("You are not logged in"),
        },
        Commands::Version => {
            println!("hit version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn open_repo() -> Result<(Repo, Store)> {
    let repo = Repo::discover(env::current_dir()?)?;
    let store = Store::new(repo.clone());
    Ok((repo, store))
}

fn is_bulk_target(path: &Path) -> bool {
    path == Path::new(".") || path.is_dir()
}

/// Revert every tracked file under `dir`.
fn revert_all(repo: &Repo, store: &Store, dir: &Path) -> Result<()> {
    let prefix = hit_core::rel_path(repo, dir)?;
    let index = Index::load(repo)?;
    for rel in index.entries.keys() {
        let in_scope =
            prefix.is_empty() || rel == &prefix || rel.starts_with(&format!("{prefix}/"));
        if in_scope {
            hit_core::revert_path(repo, store, &repo.worktree().join(rel))?;
        }
    }
    Ok(())
}

fn default_author() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn print_commit(commit: &Commit) {
    let date = commit
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| commit.timestamp.to_string());
    println!("commit {}", commit.hash);
    if !commit.other_parent.is_zero() {
        println!("Merge: {} {}", commit.parent, commit.other_parent);
    }
    println!("Author: {}", commit.author);
    println!("Date:   {date}");
    println!();
    println!("    {}", commit.message);
    println!();
}

fn print_status(repo: &Repo, store: &Store) -> Result<()> {
    if let Some(state) = hit_core::ConflictState::load(repo)? {
        println!("In merge state - resolving conflicts:");
        for conflict in &state.conflicts {
            let marker = match conflict.status {
                ConflictStatus::Resolved => "resolved",
                ConflictStatus::Conflict => "conflict",
            };
            println!("  [{marker}] {}", conflict.file_path);
        }
        if state.has_unresolved() {
            println!();
            println!("Edit the conflicted files, remove the markers, then");
            println!("run `hit add <file>` and `hit commit` to finish the merge.");
        } else {
            println!();
            println!("All conflicts resolved. Run `hit commit` to complete the merge.");
        }
        return Ok(());
    }

    let branch = hit_core::read_head(repo)?;
    println!("On branch {branch}");

    let head_tree = hit_core::head_tree(repo, store)?;
    let index = Index::load(repo)?;
    let snapshot = hit_core::snapshot(repo)?;

    let staged = hit_core::diff(&head_tree.entries, &index.entries);
    let unstaged = hit_core::diff(&index.entries, &snapshot);

    if !staged.is_empty() {
        println!();
        println!("Changes to be committed:");
        for change in &staged {
            println!("  {} {}", status_label(change.status), change.path);
        }
    }
    if !unstaged.is_empty() {
        println!();
        println!("Changes not staged for commit:");
        for change in &unstaged {
            println!("  {} {}", status_label(change.status), change.path);
        }
    }
    if staged.is_empty() && unstaged.is_empty() {
        println!();
        println!("nothing to commit, working tree clean");
    }
    Ok(())
}

fn status_label(status: ChangeStatus) -> &'static str {
    match status {
        ChangeStatus::Added => "new file:",
        ChangeStatus::Modified => "modified:",
        ChangeStatus::Deleted => "deleted: ",
    }
}

fn report_merge(outcome: MergeOutcome, target: &str) -> Result<()> {
    match outcome {
        MergeOutcome::AlreadyUpToDate => println!("Already up to date."),
        MergeOutcome::FastForward(tip) => println!("Fast-forwarded to {tip}"),
        MergeOutcome::Merged(hash) => println!("Merged '{target}' ({hash})"),
        MergeOutcome::Conflicts(paths) => {
            for path in &paths {
                eprintln!("CONFLICT (content): merge conflict in {path}");
            }
            eprintln!("Automatic merge failed; fix conflicts and then commit the result.");
            return Err(RepoError::MergeConflicts(paths.len()).into());
        }
    }
    Ok(())
}
