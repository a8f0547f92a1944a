//! git2-backed implementation of the [`GitOps`] boundary.
//!
//! All libgit2 work happens inside `spawn_blocking`; the async surface never
//! blocks a runtime thread on disk or network I/O.

use std::fs;
use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, CredentialType, ErrorCode, FetchOptions, RemoteCallbacks, Repository, StatusOptions};
use tracing::debug;

use async_trait::async_trait;

use super::{GitError, GitOps, PullOutcome, Result, WorktreeStatus};

/// Drives local working copies with libgit2.
pub struct GitRepoClient {
    remote_name: String,
    depth: u32,
}

impl GitRepoClient {
    /// Create a client that configures remotes under `remote_name` and
    /// fetches with `depth` (0 = full history).
    pub fn new(remote_name: impl Into<String>, depth: u32) -> Self {
        Self {
            remote_name: remote_name.into(),
            depth,
        }
    }
}

#[async_trait]
impl GitOps for GitRepoClient {
    async fn init_repo(&self, path: &Path, clone_url: &str, default_branch: &str) -> Result<()> {
        let path = path.to_path_buf();
        let url = clone_url.to_string();
        let branch = default_branch.to_string();
        let remote_name = self.remote_name.clone();
        run_blocking(move || init_blocking(&path, &url, &branch, &remote_name)).await
    }

    async fn clone_repo(&self, path: &Path, clone_url: &str, default_branch: &str) -> Result<()> {
        let path = path.to_path_buf();
        let url = clone_url.to_string();
        let branch = default_branch.to_string();
        let remote_name = self.remote_name.clone();
        let depth = self.depth;
        run_blocking(move || clone_blocking(&path, &url, &branch, &remote_name, depth)).await
    }

    async fn pull_repo(&self, path: &Path, default_branch: &str) -> Result<PullOutcome> {
        let path = path.to_path_buf();
        let branch = default_branch.to_string();
        let remote_name = self.remote_name.clone();
        let depth = self.depth;
        run_blocking(move || pull_blocking(&path, &branch, &remote_name, depth)).await
    }

    async fn worktree_status(&self, path: &Path) -> Result<WorktreeStatus> {
        let path = path.to_path_buf();
        run_blocking(move || status_blocking(&path)).await
    }
}

/// Run a blocking git closure off the async runtime.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GitError::Task(e.to_string()))?
}

/// Credential callbacks trying, in order: ssh-agent, the configured git
/// credential helper, default anonymous credentials.
fn make_callbacks() -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|url, username_from_url, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(user) = username_from_url {
                return Cred::ssh_key_from_agent(user);
            }
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Ok(config) = git2::Config::open_default() {
                if let Ok(cred) = Cred::credential_helper(&config, url, username_from_url) {
                    return Ok(cred);
                }
            }
        }
        Cred::default()
    });
    callbacks
}

fn make_fetch_options(depth: u32) -> FetchOptions<'static> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(make_callbacks());
    if depth > 0 {
        options.depth(depth as i32);
    }
    options
}

/// Create the parent directory of a working copy.
fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| GitError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn init_blocking(path: &Path, url: &str, branch: &str, remote_name: &str) -> Result<()> {
    debug!(path = %path.display(), url, "initializing repository");
    ensure_parent(path)?;

    let mut options = git2::RepositoryInitOptions::new();
    options.initial_head(&format!("refs/heads/{}", branch));
    let repo = Repository::init_opts(path, &options)?;
    repo.remote(remote_name, url)?;
    Ok(())
}

fn clone_blocking(path: &Path, url: &str, branch: &str, remote_name: &str, depth: u32) -> Result<()> {
    debug!(path = %path.display(), url, depth, "cloning repository");
    ensure_parent(path)?;

    let remote_name = remote_name.to_string();
    let mut builder = RepoBuilder::new();
    builder.fetch_options(make_fetch_options(depth));
    builder.branch(branch);
    builder.remote_create(move |repo, _name, url| repo.remote(&remote_name, url));
    builder.clone(url, path)?;
    Ok(())
}

fn pull_blocking(path: &Path, branch: &str, remote_name: &str, depth: u32) -> Result<PullOutcome> {
    let repo = Repository::open(path)?;

    let status = status_of(&repo)?;
    if !status.is_clean {
        debug!(path = %path.display(), "pull skipped: working tree not clean");
        return Ok(PullOutcome::SkippedDirty);
    }
    match status.branch {
        Some(ref current) if current == branch => {}
        _ => {
            debug!(path = %path.display(), branch, "pull skipped: not on default branch");
            return Ok(PullOutcome::SkippedBranch);
        }
    }

    // An unborn HEAD means an init-created repository awaiting its first
    // fetch; the checkout below creates the branch.
    let unborn = matches!(
        repo.head(),
        Err(ref e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound
    );

    let mut remote = repo.find_remote(remote_name)?;
    let mut fetch_options = make_fetch_options(depth);
    remote.fetch(&[branch], Some(&mut fetch_options), None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

    let refname = format!("refs/heads/{}", branch);
    if unborn || analysis.is_unborn() {
        repo.reference(&refname, fetch_commit.id(), true, "pull: initial checkout")?;
        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
        debug!(path = %path.display(), branch, "pull populated empty repository");
        Ok(PullOutcome::FastForwarded)
    } else if analysis.is_up_to_date() {
        Ok(PullOutcome::AlreadyUpToDate)
    } else if analysis.is_fast_forward() {
        let mut reference = repo.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), "pull: fast-forward")?;
        repo.set_head(&refname)?;
        // The worktree was verified clean above, so a forced checkout only
        // moves it to the new head.
        repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
        debug!(path = %path.display(), branch, "pull fast-forwarded");
        Ok(PullOutcome::FastForwarded)
    } else {
        Err(GitError::NonFastForward {
            path: path.to_path_buf(),
        })
    }
}

fn status_blocking(path: &Path) -> Result<WorktreeStatus> {
    let repo = Repository::open(path)?;
    status_of(&repo)
}

fn status_of(repo: &Repository) -> Result<WorktreeStatus> {
    let branch = current_branch(repo);

    let mut options = StatusOptions::new();
    options.include_untracked(true).include_ignored(false);
    let statuses = repo.statuses(Some(&mut options))?;

    Ok(WorktreeStatus {
        branch,
        is_clean: statuses.is_empty(),
    })
}

/// The checked-out branch, falling back to the HEAD symref target for a
/// repository without commits.
fn current_branch(repo: &Repository) -> Option<String> {
    match repo.head() {
        Ok(head) => head.shorthand().map(String::from),
        Err(_) => repo
            .find_reference("HEAD")
            .ok()
            .and_then(|r| r.symbolic_target().map(String::from))
            .map(|target| target.trim_start_matches("refs/heads/").to_string()),
    }
}
