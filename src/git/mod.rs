//! Git operation boundary for the sync engine.
//!
//! The queue drives local working copies exclusively through [`GitOps`];
//! every operation is an atomic, fallible black box from the engine's point
//! of view. [`GitRepoClient`] is the in-process implementation.

mod repo_client;

pub use repo_client::GitRepoClient;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Result type for git operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Error surfaced by the underlying git implementation.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Local and remote histories diverged; a pull never force-overwrites.
    #[error("cannot fast-forward {path}: local and remote histories diverged")]
    NonFastForward { path: PathBuf },

    /// Filesystem preparation failed.
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The blocking task running the operation was aborted.
    #[error("git task aborted: {0}")]
    Task(String),
}

/// Result of a pull attempt.
///
/// The skip variants are silent no-op successes: the working copy was not
/// in a state where pulling is safe, and is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The local branch was advanced to the remote head.
    FastForwarded,
    /// Local and remote heads already match.
    AlreadyUpToDate,
    /// The working tree has local modifications.
    SkippedDirty,
    /// The working copy is not checked out on the expected branch.
    SkippedBranch,
}

/// A snapshot of a working copy's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeStatus {
    /// The checked-out branch; for a repository without commits this is the
    /// branch HEAD points at.
    pub branch: Option<String>,
    /// True when there are no modified, staged, or untracked files.
    pub is_clean: bool,
}

/// Git operations the sync engine performs against local working copies.
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Create an empty repository at `path` with the named remote configured
    /// and HEAD pointing at `default_branch`. Does not contact the remote.
    async fn init_repo(&self, path: &Path, clone_url: &str, default_branch: &str) -> Result<()>;

    /// Clone `clone_url` into `path`, checking out `default_branch`.
    async fn clone_repo(&self, path: &Path, clone_url: &str, default_branch: &str) -> Result<()>;

    /// Fetch and fast-forward `default_branch` in the repository at `path`.
    ///
    /// Only acts when the working tree is clean and checked out on
    /// `default_branch`; otherwise reports a skip without touching anything.
    async fn pull_repo(&self, path: &Path, default_branch: &str) -> Result<PullOutcome>;

    /// Report the branch and cleanliness of the working copy at `path`.
    async fn worktree_status(&self, path: &Path) -> Result<WorktreeStatus>;
}
