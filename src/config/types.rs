//! Configuration types for gitlabfs-rs.
//!
//! This module defines the structures used to represent application
//! configuration as parsed from an INI-format config file.

use std::fmt;
use std::path::PathBuf;

// =============================================================================
// Primitive Types
// =============================================================================

/// Which clone URL form the remote hands out for every project.
///
/// Selected once at startup; a single run never mixes both forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMethod {
    /// Use the HTTP clone URL.
    Http,
    /// Use the SSH clone URL.
    Ssh,
}

impl fmt::Display for PullMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullMethod::Http => write!(f, "http"),
            PullMethod::Ssh => write!(f, "ssh"),
        }
    }
}

/// What to do with a repository's working copy on first access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMethod {
    /// Create an empty repository with the remote configured; history is
    /// only fetched by a later pull.
    Init,
    /// Clone the full (or depth-limited) history immediately.
    Clone,
}

impl fmt::Display for CloneMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneMethod::Init => write!(f, "init"),
            CloneMethod::Clone => write!(f, "clone"),
        }
    }
}

// =============================================================================
// Config Sections
// =============================================================================

/// `[fs]` section - settings consumed by the filesystem driver.
#[derive(Debug, Clone)]
pub struct FsConfig {
    /// Where the hierarchy is mounted. A command-line positional wins.
    pub mountpoint: Option<PathBuf>,
    /// Mount options handed to the driver, already split on commas.
    pub mount_options: Vec<String>,
}

/// `[gitlab]` section - remote platform endpoint and scope.
#[derive(Debug, Clone)]
pub struct GitlabConfig {
    /// Base URL of the GitLab instance.
    pub url: String,
    /// Private token; anonymous access when empty.
    pub token: Option<String>,
    /// Groups materialized at the root of the tree.
    pub group_ids: Vec<u64>,
    /// Users materialized at the root of the tree.
    pub user_ids: Vec<u64>,
    /// Also materialize the token's own user at the root.
    pub include_current_user: bool,
}

/// `[git]` section - local working copies and the sync engine.
#[derive(Debug, Clone)]
pub struct GitConfig {
    /// Root directory for local working copies.
    pub clone_location: PathBuf,
    /// Name configured for the remote in every working copy.
    pub remote_name: String,
    /// Clone URL form, see [`PullMethod`].
    pub pull_method: PullMethod,
    /// First-access strategy, see [`CloneMethod`].
    pub on_clone: CloneMethod,
    /// Schedule a pull when a ready, clean working copy is accessed.
    pub auto_pull: bool,
    /// History depth for clones and pulls; 0 means full history.
    pub depth: u32,
    /// Maximum number of queued sync jobs.
    pub queue_size: usize,
    /// Number of concurrent sync workers.
    pub worker_count: usize,
}

// =============================================================================
// Top-Level Config
// =============================================================================

/// Complete application configuration as parsed from the config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub fs: FsConfig,
    pub gitlab: GitlabConfig,
    pub git: GitConfig,
}
