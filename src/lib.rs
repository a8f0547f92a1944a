//! gitlabfs-rs - exposes a GitLab group/user hierarchy as a filesystem tree
//! of git working copies, synchronized on demand.

pub mod cli;
pub mod config;
pub mod fs;
pub mod git;
pub mod gitlab;
pub mod sync;
pub mod util;

pub use config::{CloneMethod, Config, PullMethod};
pub use fs::{FsError, ResolvedNode, TreeParam, VirtualTree};
pub use git::{GitOps, GitRepoClient, PullOutcome, WorktreeStatus};
pub use gitlab::{
    GitlabClient, GitlabError, Group, GroupContent, Project, RemoteFetcher, User, UserContent,
};
pub use sync::{EnqueueOutcome, OperationKind, RepoEntry, RepoRegistry, SyncJob, SyncQueue, SyncState};
pub use util::FetchCache;
