//! Remote metadata boundary: the hierarchy fetcher trait and its GitLab
//! REST implementation.
//!
//! The tree only ever talks to [`RemoteFetcher`]; the concrete
//! [`GitlabClient`] paginates the REST API and converts wire types into
//! domain types at the boundary.

mod client;
mod types;

pub use client::GitlabClient;
pub use types::{
    Group, GroupContent, GroupId, Project, ProjectId, User, UserContent, UserId,
    DEFAULT_BRANCH_FALLBACK,
};

use async_trait::async_trait;

/// Result type for remote metadata operations.
pub type Result<T> = std::result::Result<T, GitlabError>;

/// Errors from the remote metadata API.
///
/// A value type (`Clone`) so results can flow through the fetch-once cache.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GitlabError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("gitlab request failed: {0}")]
    Request(String),

    /// The API answered with a non-success status.
    #[error("gitlab returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// The response body did not match the expected shape.
    #[error("failed to decode gitlab response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Fetches the remote group/user/project hierarchy.
///
/// All listing calls return complete, order-irrelevant result sets; any
/// pagination happens inside the implementation.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch a single group's metadata.
    async fn fetch_group(&self, gid: GroupId) -> Result<Group>;

    /// Fetch the immediate subgroups and projects of a group.
    async fn fetch_group_content(&self, gid: GroupId) -> Result<GroupContent>;

    /// Fetch a single user's metadata.
    async fn fetch_user(&self, uid: UserId) -> Result<User>;

    /// Fetch the user owning the configured token.
    async fn fetch_current_user(&self) -> Result<User>;

    /// Fetch the personal projects of a user.
    async fn fetch_user_content(&self, uid: UserId) -> Result<UserContent>;
}
