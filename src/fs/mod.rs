//! Virtual hierarchy tree.
//!
//! Presents the remote group/user/project structure as a directory tree and
//! triggers synchronization as a side effect of access. This module owns the
//! interface consumed by the filesystem driver: [`VirtualTree::list_children`]
//! and [`VirtualTree::resolve`].

mod tree;

pub use tree::{ResolvedNode, TreeParam, VirtualTree};

use crate::gitlab::GitlabError;

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors surfaced to the filesystem driver.
///
/// A failure is always scoped to the node being accessed; sibling nodes and
/// cached data stay usable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FsError {
    /// The path names no entry in the tree.
    #[error("no such entry: {0}")]
    NotFound(String),

    /// A non-directory appeared in the middle of the path.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The remote metadata for this node could not be fetched.
    #[error("metadata fetch failed: {0}")]
    Metadata(#[from] GitlabError),
}
