//! Synchronization engine: repository state registry, bounded job queue,
//! and worker pool.
//!
//! The tree produces work by enqueueing [`SyncJob`]s and consumes results by
//! reading [`RepoEntry`] state; results are pulled, never pushed back into
//! the tree.

mod queue;
mod registry;

pub use queue::{EnqueueOutcome, OperationKind, SyncJob, SyncQueue};
pub use registry::{RepoEntry, RepoRegistry, SyncState};
