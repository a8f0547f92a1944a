//! Repository state registry.
//!
//! The registry is the single source of truth for per-project sync state.
//! It hands out exactly one [`RepoEntry`] per project id for the lifetime of
//! the process; the tree reads entries, queue workers write them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::gitlab::{Project, ProjectId};

/// Lifecycle state of a local working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No working copy yet and no job scheduled.
    Unsynced,
    /// A job is queued but no worker has picked it up.
    Pending,
    /// A worker is executing a job for this project.
    Syncing,
    /// The working copy is usable.
    Ready,
    /// The last job failed; retried on next access.
    Failed,
}

/// Mutable status portion of a [`RepoEntry`].
#[derive(Debug, Clone)]
struct EntryStatus {
    state: SyncState,
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Synchronization record for one project.
///
/// The local path is fixed at creation; only the status mutates, and after
/// scheduling only the worker holding the project's job writes it.
#[derive(Debug)]
pub struct RepoEntry {
    project_id: ProjectId,
    local_path: PathBuf,
    status: Mutex<EntryStatus>,
}

impl RepoEntry {
    fn new(project_id: ProjectId, local_path: PathBuf, state: SyncState) -> Self {
        Self {
            project_id,
            local_path,
            status: Mutex::new(EntryStatus {
                state,
                last_attempt: None,
                last_error: None,
            }),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn state(&self) -> SyncState {
        self.status.lock().unwrap().state
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.status.lock().unwrap().last_attempt
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.lock().unwrap().last_error.clone()
    }

    /// Mark the entry as queued. Only entries without a usable working copy
    /// surface the transition; a Ready entry keeps its state until a worker
    /// actually starts pulling.
    pub(crate) fn mark_pending(&self) {
        let mut status = self.status.lock().unwrap();
        if matches!(status.state, SyncState::Unsynced | SyncState::Failed) {
            status.state = SyncState::Pending;
        }
    }

    /// Mark the start of a job attempt.
    pub(crate) fn begin_attempt(&self) {
        let mut status = self.status.lock().unwrap();
        status.state = SyncState::Syncing;
        status.last_attempt = Some(Utc::now());
    }

    /// Record a successful job.
    pub(crate) fn finish_success(&self) {
        let mut status = self.status.lock().unwrap();
        status.state = SyncState::Ready;
        status.last_error = None;
    }

    /// Record a failed job.
    pub(crate) fn finish_failure(&self, error: String) {
        let mut status = self.status.lock().unwrap();
        status.state = SyncState::Failed;
        status.last_error = Some(error);
    }
}

/// Owns the [`RepoEntry`] for every project observed so far.
pub struct RepoRegistry {
    clone_root: PathBuf,
    entries: Mutex<HashMap<ProjectId, Arc<RepoEntry>>>,
}

impl RepoRegistry {
    /// Create a registry rooted at the configured clone location.
    pub fn new(clone_root: PathBuf) -> Self {
        Self {
            clone_root,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic local path for a project. The id keeps paths
    /// collision-free, the name keeps them readable.
    pub fn local_path_for(&self, project: &Project) -> PathBuf {
        self.clone_root.join(format!("{}-{}", project.id, project.name))
    }

    /// Get the entry for a project, creating it on first observation.
    ///
    /// A freshly created entry probes the local path: a working copy left
    /// behind by an earlier run counts as Ready.
    pub fn entry(&self, project: &Project) -> Arc<RepoEntry> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(&project.id) {
            return Arc::clone(entry);
        }

        let local_path = self.local_path_for(project);
        let state = if local_path.join(".git").exists() {
            SyncState::Ready
        } else {
            SyncState::Unsynced
        };
        let entry = Arc::new(RepoEntry::new(project.id, local_path, state));
        entries.insert(project.id, Arc::clone(&entry));
        entry
    }

    /// Look up an existing entry.
    pub fn get(&self, id: ProjectId) -> Option<Arc<RepoEntry>> {
        self.entries.lock().unwrap().get(&id).map(Arc::clone)
    }

    /// Number of projects observed so far.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether any project has been observed.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
