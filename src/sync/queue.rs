//! Bounded synchronization queue and worker pool.
//!
//! Jobs are keyed by project id and deduplicated: while a project has a job
//! queued or executing, further enqueues for it are no-ops. This serializes
//! all git operations per repository without any per-repository lock. The
//! queue itself never blocks the caller; when full, the request is dropped
//! and the caller retries on a later access.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{debug, warn};

use crate::git::GitOps;
use crate::gitlab::{Project, ProjectId};

use super::registry::RepoRegistry;

// =============================================================================
// Job Types
// =============================================================================

/// The git operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Create an empty repository with the remote configured.
    Initialize,
    /// Clone history immediately.
    Clone,
    /// Fetch and fast-forward the default branch.
    Pull,
}

/// One requested git operation against one project.
///
/// Immutable after creation; consumed by exactly one worker. Retries are
/// modeled by creating a fresh job on a later access.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub project_id: ProjectId,
    pub clone_url: String,
    pub default_branch: String,
    pub local_path: PathBuf,
    pub kind: OperationKind,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncJob {
    /// Build a job for `project` targeting `local_path`.
    pub fn new(project: &Project, local_path: PathBuf, kind: OperationKind) -> Self {
        Self {
            project_id: project.id,
            clone_url: project.clone_url.clone(),
            default_branch: project.default_branch.clone(),
            local_path,
            kind,
            enqueued_at: Utc::now(),
        }
    }
}

/// What happened to an enqueue request. Never an error: all three outcomes
/// are normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The job was accepted.
    Scheduled,
    /// The project already has a job queued or executing.
    AlreadyScheduled,
    /// The queue is at capacity; nothing was scheduled.
    QueueFull,
}

// =============================================================================
// SyncQueue
// =============================================================================

/// Bounded job queue with a fixed worker pool.
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
    scheduled: Arc<Mutex<HashSet<ProjectId>>>,
    registry: Arc<RepoRegistry>,
    completed: Arc<Notify>,
}

/// Everything a worker task needs, owned per worker.
struct WorkerContext {
    worker_id: usize,
    rx: Arc<AsyncMutex<mpsc::Receiver<SyncJob>>>,
    scheduled: Arc<Mutex<HashSet<ProjectId>>>,
    registry: Arc<RepoRegistry>,
    git: Arc<dyn GitOps>,
    completed: Arc<Notify>,
}

impl SyncQueue {
    /// Create the queue and spawn `worker_count` drainer tasks.
    pub fn start(
        capacity: usize,
        worker_count: usize,
        registry: Arc<RepoRegistry>,
        git: Arc<dyn GitOps>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        let scheduled = Arc::new(Mutex::new(HashSet::new()));
        let completed = Arc::new(Notify::new());

        for worker_id in 0..worker_count {
            let ctx = WorkerContext {
                worker_id,
                rx: Arc::clone(&rx),
                scheduled: Arc::clone(&scheduled),
                registry: Arc::clone(&registry),
                git: Arc::clone(&git),
                completed: Arc::clone(&completed),
            };
            tokio::spawn(run_worker(ctx));
        }

        Arc::new(Self {
            tx,
            scheduled,
            registry,
            completed,
        })
    }

    /// Request a job, without ever blocking.
    ///
    /// The scheduled-set check and insert happen under one lock, so at most
    /// one job per project id is queued or executing at any instant.
    pub fn enqueue(&self, job: SyncJob) -> EnqueueOutcome {
        let project_id = job.project_id;
        let mut scheduled = self.scheduled.lock().unwrap();

        if scheduled.contains(&project_id) {
            return EnqueueOutcome::AlreadyScheduled;
        }

        match self.tx.try_send(job) {
            Ok(()) => {
                scheduled.insert(project_id);
                if let Some(entry) = self.registry.get(project_id) {
                    entry.mark_pending();
                }
                EnqueueOutcome::Scheduled
            }
            Err(TrySendError::Full(job)) => {
                debug!(
                    project_id = job.project_id,
                    "sync queue full, dropping request"
                );
                EnqueueOutcome::QueueFull
            }
            Err(TrySendError::Closed(job)) => {
                warn!(project_id = job.project_id, "sync queue closed");
                EnqueueOutcome::QueueFull
            }
        }
    }

    /// Number of projects with a job queued or executing.
    pub fn in_flight(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }

    /// Wait until some job finishes. Intended for callers that poll
    /// [`in_flight`](Self::in_flight) in a loop.
    pub async fn completion(&self) {
        self.completed.notified().await;
    }
}

// =============================================================================
// Workers
// =============================================================================

async fn run_worker(ctx: WorkerContext) {
    loop {
        // Only one idle worker holds the receiver lock; it is released
        // before the job runs, so other workers keep draining.
        let job = {
            let mut rx = ctx.rx.lock().await;
            rx.recv().await
        };

        match job {
            Some(job) => {
                run_job(&ctx, job).await;
                ctx.completed.notify_waiters();
            }
            None => break,
        }
    }
    debug!(worker = ctx.worker_id, "sync worker shutting down");
}

async fn run_job(ctx: &WorkerContext, job: SyncJob) {
    let project_id = job.project_id;

    let entry = match ctx.registry.get(project_id) {
        Some(entry) => entry,
        None => {
            warn!(project_id, "dropping job for unregistered project");
            ctx.scheduled.lock().unwrap().remove(&project_id);
            return;
        }
    };

    let waited_ms = (Utc::now() - job.enqueued_at).num_milliseconds();
    debug!(
        worker = ctx.worker_id,
        project_id,
        kind = ?job.kind,
        waited_ms,
        "starting sync job"
    );

    entry.begin_attempt();

    let result = match job.kind {
        OperationKind::Initialize => {
            ctx.git
                .init_repo(&job.local_path, &job.clone_url, &job.default_branch)
                .await
        }
        OperationKind::Clone => {
            ctx.git
                .clone_repo(&job.local_path, &job.clone_url, &job.default_branch)
                .await
        }
        OperationKind::Pull => ctx
            .git
            .pull_repo(&job.local_path, &job.default_branch)
            .await
            .map(|outcome| {
                debug!(project_id, ?outcome, "pull finished");
            }),
    };

    match result {
        Ok(()) => entry.finish_success(),
        Err(e) => {
            warn!(project_id, kind = ?job.kind, error = %e, "sync job failed");
            entry.finish_failure(e.to_string());
        }
    }

    // Release the id only after the terminal state is visible, so a
    // re-enqueue cannot observe a stale in-flight slot.
    ctx.scheduled.lock().unwrap().remove(&project_id);
}

// =============================================================================
// Tests
// =============================================================================
