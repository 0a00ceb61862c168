//! Bounded-concurrency FIFO job queue.
//!
//! Submitted jobs wait in a FIFO until fewer than `limit` jobs are running.
//! Whenever a running job reaches a terminal state its slot goes to the head
//! of the pending list. All bookkeeping happens under one mutex, so the queue
//! is correct on both current-thread and multi-thread runtimes.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use iv_core::events::{Event, EventBus, EventPayload};
use iv_core::{JobId, JobState};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use super::job::{Job, JobInfo, JobTask};
use super::{JobContext, QueueError};

/// Counts describing the queue at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub limit: usize,
    pub pending: usize,
    pub running: usize,
    /// Terminal jobs still listed (not dismissed).
    pub finished: usize,
    pub shut_down: bool,
}

struct QueueState {
    limit: usize,
    /// Every listed job, pending, running or terminal.
    jobs: HashMap<JobId, Arc<Mutex<Job>>>,
    /// Submission order of `jobs`.
    order: Vec<JobId>,
    pending: VecDeque<JobId>,
    running: HashMap<JobId, CancellationToken>,
    shut_down: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    fn is_active_path(&self, path: &Path) -> bool {
        self.pending
            .iter()
            .chain(self.running.keys())
            .filter_map(|id| self.jobs.get(id))
            .any(|job| job.lock().path() == path)
    }

    fn forget(&mut self, id: JobId) {
        self.jobs.remove(&id);
        self.order.retain(|other| *other != id);
    }
}

struct Inner {
    ctx: Arc<JobContext>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Runs conversion jobs with at most `limit` in flight.
///
/// Cloning yields another handle to the same queue. Methods that may start a
/// job must be called from within a tokio runtime.
#[derive(Clone)]
pub struct JobsQueue {
    inner: Arc<Inner>,
}

impl JobsQueue {
    /// Create a queue. A `limit` of 0 is treated as 1.
    pub fn new(ctx: JobContext, limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: Arc::new(ctx),
                state: Mutex::new(QueueState {
                    limit: limit.max(1),
                    jobs: HashMap::new(),
                    order: Vec::new(),
                    pending: VecDeque::new(),
                    running: HashMap::new(),
                    shut_down: false,
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.ctx.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.ctx.events
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Queue `path` for conversion, starting it at once if a slot is free.
    pub fn submit(&self, path: impl Into<PathBuf>) -> Result<JobId, QueueError> {
        let path = path.into();
        let mut state = self.inner.state.lock();

        if state.shut_down {
            return Err(QueueError::ShutDown);
        }
        if state.is_active_path(&path) {
            return Err(QueueError::Duplicate(path));
        }

        let job = Job::new(path.clone());
        let id = job.id();
        state.jobs.insert(id, Arc::new(Mutex::new(job)));
        state.order.push(id);
        state.pending.push_back(id);

        tracing::info!(job_id = %id, path = %path.display(), "Job queued");
        self.inner
            .ctx
            .events
            .broadcast(EventPayload::JobQueued { job_id: id, path });

        self.admit(&mut state);
        Ok(id)
    }

    /// Start pending jobs, oldest first, while slots are free.
    fn admit(&self, state: &mut QueueState) {
        if state.shut_down {
            return;
        }
        while state.running.len() < state.limit {
            let Some(id) = state.pending.pop_front() else {
                break;
            };
            self.start(state, id);
        }
    }

    fn start(&self, state: &mut QueueState, id: JobId) {
        let Some(job) = state.jobs.get(&id).cloned() else {
            return;
        };
        let cancel = CancellationToken::new();
        state.running.insert(id, cancel.clone());

        let task = JobTask::new(job, Arc::clone(&self.inner.ctx), cancel);
        let queue = self.clone();
        tokio::spawn(async move {
            task.run().await;
            queue.on_job_terminal(id);
        });
    }

    /// Release `id`'s slot and promote the pending head.
    fn on_job_terminal(&self, id: JobId) {
        let mut state = self.inner.state.lock();
        state.running.remove(&id);
        self.admit(&mut state);

        tracing::debug!(
            job_id = %id,
            running = state.running.len(),
            pending = state.pending.len(),
            "Job slot released"
        );

        if state.is_idle() {
            self.inner.idle.notify_waiters();
        }
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Cancel a job.
    ///
    /// A pending job is removed without ever starting. A running job is
    /// asked to stop; it reaches `Cancelled` once its process has exited.
    pub fn cancel(&self, id: JobId) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();

        if let Some(pos) = state.pending.iter().position(|p| *p == id) {
            state.pending.remove(pos);
            state.forget(id);
            tracing::info!(job_id = %id, "Removed pending job");
            self.inner.ctx.events.broadcast(EventPayload::JobRemoved { job_id: id });
            if state.is_idle() {
                self.inner.idle.notify_waiters();
            }
            return Ok(());
        }

        if let Some(token) = state.running.get(&id) {
            tracing::info!(job_id = %id, "Cancellation requested");
            token.cancel();
            return Ok(());
        }

        match state.jobs.get(&id) {
            Some(job) => Err(QueueError::InvalidState {
                id,
                state: job.lock().state().label(),
            }),
            None => Err(QueueError::NotFound(id)),
        }
    }

    /// Cancel every running job, drop every pending one and refuse further
    /// submissions.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;

        let dropped: Vec<JobId> = state.pending.drain(..).collect();
        for id in &dropped {
            state.forget(*id);
            self.inner
                .ctx
                .events
                .broadcast(EventPayload::JobRemoved { job_id: *id });
        }
        for token in state.running.values() {
            token.cancel();
        }

        tracing::info!(
            cancelled = state.running.len(),
            dropped = dropped.len(),
            "Queue shutting down"
        );
        self.inner.ctx.events.broadcast(EventPayload::QueueShutdown);

        if state.is_idle() {
            self.inner.idle.notify_waiters();
        }
    }

    /// Start a pending job now, even if the limit is reached.
    pub fn force_start(&self, id: JobId) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return Err(QueueError::ShutDown);
        }
        let Some(pos) = state.pending.iter().position(|p| *p == id) else {
            return Err(self.not_pending(&state, id));
        };
        state.pending.remove(pos);
        tracing::info!(job_id = %id, "Force-starting job");
        self.start(&mut state, id);
        Ok(())
    }

    /// Queue a failed or cancelled job's input again as a new job, replacing
    /// the old entry.
    pub fn retry(&self, id: JobId) -> Result<JobId, QueueError> {
        let path = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return Err(QueueError::ShutDown);
            }
            if state.running.contains_key(&id) {
                return Err(QueueError::InvalidState { id, state: "running" });
            }
            let job = state.jobs.get(&id).ok_or(QueueError::NotFound(id))?;
            let path = {
                let job = job.lock();
                match job.state() {
                    JobState::Failed { .. } | JobState::Cancelled => job.path().to_path_buf(),
                    other => {
                        return Err(QueueError::InvalidState {
                            id,
                            state: other.label(),
                        })
                    }
                }
            };
            state.forget(id);
            self.inner
                .ctx
                .events
                .broadcast(EventPayload::JobRemoved { job_id: id });
            path
        };
        self.submit(path)
    }

    /// Remove a terminal job from the listing.
    pub fn dismiss(&self, id: JobId) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        if state.running.contains_key(&id) {
            return Err(QueueError::InvalidState { id, state: "running" });
        }
        let job = state.jobs.get(&id).ok_or(QueueError::NotFound(id))?;
        let label = {
            let job = job.lock();
            if job.state().is_terminal() {
                None
            } else {
                Some(job.state().label())
            }
        };
        if let Some(label) = label {
            return Err(QueueError::InvalidState { id, state: label });
        }
        state.forget(id);
        self.inner
            .ctx
            .events
            .broadcast(EventPayload::JobRemoved { job_id: id });
        Ok(())
    }

    /// Change the concurrency limit, starting jobs if it grew. Lowering it
    /// never stops running jobs.
    pub fn set_limit(&self, limit: usize) -> Result<(), QueueError> {
        if limit == 0 {
            return Err(QueueError::InvalidLimit);
        }
        let mut state = self.inner.state.lock();
        tracing::info!(from = state.limit, to = limit, "Changing concurrency limit");
        state.limit = limit;
        self.admit(&mut state);
        Ok(())
    }

    fn not_pending(&self, state: &QueueState, id: JobId) -> QueueError {
        match state.jobs.get(&id) {
            Some(job) => QueueError::InvalidState {
                id,
                state: job.lock().state().label(),
            },
            None => QueueError::NotFound(id),
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock();
        QueueSnapshot {
            limit: state.limit,
            pending: state.pending.len(),
            running: state.running.len(),
            finished: state
                .jobs
                .len()
                .saturating_sub(state.pending.len() + state.running.len()),
            shut_down: state.shut_down,
        }
    }

    /// All listed jobs in submission order.
    pub fn jobs(&self) -> Vec<JobInfo> {
        let state = self.inner.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .map(|job| job.lock().info())
            .collect()
    }

    pub fn job(&self, id: JobId) -> Option<JobInfo> {
        let state = self.inner.state.lock();
        state.jobs.get(&id).map(|job| job.lock().info())
    }

    /// Wait until nothing is pending or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.state.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for JobsQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobsQueue")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
