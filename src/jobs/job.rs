//! A single conversion job and the task that drives it.
//!
//! The task probes the input's duration with ffprobe, then runs the
//! volume-boost conversion with ffmpeg, folding each status line into the
//! job's [`ProgressSnapshot`]. Only one child process is alive per job at any
//! time.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use iv_av::{progress, ExitOutcome, LaunchHandle, LauncherEvent, OutputPlan, OutputStream};
use iv_core::events::{EventBus, EventPayload};
use iv_core::{FailureKind, FailureReason, JobId, JobState, ProgressSnapshot};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::JobContext;

/// stderr lines kept for failure messages.
const STDERR_TAIL: usize = 5;

/// Mutable state of one job. Shared between the queue and the job task.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    path: PathBuf,
    state: JobState,
    progress: ProgressSnapshot,
    output: Option<PathBuf>,
    queued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of a job for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub path: PathBuf,
    pub state: JobState,
    pub progress: ProgressSnapshot,
    /// Final output path, set once the job succeeded.
    pub output: Option<PathBuf>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobInfo {
    /// Wall-clock run time, once the job has both started and finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

impl Job {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: JobId::new(),
            path: path.into(),
            state: JobState::Pending,
            progress: ProgressSnapshot::default(),
            output: None,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            path: self.path.clone(),
            state: self.state.clone(),
            progress: self.progress.clone(),
            output: self.output.clone(),
            queued_at: self.queued_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    /// Move to `next` and announce it. Illegal transitions, including any
    /// change out of a terminal state, are ignored and return `false`.
    pub fn transition(&mut self, next: JobState, events: &EventBus) -> bool {
        if !self.state.can_transition_to(&next) {
            tracing::warn!(job_id = %self.id, from = %self.state, to = %next, "Ignoring illegal job transition");
            return false;
        }

        let now = Utc::now();
        if self.state == JobState::Pending {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
            self.progress.eta_secs = None;
        }

        let from = std::mem::replace(&mut self.state, next.clone());
        tracing::debug!(job_id = %self.id, from = %from, to = %next, "Job state changed");
        events.broadcast(EventPayload::JobStateChanged {
            job_id: self.id,
            from,
            to: next,
        });
        true
    }

    fn set_duration(&mut self, duration_secs: f64) {
        self.progress.duration_secs = Some(duration_secs);
    }

    fn record_progress(&mut self, sample: &progress::EncodeProgress, events: &EventBus) {
        self.progress
            .record(sample.elapsed_secs, sample.bitrate_kbps, sample.speed);
        events.broadcast(EventPayload::JobProgress {
            job_id: self.id,
            progress: self.progress.clone(),
        });
    }
}

/// How a child process run ended, from the job's point of view.
struct Drained {
    outcome: Option<ExitOutcome>,
    read_error: Option<io::Error>,
}

impl Drained {
    /// The failed state a run of `tool` ends the job in, or `None` if it
    /// exited cleanly. `detail` is the last diagnostic line it printed.
    fn failure(self, kind: FailureKind, tool: &str, detail: Option<String>) -> Option<JobState> {
        if let Some(e) = self.read_error {
            return Some(failed(kind, iv_core::Error::stream(tool, e)));
        }
        match self.outcome {
            Some(outcome) if outcome.success() => None,
            Some(outcome) => Some(failed(
                kind,
                format!(
                    "{tool} failed with {}: {}",
                    outcome.describe(),
                    detail.unwrap_or_default()
                ),
            )),
            None => Some(failed(kind, format!("{tool} finished without exit status"))),
        }
    }
}

/// Drives one [`Job`] from `Pending` to a terminal state.
pub(crate) struct JobTask {
    job: Arc<Mutex<Job>>,
    ctx: Arc<JobContext>,
    cancel: CancellationToken,
    id: JobId,
}

impl JobTask {
    pub(crate) fn new(job: Arc<Mutex<Job>>, ctx: Arc<JobContext>, cancel: CancellationToken) -> Self {
        let id = job.lock().id();
        Self { job, ctx, cancel, id }
    }

    /// Run the job to completion and return its terminal state.
    pub(crate) async fn run(self) -> JobState {
        let input = self.job.lock().path().to_path_buf();
        tracing::info!(job_id = %self.id, path = %input.display(), "Starting job");

        let state = self.execute(&input).await;
        self.set_state(state.clone());

        match &state {
            JobState::Succeeded => tracing::info!(job_id = %self.id, path = %input.display(), "Job succeeded"),
            JobState::Failed { reason } => tracing::warn!(job_id = %self.id, path = %input.display(), reason = %reason, "Job failed"),
            other => tracing::info!(job_id = %self.id, path = %input.display(), state = %other, "Job ended"),
        }
        state
    }

    fn set_state(&self, next: JobState) {
        self.job.lock().transition(next, &self.ctx.events);
    }

    async fn execute(&self, input: &Path) -> JobState {
        let plan = OutputPlan::new(input, &self.ctx.output);
        if let Err(e) = plan.check_destination() {
            return failed(FailureKind::OutputFailed, e);
        }
        if self.cancel.is_cancelled() {
            return JobState::Cancelled;
        }

        // ---- Probe ----
        self.set_state(JobState::Probing);
        let duration = match self.probe(input).await {
            Ok(duration) => duration,
            Err(state) => return state,
        };
        self.job.lock().set_duration(duration);
        tracing::debug!(job_id = %self.id, duration_secs = duration, "Probed duration");

        // ---- Convert ----
        let temp = match plan.create_temp() {
            Ok(temp) => temp,
            Err(e) => return failed(FailureKind::OutputFailed, e),
        };
        self.set_state(JobState::Converting);

        let launcher = self.ctx.boost.command(&self.ctx.ffmpeg, input, temp.path());
        let tool = launcher.program_name();
        let mut handle = match launcher.launch() {
            Ok(handle) => handle,
            Err(e) => return failed(FailureKind::Spawn, e),
        };

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        let drained = self
            .drain(&mut handle, |stream, line| {
                if let Some(sample) = progress::parse(&line) {
                    self.job.lock().record_progress(&sample, &self.ctx.events);
                    return;
                }
                tracing::trace!(job_id = %self.id, stream = stream.as_str(), line = %line, "ffmpeg output");
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            })
            .await;

        if self.cancel.is_cancelled() {
            return JobState::Cancelled;
        }
        if let Some(state) = drained.failure(FailureKind::ConvertFailed, &tool, tail.pop_back()) {
            return state;
        }

        match temp.finalize(&plan) {
            Ok(output) => {
                self.job.lock().output = Some(output);
                JobState::Succeeded
            }
            Err(e) => failed(FailureKind::OutputFailed, e),
        }
    }

    /// Run ffprobe and return the duration, or the terminal state to enter.
    async fn probe(&self, input: &Path) -> Result<f64, JobState> {
        let launcher = iv_av::probe::duration_probe(&self.ctx.ffprobe, input);
        let tool = launcher.program_name();
        let mut handle = launcher
            .launch()
            .map_err(|e| failed(FailureKind::Spawn, e))?;

        let mut stdout = Vec::new();
        let mut last_stderr = None;
        let drained = self
            .drain(&mut handle, |stream, line| match stream {
                OutputStream::Stdout => stdout.push(line),
                OutputStream::Stderr => last_stderr = Some(line),
            })
            .await;

        if self.cancel.is_cancelled() {
            return Err(JobState::Cancelled);
        }
        if let Some(state) = drained.failure(FailureKind::ProbeFailed, &tool, last_stderr) {
            return Err(state);
        }

        iv_av::probe::parse_duration(&stdout).map_err(|e| failed(FailureKind::ProbeFailed, e))
    }

    /// Forward lines to `on_line` until `Finished`, relaying a cancellation
    /// request to the process at most once.
    async fn drain(
        &self,
        handle: &mut LaunchHandle,
        mut on_line: impl FnMut(OutputStream, String),
    ) -> Drained {
        let mut read_error = None;
        let mut cancel_sent = false;

        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    Some(LauncherEvent::Line { stream, text }) => on_line(stream, text),
                    Some(LauncherEvent::ReadFailed { stream, error }) => {
                        tracing::warn!(job_id = %self.id, program = handle.program(), stream = stream.as_str(), error = %error, "Failed reading process output");
                        read_error.get_or_insert(error);
                    }
                    Some(LauncherEvent::Finished(outcome)) => {
                        return Drained { outcome: Some(outcome), read_error };
                    }
                    None => return Drained { outcome: None, read_error },
                },
                _ = self.cancel.cancelled(), if !cancel_sent => {
                    tracing::info!(job_id = %self.id, program = handle.program(), "Cancelling job");
                    handle.cancel();
                    cancel_sent = true;
                }
            }
        }
    }
}

fn failed(kind: FailureKind, message: impl ToString) -> JobState {
    JobState::Failed {
        reason: FailureReason::new(kind, message.to_string()),
    }
}
