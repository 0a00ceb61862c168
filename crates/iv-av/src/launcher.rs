//! Child process supervision.
//!
//! A [`ProcessLauncher`] describes one invocation. [`ProcessLauncher::launch`]
//! starts it and returns a [`LaunchHandle`] that yields every output line as a
//! [`LauncherEvent::Line`] and, once the process has exited and both pipes
//! have drained, exactly one [`LauncherEvent::Finished`]. Nothing follows
//! `Finished`.
//!
//! On unix each child leads its own process group. Cancellation sends
//! SIGTERM to that group and escalates to SIGKILL if the child is still
//! alive after [`KILL_GRACE`]. Helpers the child forked are signalled with it.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::lines::{start_reading, LineObserver};

/// How long a cancelled process may take to exit after SIGTERM.
pub const KILL_GRACE: Duration = Duration::from_secs(10);

/// How long the pipes may stay open after the child has exited. A descendant
/// that inherited stdout or stderr would otherwise hold back `Finished`.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// How a launched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit status, or `None` if waiting on the child failed.
    pub status: Option<ExitStatus>,
    /// Whether [`LaunchHandle::cancel`] was requested before the exit.
    pub cancelled: bool,
}

impl ExitOutcome {
    /// Exit code 0 and not cancelled.
    pub fn success(&self) -> bool {
        !self.cancelled && self.status.is_some_and(|s| s.success())
    }

    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// Human-readable summary for logs and failure messages.
    pub fn describe(&self) -> String {
        if self.cancelled {
            return "cancelled".to_string();
        }
        match self.status {
            Some(status) => match status.code() {
                Some(code) => format!("exit status {code}"),
                None => signal_description(&status),
            },
            None => "exit status unavailable".to_string(),
        }
    }
}

#[cfg(unix)]
fn signal_description(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(sig) => format!("terminated by signal {sig}"),
        None => status.to_string(),
    }
}

#[cfg(not(unix))]
fn signal_description(status: &ExitStatus) -> String {
    status.to_string()
}

/// Something observed on a launched process.
#[derive(Debug)]
pub enum LauncherEvent {
    /// One line of output, in production order per stream.
    Line { stream: OutputStream, text: String },
    /// Reading a pipe failed; no further lines arrive from that stream.
    ReadFailed { stream: OutputStream, error: io::Error },
    /// The process exited and both pipes are closed. Always the last event.
    Finished(ExitOutcome),
}

/// Builder for one child process invocation.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    /// Create a new launcher for the given program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<OsString>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<OsString>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Short program name used in logs and errors.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Spawn the process and start reading its stdout and stderr.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`iv_core::Error::Spawn`] if the executable is missing or the
    /// OS refuses to create the process.
    pub fn launch(&self) -> iv_core::Result<LaunchHandle> {
        let name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| iv_core::Error::spawn(&name, e))?;
        tracing::debug!(program = %name, pid = ?child.id(), args = ?self.args, "Launched process");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let stdout = child.stdout.take().map(|out| {
            start_reading(out, ChannelObserver::new(OutputStream::Stdout, tx.clone()))
        });
        let stderr = child.stderr.take().map(|err| {
            start_reading(err, ChannelObserver::new(OutputStream::Stderr, tx.clone()))
        });

        tokio::spawn(supervise(child, name.clone(), cancel.clone(), tx, [stdout, stderr]));

        Ok(LaunchHandle {
            program: name,
            events: rx,
            cancel,
            finished: false,
        })
    }
}

/// Forwards lines from one pipe into the launcher's event channel.
struct ChannelObserver {
    stream: OutputStream,
    tx: mpsc::UnboundedSender<LauncherEvent>,
}

impl ChannelObserver {
    fn new(stream: OutputStream, tx: mpsc::UnboundedSender<LauncherEvent>) -> Self {
        Self { stream, tx }
    }
}

impl LineObserver for ChannelObserver {
    fn on_line(&mut self, text: String) {
        let _ = self.tx.send(LauncherEvent::Line {
            stream: self.stream,
            text,
        });
    }

    fn on_error(&mut self, error: io::Error) {
        let _ = self.tx.send(LauncherEvent::ReadFailed {
            stream: self.stream,
            error,
        });
    }
}

async fn supervise(
    mut child: Child,
    name: String,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<LauncherEvent>,
    readers: [Option<tokio::task::JoinHandle<ChannelObserver>>; 2],
) {
    // Read before waiting: a reaped child no longer reports its id.
    let pid = child.id();

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };

    let (status, cancelled) = match exited {
        Some(status) => (status, false),
        None => {
            tracing::debug!(program = %name, "Cancelling process");
            if let Err(e) = terminate(&mut child, pid) {
                tracing::warn!(program = %name, error = %e, "Failed to signal process");
            }
            let status = match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    tracing::warn!(program = %name, grace = ?KILL_GRACE, "Process ignored SIGTERM; killing");
                    kill_group(pid);
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            (status, true)
        }
    };

    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(program = %name, error = %e, "Failed to wait for process");
            None
        }
    };

    // All lines must be delivered before Finished, unless something other
    // than the child keeps a pipe open past the grace period.
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    for reader in readers.into_iter().flatten() {
        let abort = reader.abort_handle();
        if tokio::time::timeout_at(deadline, reader).await.is_err() {
            tracing::warn!(program = %name, grace = ?DRAIN_GRACE, "Output still open after exit; closing");
            kill_group(pid);
            abort.abort();
        }
    }

    let outcome = ExitOutcome { status, cancelled };
    tracing::debug!(program = %name, outcome = %outcome.describe(), "Process finished");
    let _ = tx.send(LauncherEvent::Finished(outcome));
}

#[cfg(unix)]
fn terminate(_child: &mut Child, pid: Option<u32>) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return Ok(());
    };
    killpg(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: Option<u32>) -> io::Result<()> {
    child.start_kill()
}

/// SIGKILL whatever is left of the child's process group.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        // ESRCH just means the group is already gone.
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Live handle to a launched process.
///
/// Dropping the handle before `Finished` cancels the process.
#[derive(Debug)]
pub struct LaunchHandle {
    program: String,
    events: mpsc::UnboundedReceiver<LauncherEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl LaunchHandle {
    /// Next event, or `None` after `Finished` has been returned.
    pub async fn next_event(&mut self) -> Option<LauncherEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        match event {
            Some(LauncherEvent::Finished(_)) | None => self.finished = true,
            _ => {}
        }
        event
    }

    /// Ask the process to terminate. Does not wait; `Finished` follows once
    /// the process is gone.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether `Finished` has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain all events, collecting output lines per stream.
    pub async fn collect(mut self) -> CollectedOutput {
        let mut out = CollectedOutput::default();
        while let Some(event) = self.next_event().await {
            match event {
                LauncherEvent::Line {
                    stream: OutputStream::Stdout,
                    text,
                } => out.stdout.push(text),
                LauncherEvent::Line {
                    stream: OutputStream::Stderr,
                    text,
                } => out.stderr.push(text),
                LauncherEvent::ReadFailed { error, .. } => {
                    out.read_error.get_or_insert(error);
                }
                LauncherEvent::Finished(outcome) => out.outcome = Some(outcome),
            }
        }
        out
    }
}

impl Drop for LaunchHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}

/// Everything a process printed, plus how it ended.
#[derive(Debug, Default)]
pub struct CollectedOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub read_error: Option<io::Error>,
    /// `None` only if the supervisor task was lost.
    pub outcome: Option<ExitOutcome>,
}
