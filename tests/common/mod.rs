//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which writes stand-in `ffmpeg` and `ffprobe`
//! shell scripts into a temporary directory and builds a [`JobsQueue`]
//! that runs them. Each script's behaviour is fixed when the harness is
//! created.

#![cfg(unix)]
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use increasevol::jobs::{JobContext, JobsQueue};
use iv_av::ToolRegistry;
use iv_core::config::Config;
use iv_core::events::{Event, EventPayload};
use iv_core::{JobId, JobState};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// What the fake ffprobe does.
#[derive(Debug, Clone, Copy)]
pub enum Probe {
    /// Print this duration and exit 0.
    Duration(&'static str),
    /// Complain on stderr and exit 1.
    Fail,
    /// Never finish on its own.
    Hang,
}

/// What the fake ffmpeg does.
#[derive(Debug, Clone, Copy)]
pub enum Convert {
    /// Emit two status lines and write the output file.
    Succeed,
    /// Like `Succeed`, after sleeping this many seconds.
    Slow(f64),
    /// Print an error and exit 1 without writing output.
    Fail,
    /// Never finish on its own.
    Hang,
}

pub struct TestHarness {
    /// Holds the fake tools and the media files.
    pub dir: TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl TestHarness {
    pub fn new(probe: Probe, convert: Convert) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();

        let ffprobe = write_script(&bin, "ffprobe", &ffprobe_script(probe));
        let ffmpeg = write_script(&bin, "ffmpeg", &ffmpeg_script(convert));

        Self {
            dir,
            ffmpeg,
            ffprobe,
        }
    }

    /// Create a media file with some placeholder content.
    pub fn media(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, b"original").unwrap();
        path
    }

    pub fn context(&self, config: &Config) -> JobContext {
        let tools = ToolRegistry::with_paths(&self.ffmpeg, &self.ffprobe);
        JobContext::from_config(config, &tools).expect("failed to build job context")
    }

    pub fn queue(&self, limit: usize) -> JobsQueue {
        self.queue_with(&Config::default(), limit)
    }

    pub fn queue_with(&self, config: &Config, limit: usize) -> JobsQueue {
        JobsQueue::new(self.context(config), limit)
    }

    /// Names of files in the media directory, sorted.
    pub fn listing(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n != "bin")
            .collect();
        names.sort();
        names
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn ffprobe_script(probe: Probe) -> String {
    match probe {
        Probe::Duration(d) => format!("echo {d}\n"),
        Probe::Fail => "echo 'Invalid data found when processing input' >&2\nexit 1\n".into(),
        Probe::Hang => "echo started >&2\nexec sleep 30\n".into(),
    }
}

const STATUS_LINES: &str = "\
printf 'frame=   10 fps=0.0 q=-1.0 size=     256kB time=00:00:05.00 bitrate= 419.4kbits/s speed=2.5x\\r' >&2
printf 'frame=   20 fps=0.0 q=-1.0 size=     512kB time=00:00:10.00 bitrate= 419.4kbits/s speed=2.5x\\n' >&2
";

fn ffmpeg_script(convert: Convert) -> String {
    // The output path is the last argument.
    let write_output = "for last; do :; done\nprintf 'converted' > \"$last\"\n";
    match convert {
        Convert::Succeed => format!("{STATUS_LINES}{write_output}"),
        Convert::Slow(secs) => format!("sleep {secs}\n{STATUS_LINES}{write_output}"),
        Convert::Fail => "echo 'Conversion failed!' >&2\nexit 1\n".into(),
        Convert::Hang => "echo started >&2\nexec sleep 30\n".into(),
    }
}

/// Wait until `id` reaches `state`, or panic after a few seconds.
pub async fn wait_for_state(queue: &JobsQueue, id: JobId, want: fn(&JobState) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(info) = queue.job(id) {
            if want(&info.state) {
                return;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} did not reach the expected state: {:?}",
            queue.job(id).map(|i| i.state)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Every event currently buffered in `rx`.
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<EventPayload> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event.payload);
    }
    out
}

/// The sequence of states `id` moved into.
pub fn states_of(events: &[EventPayload], id: JobId) -> Vec<JobState> {
    events
        .iter()
        .filter_map(|e| match e {
            EventPayload::JobStateChanged { job_id, to, .. } if *job_id == id => Some(to.clone()),
            _ => None,
        })
        .collect()
}

/// Run `fut` with a timeout so a hung queue fails the test instead of the run.
pub async fn within<F: std::future::Future>(secs: u64, fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .expect("timed out")
}
