//! Conversion jobs and the bounded-concurrency queue that runs them.

mod job;
mod queue;

pub use job::{Job, JobInfo};
pub use queue::{JobsQueue, QueueSnapshot};

use std::path::PathBuf;
use std::sync::Arc;

use iv_av::{ToolRegistry, VolumeBoost};
use iv_core::config::{Config, OutputConfig};
use iv_core::events::EventBus;
use iv_core::JobId;

/// Errors returned synchronously by [`JobsQueue`] operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is shut down")]
    ShutDown,

    #[error("{} is already queued or running", .0.display())]
    Duplicate(PathBuf),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} is {state}")]
    InvalidState { id: JobId, state: &'static str },

    #[error("concurrency limit must be at least 1")]
    InvalidLimit,
}

/// Everything a job needs to run, shared by all jobs of a queue.
#[derive(Debug)]
pub struct JobContext {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub boost: VolumeBoost,
    pub output: OutputConfig,
    pub events: Arc<EventBus>,
}

impl JobContext {
    /// Resolve tools and conversion settings from configuration.
    pub fn from_config(config: &Config, tools: &ToolRegistry) -> iv_core::Result<Self> {
        Ok(Self {
            ffmpeg: tools.ffmpeg()?.to_path_buf(),
            ffprobe: tools.ffprobe()?.to_path_buf(),
            boost: VolumeBoost::from_config(&config.audio)?,
            output: config.output.clone(),
            events: Arc::new(EventBus::default()),
        })
    }
}
