//! Unified error type for increasevol.
//!
//! Library crates funnel their failures into [`Error`]. Job-level failures
//! are mapped onto a [`crate::FailureKind`] by the job runner, so the variants
//! here stay close to the operation that failed.

/// Unified error type covering all failure modes in increasevol.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input or configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The executable could not be found or the OS refused to start it.
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        /// Name of the program that could not be started.
        tool: String,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// Reading a child process's output failed.
    #[error("Stream error [{tool}]: {source}")]
    Stream {
        /// Name of the program whose output failed.
        tool: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The duration probe produced no usable answer.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Creating, moving or removing an output file failed.
    #[error("Output error: {0}")]
    Output(String),
}

impl Error {
    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Spawn`].
    pub fn spawn(tool: impl Into<String>, source: std::io::Error) -> Self {
        Error::Spawn {
            tool: tool.into(),
            source,
        }
    }

    /// Convenience constructor for [`Error::Stream`].
    pub fn stream(tool: impl Into<String>, source: std::io::Error) -> Self {
        Error::Stream {
            tool: tool.into(),
            source,
        }
    }

    /// Convenience constructor for [`Error::Output`].
    pub fn output(message: impl Into<String>) -> Self {
        Error::Output(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
