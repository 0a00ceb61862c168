//! # iv-av
//!
//! ffmpeg and ffprobe plumbing for increasevol.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Line reading** ([`lines`]) -- split subprocess output on CR or LF
//!   without a thread per stream.
//! - **Process supervision** ([`ProcessLauncher`], [`LaunchHandle`]) -- spawn
//!   a tool, stream its output lines, cancel it with SIGTERM.
//! - **Progress parsing** ([`progress::parse`]) -- read ffmpeg's status line.
//! - **Command builders** ([`probe`], [`VolumeBoost`]) -- the duration probe
//!   and the volume-boost conversion.
//! - **Output handling** ([`OutputPlan`], [`TempOutput`]) -- temporary output
//!   next to the input and the final rename.

pub mod encode;
pub mod launcher;
pub mod lines;
pub mod output;
pub mod probe;
pub mod progress;
pub mod tools;

// ---- Re-exports for convenience ----

pub use encode::VolumeBoost;
pub use launcher::{ExitOutcome, LaunchHandle, LauncherEvent, OutputStream, ProcessLauncher};
pub use lines::{start_reading, LineObserver, LineStreamReader};
pub use output::{OutputPlan, TempOutput};
pub use progress::EncodeProgress;
pub use tools::{ToolInfo, ToolRegistry};
