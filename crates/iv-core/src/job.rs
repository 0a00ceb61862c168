//! Job state model shared between the queue, the event bus and presentation.
//!
//! A job moves `Pending → Probing → Converting` and ends in exactly one of
//! `Succeeded`, `Failed` or `Cancelled`. Terminal states never change; the
//! transition table lives in [`JobState::can_transition_to`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest speed used as a divisor when estimating remaining time.
pub const MIN_SPEED: f64 = 1e-3;

// ---------------------------------------------------------------------------
// FailureKind / FailureReason
// ---------------------------------------------------------------------------

/// Category of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// ffprobe or ffmpeg could not be started.
    Spawn,
    /// The duration probe exited non-zero or printed something unusable.
    ProbeFailed,
    /// The encoder exited non-zero.
    ConvertFailed,
    /// The temporary or final output file could not be created or moved.
    OutputFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Spawn => "spawn",
            FailureKind::ProbeFailed => "probe_failed",
            FailureKind::ConvertFailed => "convert_failed",
            FailureKind::OutputFailed => "output_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended in [`JobState::Failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Probing,
    Converting,
    Succeeded,
    Failed { reason: FailureReason },
    Cancelled,
}

impl JobState {
    /// True for `Succeeded`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed { .. } | JobState::Cancelled
        )
    }

    /// Short lowercase label for tables and logs.
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Probing => "probing",
            JobState::Converting => "converting",
            JobState::Succeeded => "succeeded",
            JobState::Failed { .. } => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Probing) | (Pending, Cancelled) => true,
            // An existing destination is reported before the duration check starts.
            (Pending, Failed { .. }) => true,
            (Probing, Converting) | (Probing, Failed { .. }) | (Probing, Cancelled) => true,
            (Converting, Succeeded) | (Converting, Failed { .. }) | (Converting, Cancelled) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed { reason } => write!(f, "failed ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressSnapshot
// ---------------------------------------------------------------------------

/// Latest conversion telemetry for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Total media duration, once probed.
    pub duration_secs: Option<f64>,
    /// Encoded media time so far. Never decreases and never exceeds the total.
    pub elapsed_secs: f64,
    pub bitrate_kbps: Option<f64>,
    pub speed: Option<f64>,
    /// Estimated wall-clock seconds remaining, when it can be computed.
    pub eta_secs: Option<f64>,
}

impl ProgressSnapshot {
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs: Some(duration_secs),
            ..Self::default()
        }
    }

    /// Fold one parsed progress sample into the snapshot and recompute ETA.
    ///
    /// `None` bitrate or speed keeps the previously observed value.
    pub fn record(&mut self, elapsed_secs: f64, bitrate_kbps: Option<f64>, speed: Option<f64>) {
        let mut elapsed = self.elapsed_secs.max(elapsed_secs);
        if let Some(total) = self.duration_secs {
            elapsed = elapsed.min(total);
        }
        self.elapsed_secs = elapsed;

        if bitrate_kbps.is_some() {
            self.bitrate_kbps = bitrate_kbps;
        }
        if speed.is_some() {
            self.speed = speed;
        }

        self.eta_secs = match (self.duration_secs, self.speed) {
            (Some(total), Some(speed)) if speed > 0.0 => {
                Some(((total - self.elapsed_secs) / speed.max(MIN_SPEED)).max(0.0))
            }
            _ => None,
        };
    }

    /// Completion percentage in `0.0..=100.0`, when the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self.duration_secs {
            Some(total) if total > 0.0 => Some((self.elapsed_secs / total * 100.0).clamp(0.0, 100.0)),
            _ => None,
        }
    }
}
