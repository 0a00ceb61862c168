//! Human-readable reporting of job results.

use iv_core::JobState;

use crate::jobs::JobInfo;

/// Format seconds as `HH:MM:SS`, or `HH:MM:SS.mmm` with milliseconds.
pub fn format_seconds(secs: f64, show_milliseconds: bool) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let (h, m, s) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);

    if show_milliseconds {
        format!("{h:02}:{m:02}:{s:02}.{ms:03}")
    } else {
        format!("{h:02}:{m:02}:{s:02}")
    }
}

/// Format a wall-clock duration the same way as [`format_seconds`].
pub fn format_elapsed(elapsed: chrono::Duration, show_milliseconds: bool) -> String {
    format_seconds(elapsed.num_milliseconds() as f64 / 1000.0, show_milliseconds)
}

/// Count of jobs per outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub unfinished: usize,
}

pub fn totals(jobs: &[JobInfo]) -> Totals {
    let mut t = Totals::default();
    for job in jobs {
        match job.state {
            JobState::Succeeded => t.succeeded += 1,
            JobState::Failed { .. } => t.failed += 1,
            JobState::Cancelled => t.cancelled += 1,
            _ => t.unfinished += 1,
        }
    }
    t
}

/// One line per job: marker, run time, path and outcome detail.
pub fn render(jobs: &[JobInfo], show_milliseconds: bool) -> String {
    let mut out = String::new();
    for job in jobs {
        let marker = match job.state {
            JobState::Succeeded => "✓",
            JobState::Failed { .. } => "✗",
            JobState::Cancelled => "-",
            _ => "?",
        };
        let elapsed = job
            .elapsed()
            .map(|d| format_elapsed(d, show_milliseconds))
            .unwrap_or_else(|| "--:--:--".to_string());

        out.push_str(&format!("{marker} {elapsed}  {}", job.path.display()));
        match &job.state {
            JobState::Succeeded => {
                if let Some(output) = job.output.as_ref().filter(|o| **o != job.path) {
                    out.push_str(&format!(" -> {}", output.display()));
                }
            }
            JobState::Failed { reason } => out.push_str(&format!(" ({reason})")),
            JobState::Cancelled => out.push_str(" (cancelled)"),
            other => out.push_str(&format!(" ({other})")),
        }
        out.push('\n');
    }

    let t = totals(jobs);
    out.push_str(&format!(
        "\n{} succeeded, {} failed, {} cancelled\n",
        t.succeeded, t.failed, t.cancelled
    ));
    out
}
