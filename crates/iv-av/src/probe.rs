//! Media duration probing with ffprobe.

use std::path::Path;

use crate::launcher::ProcessLauncher;

/// Build the ffprobe invocation that prints only the container duration.
pub fn duration_probe(ffprobe: &Path, input: &Path) -> ProcessLauncher {
    let mut launcher = ProcessLauncher::new(ffprobe);
    launcher
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input);
    launcher
}

/// Interpret ffprobe's stdout as a duration in seconds.
///
/// Exactly one line holding a finite, positive decimal number is accepted.
pub fn parse_duration<S: AsRef<str>>(stdout: &[S]) -> iv_core::Result<f64> {
    let [line] = stdout else {
        return Err(iv_core::Error::Probe(format!(
            "expected exactly one line of output, got {}",
            stdout.len()
        )));
    };
    let text = line.as_ref().trim();

    let seconds: f64 = text
        .parse()
        .map_err(|_| iv_core::Error::Probe(format!("not a duration: {text:?}")))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(iv_core::Error::Probe(format!("invalid duration: {text}")));
    }
    Ok(seconds)
}

/// Run ffprobe to completion and return the duration of `input`.
pub async fn probe_duration(ffprobe: &Path, input: &Path) -> iv_core::Result<f64> {
    let launcher = duration_probe(ffprobe, input);
    let tool = launcher.program_name();
    let output = launcher.launch()?.collect().await;

    if let Some(e) = output.read_error {
        return Err(iv_core::Error::stream(tool, e));
    }
    let outcome = output
        .outcome
        .ok_or_else(|| iv_core::Error::Probe(format!("{tool} finished without exit status")))?;
    if !outcome.success() {
        let detail = output.stderr.last().map(String::as_str).unwrap_or("");
        return Err(iv_core::Error::Probe(format!(
            "{tool} failed with {}: {detail}",
            outcome.describe()
        )));
    }
    parse_duration(&output.stdout)
}
