//! CLI end-to-end tests
//!
//! Tests for the increasevol command-line interface.

mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the increasevol binary
#[allow(deprecated)]
fn increasevol_cmd() -> Command {
    Command::cargo_bin("increasevol").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = increasevol_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = increasevol_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("increasevol"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = increasevol_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_run_requires_paths() {
    let mut cmd = increasevol_cmd();
    cmd.arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PATHS"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = increasevol_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_validate_defaults() {
    let dir = tempdir().unwrap();
    let mut cmd = increasevol_cmd();
    cmd.current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("Audio: mp3 quality 3"));
}

#[test]
fn test_cli_init_config_then_validate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("increasevol.toml");

    increasevol_cmd()
        .args(["init-config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    increasevol_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));

    increasevol_cmd()
        .arg("init-config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    increasevol_cmd()
        .arg("init-config")
        .arg(&path)
        .arg("--force")
        .assert()
        .success();
}

#[test]
fn test_cli_validate_rejects_bad_volume() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[audio]\nvolume_increase = -1.0\n").unwrap();

    increasevol_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("volume_increase"));
}

#[test]
fn test_cli_run_rejects_bad_quality_override() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.mkv");
    fs::write(&file, b"original").unwrap();

    increasevol_cmd()
        .current_dir(dir.path())
        .args(["run", "--quality", "7"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("audio.quality"));
}

// ---------------------------------------------------------------------------
// Full runs against fake tools
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn write_tools_config(dir: &Path, harness: &common::TestHarness) -> std::path::PathBuf {
    let path = dir.join("increasevol.toml");
    fs::write(
        &path,
        format!(
            "[tools]\nffmpeg_path = {:?}\nffprobe_path = {:?}\n",
            harness.ffmpeg.display().to_string(),
            harness.ffprobe.display().to_string()
        ),
    )
    .unwrap();
    path
}

#[cfg(unix)]
#[test]
fn test_cli_run_converts_directory() {
    use common::{Convert, Probe, TestHarness};

    let harness = TestHarness::new(Probe::Duration("10.0"), Convert::Succeed);
    harness.media("one.mkv");
    harness.media("two.mp4");
    harness.media("notes.txt");
    let config_dir = tempdir().unwrap();
    let config = write_tools_config(config_dir.path(), &harness);

    increasevol_cmd()
        .arg("--config")
        .arg(&config)
        .args(["run", "-j", "2"])
        .arg(harness.dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 succeeded, 0 failed, 0 cancelled"));

    assert_eq!(
        harness.listing(),
        vec![
            "notes.txt",
            "one.mkv",
            "one_Vol-inc.mkv",
            "two.mp4",
            "two_Vol-inc.mp4"
        ]
    );
}

#[cfg(unix)]
#[test]
fn test_cli_run_json_output() {
    use common::{Convert, Probe, TestHarness};

    let harness = TestHarness::new(Probe::Duration("10.0"), Convert::Succeed);
    let file = harness.media("one.mkv");
    let config_dir = tempdir().unwrap();
    let config = write_tools_config(config_dir.path(), &harness);

    let output = increasevol_cmd()
        .arg("--config")
        .arg(&config)
        .args(["run", "--json", "--replace-original"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());

    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(jobs.as_array().map(Vec::len), Some(1));
    assert_eq!(jobs[0]["state"]["state"], "succeeded");
    assert_eq!(fs::read_to_string(&file).unwrap(), "converted");
}

#[cfg(unix)]
#[test]
fn test_cli_run_reports_failures() {
    use common::{Convert, Probe, TestHarness};

    let harness = TestHarness::new(Probe::Fail, Convert::Succeed);
    let file = harness.media("one.mkv");
    let config_dir = tempdir().unwrap();
    let config = write_tools_config(config_dir.path(), &harness);

    increasevol_cmd()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("probe_failed"))
        .stderr(predicate::str::contains("1 of 1 conversions failed"));
}
