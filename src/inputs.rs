//! Expanding command-line paths into the list of videos to convert.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use iv_core::config::OutputConfig;
use walkdir::WalkDir;

/// Result of expanding the user's paths.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Inputs {
    /// Files to convert, in the order given, without duplicates.
    pub files: Vec<PathBuf>,
    /// Paths that did not exist.
    pub missing: Vec<PathBuf>,
}

/// Expand files and directories into video files.
///
/// Files named explicitly are taken as-is. Directories are walked
/// recursively and only files with a configured video extension are kept;
/// our own temporary outputs are skipped when `ignore_temp_files` is set.
pub fn collect_inputs(paths: &[PathBuf], output: &OutputConfig) -> Inputs {
    let mut inputs = Inputs::default();
    let mut seen = HashSet::new();

    let mut push = |inputs: &mut Inputs, path: PathBuf| {
        if seen.insert(path.clone()) {
            inputs.files.push(path);
        }
    };

    for path in paths {
        if path.is_file() {
            push(&mut inputs, absolute(path));
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable entry: {e}");
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| output.is_video(p))
                .filter(|p| !(output.ignore_temp_files && output.is_temp_file(p)))
                .collect();
            found.sort();
            tracing::debug!(dir = %path.display(), files = found.len(), "Expanded directory");
            for file in found {
                push(&mut inputs, absolute(&file));
            }
        } else {
            inputs.missing.push(path.clone());
        }
    }

    inputs
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_directories_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("season1")).unwrap();
        fs::write(dir.path().join("a.mkv"), b"").unwrap();
        fs::write(dir.path().join("season1/b.MP4"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("ffmpeg_temp_x1y2.mkv"), b"").unwrap();

        let inputs = collect_inputs(&[dir.path().to_path_buf()], &OutputConfig::default());
        let names: Vec<String> = inputs
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mkv", "b.MP4"]);
        assert!(inputs.missing.is_empty());
    }

    #[test]
    fn temp_files_kept_when_not_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ffmpeg_temp_x1y2.mkv"), b"").unwrap();

        let output = OutputConfig {
            ignore_temp_files: false,
            ..OutputConfig::default()
        };
        let inputs = collect_inputs(&[dir.path().to_path_buf()], &output);
        assert_eq!(inputs.files.len(), 1);
    }

    #[test]
    fn explicit_files_bypass_extension_filter_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.webm");
        fs::write(&file, b"").unwrap();

        let inputs = collect_inputs(&[file.clone(), file.clone()], &OutputConfig::default());
        assert_eq!(inputs.files, vec![file]);
    }

    #[test]
    fn missing_paths_are_reported() {
        let inputs = collect_inputs(
            &[PathBuf::from("/nonexistent/clip.mkv")],
            &OutputConfig::default(),
        );
        assert!(inputs.files.is_empty());
        assert_eq!(inputs.missing, vec![PathBuf::from("/nonexistent/clip.mkv")]);
    }
}
