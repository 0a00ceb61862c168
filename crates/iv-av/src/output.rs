//! Output file lifecycle for a conversion.
//!
//! ffmpeg writes into a [`TempOutput`] created next to the input, so the
//! final move is a same-filesystem rename. The temporary file is deleted when
//! the `TempOutput` is dropped without being finalized, which covers both
//! failed and cancelled conversions.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use iv_core::config::OutputConfig;
use tempfile::TempPath;

/// Where a conversion of one input ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    input: PathBuf,
    destination: PathBuf,
    keep_original: bool,
    temp_prefix: String,
}

impl OutputPlan {
    pub fn new(input: &Path, config: &OutputConfig) -> Self {
        let destination = if config.keep_original {
            sibling_name(input, &config.output_prefix, &config.output_suffix)
        } else {
            input.to_path_buf()
        };

        Self {
            input: input.to_path_buf(),
            destination,
            keep_original: config.keep_original,
            temp_prefix: config.temp_file_prefix.clone(),
        }
    }

    /// Final path of the converted file.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn keeps_original(&self) -> bool {
        self.keep_original
    }

    /// Fail if keeping the original and the destination is already taken.
    pub fn check_destination(&self) -> iv_core::Result<()> {
        if self.keep_original && self.destination.exists() {
            return Err(iv_core::Error::output(format!(
                "output file already exists: {}",
                self.destination.display()
            )));
        }
        Ok(())
    }

    /// Create an empty temporary file in the input's directory, carrying the
    /// input's extension so ffmpeg picks the same container.
    pub fn create_temp(&self) -> iv_core::Result<TempOutput> {
        let dir = match self.input.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let suffix = self
            .input
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let file = tempfile::Builder::new()
            .prefix(&self.temp_prefix)
            .suffix(&suffix)
            .tempfile_in(dir)
            .map_err(|e| {
                iv_core::Error::output(format!(
                    "failed to create temporary file in {}: {e}",
                    dir.display()
                ))
            })?;

        Ok(TempOutput {
            path: file.into_temp_path(),
        })
    }
}

/// `<dir>/<prefix><stem><suffix>.<ext>`
fn sibling_name(input: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix);
    if let Some(stem) = input.file_stem() {
        name.push(stem);
    }
    name.push(suffix);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// Temporary conversion output, removed on drop unless finalized.
#[derive(Debug)]
pub struct TempOutput {
    path: TempPath,
}

impl TempOutput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the converted file to the plan's destination.
    ///
    /// When keeping the original the move refuses to overwrite an existing
    /// file; otherwise the original is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`iv_core::Error::Output`] if the destination appeared in the
    /// meantime or the rename fails. The temporary file is removed in both
    /// cases.
    pub fn finalize(self, plan: &OutputPlan) -> iv_core::Result<PathBuf> {
        let dest = plan.destination();
        let result = if plan.keeps_original() {
            self.path.persist_noclobber(dest)
        } else {
            self.path.persist(dest)
        };

        match result {
            Ok(()) => Ok(dest.to_path_buf()),
            Err(e) => {
                let message = format!("failed to move output to {}: {}", dest.display(), e.error);
                // Dropping the returned TempPath removes the temporary file.
                drop(e.path);
                Err(iv_core::Error::output(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn keep_config() -> OutputConfig {
        OutputConfig::default()
    }

    fn replace_config() -> OutputConfig {
        OutputConfig {
            keep_original: false,
            ..OutputConfig::default()
        }
    }

    #[test]
    fn destination_uses_prefix_and_suffix() {
        let config = OutputConfig {
            output_prefix: "loud_".into(),
            ..OutputConfig::default()
        };
        let plan = OutputPlan::new(Path::new("/films/clip.mkv"), &config);
        assert_eq!(plan.destination(), Path::new("/films/loud_clip_Vol-inc.mkv"));
    }

    #[test]
    fn destination_without_extension() {
        let plan = OutputPlan::new(Path::new("/films/clip"), &keep_config());
        assert_eq!(plan.destination(), Path::new("/films/clip_Vol-inc"));
    }

    #[test]
    fn replacing_targets_the_input() {
        let plan = OutputPlan::new(Path::new("/films/clip.mkv"), &replace_config());
        assert_eq!(plan.destination(), Path::new("/films/clip.mkv"));
        plan.check_destination().unwrap();
    }

    #[test]
    fn existing_destination_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        fs::write(&input, b"original").unwrap();
        fs::write(dir.path().join("clip_Vol-inc.mkv"), b"earlier run").unwrap();

        let plan = OutputPlan::new(&input, &keep_config());
        let err = plan.check_destination().unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn temp_file_is_next_to_input_with_prefix_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        let plan = OutputPlan::new(&input, &keep_config());

        let temp = plan.create_temp().unwrap();
        let name = temp.path().file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(temp.path().parent(), Some(dir.path()));
        assert!(name.starts_with("ffmpeg_temp_"), "{name}");
        assert!(name.ends_with(".mkv"), "{name}");
        assert!(temp.path().exists());
    }

    #[test]
    fn dropped_temp_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let plan = OutputPlan::new(&dir.path().join("clip.mp4"), &keep_config());
        let temp = plan.create_temp().unwrap();
        let path = temp.path().to_path_buf();
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn finalize_keeping_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        fs::write(&input, b"original").unwrap();

        let plan = OutputPlan::new(&input, &keep_config());
        let temp = plan.create_temp().unwrap();
        fs::write(temp.path(), b"louder").unwrap();

        let final_path = temp.finalize(&plan).unwrap();
        assert_eq!(final_path, dir.path().join("clip_Vol-inc.mkv"));
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "louder");
        assert_eq!(fs::read_to_string(&input).unwrap(), "original");
    }

    #[test]
    fn finalize_replacing_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        fs::write(&input, b"original").unwrap();

        let plan = OutputPlan::new(&input, &replace_config());
        let temp = plan.create_temp().unwrap();
        fs::write(temp.path(), b"louder").unwrap();

        let final_path = temp.finalize(&plan).unwrap();
        assert_eq!(final_path, input);
        assert_eq!(fs::read_to_string(&input).unwrap(), "louder");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn finalize_refuses_to_clobber_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        fs::write(&input, b"original").unwrap();

        let plan = OutputPlan::new(&input, &keep_config());
        let temp = plan.create_temp().unwrap();
        let temp_path = temp.path().to_path_buf();
        fs::write(plan.destination(), b"appeared meanwhile").unwrap();

        assert!(temp.finalize(&plan).is_err());
        assert!(!temp_path.exists());
        assert_eq!(
            fs::read_to_string(plan.destination()).unwrap(),
            "appeared meanwhile"
        );
    }
}
