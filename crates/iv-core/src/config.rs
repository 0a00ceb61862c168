//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! job, audio, output, tool and display sections. Every section defaults
//! sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Result;
use crate::Error;

/// Number of entries in each encoder's quality table.
pub const QUALITY_LEVELS: usize = 5;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub jobs: JobsConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
    pub tools: ToolsConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Check the settings that make conversion impossible.
    pub fn check(&self) -> Result<()> {
        if !self.audio.volume_increase.is_finite() || self.audio.volume_increase <= 0.0 {
            return Err(Error::Validation(format!(
                "audio.volume_increase must be a positive number, got {}",
                self.audio.volume_increase
            )));
        }
        if self.audio.quality >= QUALITY_LEVELS {
            return Err(Error::Validation(format!(
                "audio.quality must be between 0 and {}, got {}",
                QUALITY_LEVELS - 1,
                self.audio.quality
            )));
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if (self.audio.volume_increase - 1.0).abs() < f64::EPSILON {
            warnings.push("audio.volume_increase is 1.0; audio level will not change".into());
        }

        if self.output.keep_original
            && self.output.output_prefix.is_empty()
            && self.output.output_suffix.is_empty()
        {
            warnings.push(
                "output.keep_original is set but output_prefix and output_suffix are both empty; \
                 every job will fail because the output equals the input"
                    .into(),
            );
        }

        if self.output.temp_file_prefix.is_empty() {
            warnings.push("output.temp_file_prefix is empty; temporary files cannot be recognized".into());
        }

        if self.output.video_extensions.is_empty() {
            warnings.push("output.video_extensions is empty; directories will yield no files".into());
        }

        if self.audio.encoder == AudioEncoder::Flac {
            warnings.push("audio.encoder flac ignores audio.quality".into());
        }

        if let Some(max) = self.jobs.max_jobs {
            let cpus = num_cpus::get();
            if max > cpus {
                warnings.push(format!(
                    "jobs.max_jobs ({max}) exceeds the number of CPUs ({cpus})"
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Concurrency settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum simultaneous conversions. Absent or 0 means one per CPU.
    pub max_jobs: Option<usize>,
}

impl JobsConfig {
    pub fn effective_max_jobs(&self) -> usize {
        match self.max_jobs {
            Some(n) if n > 0 => n,
            _ => num_cpus::get().max(1),
        }
    }
}

/// Audio re-encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub encoder: AudioEncoder,
    /// Index into the encoder's quality table, lowest to highest.
    pub quality: usize,
    /// Linear gain passed to ffmpeg's `volume` filter.
    pub volume_increase: f64,
    pub remove_subtitles: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            encoder: AudioEncoder::default(),
            quality: default_quality(),
            volume_increase: default_volume_increase(),
            remove_subtitles: false,
        }
    }
}

impl AudioConfig {
    /// The `-q:a` value for the configured encoder and quality index.
    pub fn quality_value(&self) -> Option<f64> {
        self.encoder.quality(self.quality)
    }
}

fn default_quality() -> usize {
    3
}

fn default_volume_increase() -> f64 {
    3.0
}

/// Output file naming and temporary file handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write `<prefix><stem><suffix><ext>` next to the input instead of
    /// replacing it.
    pub keep_original: bool,
    pub output_prefix: String,
    pub output_suffix: String,
    pub temp_file_prefix: String,
    /// Skip files whose name starts with `temp_file_prefix` when expanding
    /// directories.
    pub ignore_temp_files: bool,
    pub video_extensions: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            keep_original: true,
            output_prefix: String::new(),
            output_suffix: default_output_suffix(),
            temp_file_prefix: default_temp_file_prefix(),
            ignore_temp_files: true,
            video_extensions: default_video_extensions(),
        }
    }
}

impl OutputConfig {
    /// Whether `path` has one of the configured video extensions
    /// (case-insensitive).
    pub fn is_video(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.video_extensions
            .iter()
            .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Whether `path` looks like one of our own temporary outputs.
    pub fn is_temp_file(&self, path: &Path) -> bool {
        if self.temp_file_prefix.is_empty() {
            return false;
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&self.temp_file_prefix))
    }
}

fn default_output_suffix() -> String {
    "_Vol-inc".into()
}

fn default_temp_file_prefix() -> String {
    "ffmpeg_temp_".into()
}

fn default_video_extensions() -> Vec<String> {
    vec!["mp4".into(), "avi".into(), "mkv".into()]
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Summary formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_milliseconds: bool,
}

// ---------------------------------------------------------------------------
// AudioEncoder
// ---------------------------------------------------------------------------

/// Audio encoders ffmpeg is asked to re-encode with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoder {
    #[default]
    Mp3,
    Aac,
    Libvorbis,
    Flac,
}

impl AudioEncoder {
    pub const ALL: [AudioEncoder; 4] = [
        AudioEncoder::Mp3,
        AudioEncoder::Aac,
        AudioEncoder::Libvorbis,
        AudioEncoder::Flac,
    ];

    /// Name passed to `-c:a`.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            AudioEncoder::Mp3 => "mp3",
            AudioEncoder::Aac => "aac",
            AudioEncoder::Libvorbis => "libvorbis",
            AudioEncoder::Flac => "flac",
        }
    }

    /// `-q:a` values ordered from lowest to highest quality.
    pub fn quality_table(&self) -> [f64; QUALITY_LEVELS] {
        match self {
            // lame VBR: lower is better
            AudioEncoder::Mp3 => [9.9, 8.0, 5.0, 3.0, 0.0],
            AudioEncoder::Aac => [0.1, 0.5, 1.0, 1.5, 2.0],
            AudioEncoder::Libvorbis => [0.0, 2.5, 5.0, 7.5, 10.0],
            AudioEncoder::Flac => [0.0; QUALITY_LEVELS],
        }
    }

    pub fn quality(&self, index: usize) -> Option<f64> {
        self.quality_table().get(index).copied()
    }
}

impl fmt::Display for AudioEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl FromStr for AudioEncoder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AudioEncoder::ALL
            .into_iter()
            .find(|enc| enc.ffmpeg_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown audio encoder '{s}' (expected mp3, aac, libvorbis or flac)"
                ))
            })
    }
}
