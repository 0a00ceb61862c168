//! The volume-boost ffmpeg invocation.

use std::path::Path;

use iv_core::config::{AudioConfig, AudioEncoder};

use crate::launcher::ProcessLauncher;

/// Parameters of the fixed volume-boost transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBoost {
    pub encoder: AudioEncoder,
    /// `-q:a` value, already looked up in the encoder's quality table.
    pub quality: f64,
    /// Linear gain for the `volume` filter.
    pub volume: f64,
    pub remove_subtitles: bool,
}

impl VolumeBoost {
    /// Resolve the settings from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`iv_core::Error::Validation`] if the quality index is outside
    /// the encoder's table or the gain is not a positive number.
    pub fn from_config(audio: &AudioConfig) -> iv_core::Result<Self> {
        let quality = audio.quality_value().ok_or_else(|| {
            iv_core::Error::Validation(format!(
                "audio quality index {} is out of range for {}",
                audio.quality, audio.encoder
            ))
        })?;
        if !audio.volume_increase.is_finite() || audio.volume_increase <= 0.0 {
            return Err(iv_core::Error::Validation(format!(
                "volume increase must be positive, got {}",
                audio.volume_increase
            )));
        }
        Ok(Self {
            encoder: audio.encoder,
            quality,
            volume: audio.volume_increase,
            remove_subtitles: audio.remove_subtitles,
        })
    }

    /// Build the ffmpeg invocation converting `input` into `output`.
    ///
    /// Video and subtitle streams are copied; every audio stream is
    /// re-encoded through the `volume` filter.
    pub fn command(&self, ffmpeg: &Path, input: &Path, output: &Path) -> ProcessLauncher {
        let mut launcher = ProcessLauncher::new(ffmpeg);
        launcher
            .args(["-hide_banner", "-y", "-i"])
            .arg(input)
            .args(["-map", "0", "-c:v", "copy"]);
        if self.remove_subtitles {
            launcher.arg("-sn");
        }
        launcher
            .args(["-c:s", "copy", "-c:a", self.encoder.ffmpeg_name()])
            .arg("-q:a")
            .arg(self.quality.to_string())
            .arg("-filter:a")
            .arg(format!("volume={}", self.volume))
            .arg(output);
        launcher
    }
}
