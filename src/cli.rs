use clap::{Args, Parser, Subcommand};
use iv_core::config::{AudioEncoder, Config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "increasevol")]
#[command(author, version, about = "Boost the audio volume of video files with ffmpeg")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert files, or every video inside directories
    Run {
        /// Files or directories to process
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,

        /// Print the final job list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the duration ffprobe reports for a file
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        #[arg(value_name = "CONFIG")]
        file: Option<PathBuf>,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Where to write the file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

/// Command-line settings that take precedence over the config file.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Maximum simultaneous conversions (0 for one per CPU)
    #[arg(short = 'j', long)]
    pub max_jobs: Option<usize>,

    /// Volume multiplier applied to every audio stream
    #[arg(long)]
    pub volume: Option<f64>,

    /// Audio encoder: mp3, aac, libvorbis or flac
    #[arg(long)]
    pub encoder: Option<AudioEncoder>,

    /// Quality index from 0 (lowest) to 4 (highest)
    #[arg(short, long)]
    pub quality: Option<usize>,

    /// Write <prefix><name><suffix> next to the original
    #[arg(long, conflicts_with = "replace_original")]
    pub keep_original: bool,

    /// Replace the original file with the converted one
    #[arg(long)]
    pub replace_original: bool,

    /// Drop subtitle streams from the output
    #[arg(long)]
    pub remove_subtitles: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(n) = self.max_jobs {
            config.jobs.max_jobs = Some(n);
        }
        if let Some(v) = self.volume {
            config.audio.volume_increase = v;
        }
        if let Some(e) = self.encoder {
            config.audio.encoder = e;
        }
        if let Some(q) = self.quality {
            config.audio.quality = q;
        }
        if self.keep_original {
            config.output.keep_original = true;
        }
        if self.replace_original {
            config.output.keep_original = false;
        }
        if self.remove_subtitles {
            config.audio.remove_subtitles = true;
        }
    }
}
