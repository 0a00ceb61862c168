//! External tool detection.
//!
//! The [`ToolRegistry`] discovers and caches the locations of ffmpeg and
//! ffprobe and provides lookup methods for the rest of the crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &[FFMPEG, FFPROBE];

/// A resolved external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// If the [`iv_core::config::ToolsConfig`] supplies a custom path **and**
    /// that path exists, it is used directly. Otherwise [`which::which`] is
    /// used to locate the tool in `PATH`. Tools that are not found are
    /// omitted from the registry.
    pub fn discover(tools_config: &iv_core::config::ToolsConfig) -> Self {
        let mut registry = Self::default();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                FFMPEG => tools_config.ffmpeg_path.as_deref(),
                FFPROBE => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "Configured tool path does not exist; searching PATH");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!(tool = name, path = %path.display(), "Discovered tool");
                    registry.insert(name, path);
                }
                None => tracing::debug!(tool = name, "Tool not found"),
            }
        }

        registry
    }

    /// Build a registry from explicit paths, skipping discovery.
    pub fn with_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        let mut registry = Self::default();
        registry.insert(FFMPEG, ffmpeg.into());
        registry.insert(FFPROBE, ffprobe.into());
        registry
    }

    fn insert(&mut self, name: &str, path: PathBuf) {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path,
            },
        );
    }

    /// Return the [`ToolConfig`] for the given tool, or an
    /// [`iv_core::Error::Tool`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> iv_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            iv_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Path to ffmpeg, if discovered.
    pub fn ffmpeg(&self) -> iv_core::Result<&Path> {
        self.require(FFMPEG).map(|t| t.path.as_path())
    }

    /// Path to ffprobe, if discovered.
    pub fn ffprobe(&self) -> iv_core::Result<&Path> {
        self.require(FFPROBE).map(|t| t.path.as_path())
    }

    /// Names of known tools that were not found.
    pub fn missing(&self) -> Vec<&'static str> {
        KNOWN_TOOLS
            .iter()
            .copied()
            .filter(|name| !self.tools.contains_key(*name))
            .collect()
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
