pub mod persist;

pub use iv_core::config::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Locations searched, in order, when no `--config` is given.
pub const DEFAULT_PATHS: &[&str] = &[
    "./increasevol.toml",
    "~/.config/increasevol/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config).with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {}", path.display());
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Reject settings that make conversion impossible and log the rest.
pub fn validate_config(config: &Config) -> Result<()> {
    config.check()?;

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    Ok(())
}
