//! Writing configuration files with toml_edit so a header comment survives.

use super::Config;
use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::DocumentMut;

const HEADER: &str = "\
# increasevol configuration
#
# [jobs] max_jobs: simultaneous conversions, 0 or absent for one per CPU
# [audio] quality: index 0 (lowest) to 4 (highest) into the encoder's table
";

/// Render `config` as TOML with the explanatory header.
pub fn render_config(config: &Config) -> Result<String> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    let mut doc: DocumentMut = content
        .parse()
        .with_context(|| "Failed to parse serialized config")?;

    let first_table = doc
        .iter_mut()
        .find_map(|(_, item)| item.as_table_mut());
    match first_table {
        Some(table) => {
            table.decor_mut().set_prefix(HEADER);
            Ok(doc.to_string())
        }
        None => Ok(format!("{HEADER}{doc}")),
    }
}

/// Save the entire config to a TOML file.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = render_config(config)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

/// Write the default configuration, refusing to replace an existing file
/// unless `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("Config file already exists: {:?} (use --force to overwrite)", path);
    }
    save_config(path, &Config::default())
}
