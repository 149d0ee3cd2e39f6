//! Settings file loading and validation.

use crate::error::ConfigError;
use crate::types::Settings;
use std::path::{Path, PathBuf};

/// File name searched for by [`find_settings_file`].
pub const SETTINGS_FILE_NAME: &str = "bab.toml";

/// Walks up from `start` looking for a [`SETTINGS_FILE_NAME`] file.
pub fn find_settings_file(start: &Path) -> Option<PathBuf> {
    let mut dir = if start.is_dir() {
        Some(start)
    } else {
        start.parent()
    };
    while let Some(d) = dir {
        let candidate = d.join(SETTINGS_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

/// Loads and validates a settings file. Relative paths are anchored at its directory.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut settings = load_settings_from_str(&content)?;
    if let Some(dir) = path.parent() {
        let dir = if dir.as_os_str().is_empty() {
            std::env::current_dir()?
        } else {
            dir.to_path_buf()
        };
        settings.anchor(&dir);
    }
    Ok(settings)
}

/// Parses and validates settings from a string without touching the filesystem.
pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let paths = &settings.paths;
    for (name, list) in [
        ("data_paths", &paths.data_paths),
        ("art_paths", &paths.art_paths),
        ("audio_paths", &paths.audio_paths),
    ] {
        if list.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "empty entry in paths.{name}"
            )));
        }
    }
    for bin in &settings.string_hash_bins {
        if bin.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "string hash bin without a name".to_string(),
            ));
        }
    }
    if !settings.build.configuration.is_empty()
        && !settings.configurations.is_empty()
        && !settings
            .configurations
            .contains_key(&settings.build.configuration)
    {
        return Err(ConfigError::UnknownConfiguration(
            settings.build.configuration.clone(),
        ));
    }
    Ok(())
}
