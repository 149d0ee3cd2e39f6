//! Configuration overlays and path anchoring.

use crate::error::ConfigError;
use crate::types::Settings;
use std::path::{Path, PathBuf};

/// Returns a copy of `settings` with the named configuration's overlay applied.
///
/// The configuration name becomes [`BuildSettings::configuration`](crate::BuildSettings),
/// which keys the session cache.
pub fn resolve_configuration(settings: &Settings, name: &str) -> Result<Settings, ConfigError> {
    let overlay = settings
        .configurations
        .get(name)
        .ok_or_else(|| ConfigError::UnknownConfiguration(name.to_string()))?;

    let mut resolved = settings.clone();
    resolved.build.configuration = name.to_string();
    if let Some(postfix) = &overlay.stream_postfix {
        resolved.output.stream_postfix = postfix.clone();
    }
    if let Some(postfix) = &overlay.custom_postfix {
        resolved.output.custom_postfix = postfix.clone();
    }
    if let Some(platform) = overlay.target_platform {
        resolved.build.target_platform = platform;
    }
    if let Some(level) = overlay.error_level {
        resolved.build.error_level = level;
    }
    if let Some(linked) = overlay.linked_streams {
        resolved.build.linked_streams = linked;
    }
    Ok(resolved)
}

fn anchor_path(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn anchor_search_list(base: &Path, list: &mut [String]) {
    for entry in list.iter_mut() {
        if entry != "*" && Path::new(entry.as_str()).is_relative() {
            *entry = base.join(entry.as_str()).to_string_lossy().into_owned();
        }
    }
}

impl Settings {
    /// Makes every relative path absolute against `base`. `*` search entries are kept.
    pub fn anchor(&mut self, base: &Path) {
        let paths = &mut self.paths;
        anchor_path(base, &mut paths.output_directory);
        for path in [
            &mut paths.data_root,
            &mut paths.schema_path,
            &mut paths.intermediate_output_directory,
            &mut paths.session_cache_directory,
            &mut paths.build_cache_directory,
        ]
        .into_iter()
        .flatten()
        {
            anchor_path(base, path);
        }
        anchor_search_list(base, &mut paths.data_paths);
        anchor_search_list(base, &mut paths.art_paths);
        anchor_search_list(base, &mut paths.audio_paths);
        for path in &mut self.output.base_patch_search_paths {
            anchor_path(base, path);
        }
    }
}
