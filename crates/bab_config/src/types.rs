//! Settings types deserialized from `bab.toml`.

use bab_common::TargetPlatform;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The complete settings of one build.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Input, output and cache locations.
    pub paths: PathSettings,
    /// Build behavior switches.
    pub build: BuildSettings,
    /// Output naming and patch-stream linkage.
    pub output: OutputSettings,
    /// Extra string-hash bins, keyed by the schema types whose values they record.
    pub string_hash_bins: Vec<HashBinDescriptor>,
    /// Named overlays applied by [`resolve_configuration`](crate::resolve_configuration).
    pub configurations: BTreeMap<String, ConfigurationOverlay>,
}

/// Filesystem locations. Relative paths are anchored at the settings file's directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Root of the source data tree; stream references are named relative to it.
    pub data_root: Option<PathBuf>,
    /// Search path used by the `data:` alias. `*` stands for the including document's directory.
    pub data_paths: Vec<String>,
    /// Search path used by the `art:` alias.
    pub art_paths: Vec<String>,
    /// Search path used by the `audio:` alias.
    pub audio_paths: Vec<String>,
    /// The asset schema (`.xsd`).
    pub schema_path: Option<PathBuf>,
    /// Where manifests, custom data and linked streams are written.
    pub output_directory: PathBuf,
    /// Where compiled asset files are written. Defaults to the output directory.
    pub intermediate_output_directory: Option<PathBuf>,
    /// Where the session cache lives. Defaults to the intermediate directory.
    pub session_cache_directory: Option<PathBuf>,
    /// Root of the shared build cache, if any.
    pub build_cache_directory: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_root: None,
            data_paths: vec!["*".to_string()],
            art_paths: vec!["*".to_string()],
            audio_paths: vec!["*".to_string()],
            schema_path: None,
            output_directory: PathBuf::from("out"),
            intermediate_output_directory: None,
            session_cache_directory: None,
            build_cache_directory: None,
        }
    }
}

impl PathSettings {
    /// The directory compiled asset files go to.
    pub fn intermediate_directory(&self) -> PathBuf {
        self.intermediate_output_directory
            .clone()
            .unwrap_or_else(|| self.output_directory.clone())
    }

    /// The directory the session cache file goes to.
    pub fn session_cache_dir(&self) -> PathBuf {
        self.session_cache_directory
            .clone()
            .unwrap_or_else(|| self.intermediate_directory())
    }
}

/// Build behavior switches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// The platform assets are compiled for.
    pub target_platform: TargetPlatform,
    /// Name of the active build configuration, part of every session-cache key.
    pub configuration: String,
    /// `0` downgrades missing references and files to warnings; anything higher makes them fatal.
    pub error_level: u32,
    /// Use the stable, patch-friendly output order instead of the simple sort.
    pub stable_sort: bool,
    /// Produce linked `.bin`/`.imp`/`.relo` stream files.
    pub linked_streams: bool,
    /// Write a `.version` file next to each manifest.
    pub version_files: bool,
    /// Skip rebuilding referenced streams that no dirty file feeds.
    pub stream_hints: bool,
    /// Satisfy stream references from existing manifests where possible.
    pub use_precompiled: bool,
    /// Build one file in isolation; stream references need no data root.
    pub single_file: bool,
    /// Read from and write to the shared build cache.
    pub build_cache: bool,
    /// Refresh shared-cache timestamps on every reuse, not only on cache hits.
    pub always_touch_cache: bool,
    /// Always scan output directories when removing stale files.
    pub force_slow_cleanup: bool,
    /// Write each instance's final XML under the intermediate directory.
    pub output_intermediate_xml: bool,
    /// Store the session cache deflate-compressed.
    pub compress_session_cache: bool,
    /// Force the output byte order. Defaults to the platform's.
    pub big_endian: Option<bool>,
}

impl BuildSettings {
    /// Whether binary output is big-endian.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
            .unwrap_or_else(|| self.target_platform.is_big_endian())
    }
}

/// Output naming and base-patch-stream linkage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Appended to every stream's output path.
    pub stream_postfix: String,
    /// Appended after the stream postfix; omitted from `.version` file names.
    pub custom_postfix: String,
    /// Variant suffix tried first when resolving bare `art:` file names.
    pub postfix: String,
    /// Manifest of a previously shipped stream to patch against.
    pub base_patch_stream: Option<String>,
    /// Directories searched for the base patch stream manifest.
    pub base_patch_search_paths: Vec<PathBuf>,
}

/// Declares one string-hash bin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HashBinDescriptor {
    /// Bin name, used in `StringHashes.xml`.
    pub name: String,
    /// Schema simple types whose values are recorded in this bin.
    #[serde(default)]
    pub types: Vec<String>,
    /// Whether hashes in this bin are case-sensitive.
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Values a named build configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigurationOverlay {
    /// Replaces [`OutputSettings::stream_postfix`].
    pub stream_postfix: Option<String>,
    /// Replaces [`OutputSettings::custom_postfix`].
    pub custom_postfix: Option<String>,
    /// Replaces [`BuildSettings::target_platform`].
    pub target_platform: Option<TargetPlatform>,
    /// Replaces [`BuildSettings::error_level`].
    pub error_level: Option<u32>,
    /// Replaces [`BuildSettings::linked_streams`].
    pub linked_streams: Option<bool>,
}
