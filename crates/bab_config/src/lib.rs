//! Parsing and validation of `bab.toml` build settings.
//!
//! This crate reads the settings file and produces a strongly-typed [`Settings`]
//! with named build-configuration overlays and project-relative path anchoring.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{find_settings_file, load_settings, load_settings_from_str, SETTINGS_FILE_NAME};
pub use resolve::resolve_configuration;
pub use types::*;
