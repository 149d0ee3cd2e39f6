//! Error types for settings loading and validation.

/// Errors that can occur when loading or validating a `bab.toml` file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the settings file.
    #[error("failed to read settings: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse settings: {0}")]
    ParseError(String),

    /// A requested build configuration is not declared.
    #[error("unknown build configuration '{0}'")]
    UnknownConfiguration(String),

    /// A settings value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
