//! Mapping of infrastructure errors onto fatal build errors.
//!
//! Every lower layer keeps its own error enum; the engine reports all of them as a
//! [`BuildError`] with the code a user would expect for that class of failure.

use bab_cache::CacheError;
use bab_common::{BuildError, ErrorCode};
use bab_config::ConfigError;
use bab_schema::SchemaError;
use bab_xml::XmlError;
use std::path::Path;

/// Converts an XML error. Malformed input is a formatting error, not an internal one.
pub fn from_xml(err: XmlError) -> BuildError {
    match err {
        XmlError::Malformed { .. } | XmlError::NoRoot => {
            BuildError::new(ErrorCode::XmlFormattingError, err.to_string())
        }
        XmlError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
            BuildError::new(
                ErrorCode::InputXmlFileNotFound,
                format!("Input file '{}' not found.", path.display()),
            )
        }
        other => BuildError::internal(other.to_string()),
    }
}

/// Converts an XML error raised while reading `path`.
pub fn from_xml_in(path: &Path, err: XmlError) -> BuildError {
    let mut converted = from_xml(err);
    if converted.code == ErrorCode::XmlFormattingError {
        converted.message = format!("{} (file://{})", converted.message, path.display());
    }
    converted
}

/// Converts a schema error.
pub fn from_schema(err: SchemaError) -> BuildError {
    match err {
        SchemaError::Validation(_) => BuildError::new(ErrorCode::SchemaValidation, err.to_string()),
        SchemaError::MissingType(_) => BuildError::new(ErrorCode::SchemaValidation, err.to_string()),
        other => BuildError::internal(other.to_string()),
    }
}

/// Converts a session-cache error.
pub fn from_cache(err: CacheError) -> BuildError {
    match err {
        CacheError::Corrupt { .. } => {
            BuildError::internal("Session cache could not be opened. Please rebuild")
        }
        CacheError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
            BuildError::new(
                ErrorCode::FileNotFound,
                format!("File '{}' not found.", path.display()),
            )
        }
        other => BuildError::internal(other.to_string()),
    }
}

/// Converts a settings error.
pub fn from_config(err: ConfigError) -> BuildError {
    BuildError::internal(err.to_string())
}
