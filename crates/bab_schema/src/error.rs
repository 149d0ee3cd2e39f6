//! Schema error types.

use std::path::PathBuf;

/// Errors produced while loading a schema or validating against it.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A schema file could not be read or parsed.
    #[error("error encountered in schema '{path}': {source}")]
    Read {
        /// The schema file.
        path: PathBuf,
        /// The underlying XML error.
        #[source]
        source: bab_xml::XmlError,
    },

    /// A schema file is well-formed but not a usable schema.
    #[error("invalid schema '{path}': {reason}")]
    Invalid {
        /// The schema file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A type the engine relies on is not declared.
    #[error("schema does not declare required type '{0}'")]
    MissingType(String),

    /// One or more instance nodes do not conform to the schema.
    #[error("{}", .0.join("\n"))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_joins_messages() {
        let err = SchemaError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "a\nb");
    }

    #[test]
    fn missing_type_display() {
        let err = SchemaError::MissingType("BaseAssetType".to_string());
        assert!(err.to_string().contains("BaseAssetType"));
    }
}
