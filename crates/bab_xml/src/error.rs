//! XML error types.

use std::path::PathBuf;

/// Errors produced while reading or writing XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// The document is not well-formed.
    #[error("malformed XML at byte {position}: {reason}")]
    Malformed {
        /// Byte offset where the reader stopped.
        position: u64,
        /// What went wrong.
        reason: String,
    },

    /// The document has no root element.
    #[error("document has no root element")]
    NoRoot,

    /// Serialization failed.
    #[error("failed to write XML: {0}")]
    Write(String),

    /// A filesystem error on `path`.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_malformed() {
        let err = XmlError::Malformed {
            position: 12,
            reason: "unexpected end".to_string(),
        };
        assert_eq!(err.to_string(), "malformed XML at byte 12: unexpected end");
    }

    #[test]
    fn display_io_contains_path() {
        let err = XmlError::Io {
            path: PathBuf::from("/data/a.xml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/data/a.xml"));
    }
}
