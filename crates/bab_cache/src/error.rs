//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur while reading, hashing or persisting cache state.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing a file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A session cache file exists but cannot be decoded.
    #[error("session cache {path} is corrupt: {reason}")]
    Corrupt {
        /// The cache file.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A serialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The read-ahead thread stopped unexpectedly.
    #[error("read-ahead of {path} was interrupted")]
    ReaderStopped {
        /// The file being read.
        path: PathBuf,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::io(
            "/tmp/x.cache",
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("x.cache"));
    }

    #[test]
    fn corrupt_display() {
        let err = CacheError::Corrupt {
            path: PathBuf::from("s.cache"),
            reason: "bad magic".to_string(),
        };
        assert_eq!(err.to_string(), "session cache s.cache is corrupt: bad magic");
    }
}
