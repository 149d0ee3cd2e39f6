//! The fatal build error type and its code catalogue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The standard result type for operations that can abort a build.
pub type BuildResult<T> = Result<T, BuildError>;

/// Identifies the class of a fatal build error.
///
/// Codes are stable so tooling can match on them; the message carries the details.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A broken internal invariant or an unrecoverable I/O failure.
    InternalError,
    /// A document inclusion cycle or a circular output dependency.
    CircularDependency,
    /// Two instances with the same identity in one scope.
    DuplicateInstance,
    /// A definition declared twice without `override`.
    DuplicateDefine,
    /// A document does not conform to the asset schema.
    SchemaValidation,
    /// Malformed XML or XML the merge engine cannot place.
    XmlFormattingError,
    /// A missing, ineligible or out-of-scope inheritance source.
    InheritFromError,
    /// A malformed, mistyped or ambiguous asset reference.
    ReferencingError,
    /// A strong reference that resolves to nothing.
    UnknownReference,
    /// A referenced file or manifest does not exist.
    FileNotFound,
    /// The root input document does not exist.
    InputXmlFileNotFound,
    /// Two different strings produced the same hash in one bin.
    HashCollision,
    /// A path that cannot be used in its context.
    IllegalPath,
    /// A path prefixed with an unknown alias.
    IllegalPathAlias,
    /// An instance element without an `id` attribute.
    NoIdAttributeForAsset,
    /// A stream reference was used without a configured data root.
    NoDataRootSpecified,
    /// Cached state is inconsistent with what is on disk.
    DependencyCacheFailure,
    /// An output file is locked or cannot be replaced.
    LockedFile,
    /// An asset file whose length disagrees with its header.
    UnexpectedSize,
    /// A verifier plugin rejected an instance.
    GameDataVerification,
    /// A manifest produced by an incompatible build.
    IncompatibleManifest,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A fatal error that aborts the whole build.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BuildError {
    /// The error class.
    pub code: ErrorCode,
    /// Human-readable details.
    pub message: String,
}

impl BuildError {
    /// Creates a new build error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for an [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Wraps an I/O error that happened on `path`.
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::internal(format!("I/O error on {}: {err}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = BuildError::new(ErrorCode::DuplicateInstance, "Duplicate Instance: T:a");
        assert_eq!(format!("{err}"), "DuplicateInstance: Duplicate Instance: T:a");
    }

    #[test]
    fn internal_shorthand() {
        let err = BuildError::internal("something broke");
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.message, "something broke");
    }

    #[test]
    fn io_carries_path() {
        let err = BuildError::io(
            std::path::Path::new("/tmp/x.asset"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.message.contains("/tmp/x.asset"));
        assert!(err.message.contains("gone"));
    }

    #[test]
    fn err_path() {
        let r: BuildResult<i32> = Err(BuildError::internal("test error"));
        assert!(matches!(r, Err(BuildError { code: ErrorCode::InternalError, .. })));
    }
}
