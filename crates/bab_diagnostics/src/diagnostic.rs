//! Diagnostic messages.

use crate::code::DiagnosticCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How serious a diagnostic is. Ordered from least to most severe.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Severity {
    /// Additional context.
    Note,
    /// Something worth fixing that does not fail the build.
    Warning,
    /// A problem the build tolerated but whose output is not trustworthy.
    Error,
}

impl Severity {
    /// Returns `true` for [`Severity::Error`].
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Where a diagnostic originated: a source document and optionally an instance in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// The source document.
    pub file: PathBuf,
    /// Display name of the instance, if the diagnostic concerns one.
    pub instance: Option<String>,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file://{}", self.file.display())?;
        if let Some(instance) = &self.instance {
            write!(f, " ({instance})")?;
        }
        Ok(())
    }
}

/// A structured diagnostic message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the kind of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// The document and instance the diagnostic is about.
    pub origin: Option<Origin>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn with_severity(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            origin: None,
            notes: Vec::new(),
        }
    }

    /// Creates an error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message)
    }

    /// Creates a warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    /// Attaches the originating document and instance.
    pub fn with_origin(mut self, file: impl Into<PathBuf>, instance: Option<String>) -> Self {
        self.origin = Some(Origin {
            file: file.into(),
            instance,
        });
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Note < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error.is_error());
        assert!(!Severity::Warning.is_error());
    }

    #[test]
    fn builder_methods() {
        let diag = Diagnostic::warning(DiagnosticCode::NO_PLUGIN, "no plugin")
            .with_origin("/data/units.xml", Some("GameObject:Tank".to_string()))
            .with_note("the instance is compiled empty");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.notes.len(), 1);
        let origin = diag.origin.unwrap();
        assert_eq!(origin.to_string(), "file:///data/units.xml (GameObject:Tank)");
    }

    #[test]
    fn origin_without_instance() {
        let origin = Origin {
            file: PathBuf::from("/data/a.xml"),
            instance: None,
        };
        assert_eq!(origin.to_string(), "file:///data/a.xml");
    }
}
