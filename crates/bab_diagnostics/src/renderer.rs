//! Diagnostic rendering.

use crate::diagnostic::{Diagnostic, Severity};

/// Formats diagnostics into strings for some output target.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a compiler-style terminal format:
///
/// ```text
/// warning[P001]: no plugin registered for type 'Weapon'
///   --> file:///data/weapons.xml (Weapon:Gun)
///    = note: the instance is compiled empty
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, severity: Severity) -> (&'static str, &'static str) {
        if !self.color {
            return ("", "");
        }
        match severity {
            Severity::Error => ("\x1b[1;31m", "\x1b[0m"),
            Severity::Warning => ("\x1b[1;33m", "\x1b[0m"),
            Severity::Note => ("\x1b[1;36m", "\x1b[0m"),
        }
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let (on, off) = self.paint(diag.severity);
        let mut out = format!("{on}{}[{}]{off}: {}\n", diag.severity, diag.code, diag.message);
        if let Some(origin) = &diag.origin {
            out.push_str(&format!("  --> {origin}\n"));
        }
        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        out
    }
}
