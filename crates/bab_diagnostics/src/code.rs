//! Diagnostic codes with category prefixes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The subsystem a diagnostic comes from, determining its prefix letter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Document and reference problems, prefixed with `D`.
    Document,
    /// Compiler and verifier plugin reports, prefixed with `P`.
    Plugin,
    /// Output, cache and manifest problems, prefixed with `O`.
    Output,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Document => 'D',
            Category::Plugin => 'P',
            Category::Output => 'O',
        }
    }
}

/// A category prefix plus a number, displayed as e.g. `P001`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// No plugin is registered for an instance's type.
    pub const NO_PLUGIN: Self = Self::new(Category::Plugin, 1);
    /// A plugin failed to compile one instance.
    pub const PLUGIN_FAILED: Self = Self::new(Category::Plugin, 2);
    /// A strong reference could not be resolved.
    pub const UNKNOWN_REFERENCE: Self = Self::new(Category::Document, 1);
    /// A referenced file does not exist.
    pub const MISSING_FILE: Self = Self::new(Category::Document, 2);
    /// A cached or previous-run file had to be discarded.
    pub const DISCARDED_OUTPUT: Self = Self::new(Category::Output, 1);

    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}
