//! Structured, non-fatal build diagnostics.
//!
//! Fatal problems abort a build through `bab_common::BuildError`. Everything a
//! plugin or the engine wants to report without stopping the build becomes a
//! [`Diagnostic`], collected in a thread-safe [`DiagnosticSink`] and rendered by a
//! [`DiagnosticRenderer`] once the build is over.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::{Diagnostic, Origin, Severity};
pub use renderer::{DiagnosticRenderer, TerminalRenderer};
pub use sink::DiagnosticSink;
