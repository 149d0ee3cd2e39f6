//! `<Include>` edges between documents.

use crate::arena::DocId;
use bab_common::{BuildError, BuildResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How the instances of an included document become visible to the includer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InclusionType {
    /// A separate stream: visible for lookups only.
    Reference,
    /// Eligible as inheritance sources.
    Instance,
    /// Visible and merged into the includer's output, but not declared by it.
    All,
}

impl FromStr for InclusionType {
    type Err = BuildError;

    fn from_str(s: &str) -> BuildResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" => Ok(Self::Reference),
            "instance" => Ok(Self::Instance),
            "all" => Ok(Self::All),
            other => Err(BuildError::new(
                ErrorCode::XmlFormattingError,
                format!("{other} is not a valid inclusion type.  Valid values: all, instance, reference"),
            )),
        }
    }
}

impl fmt::Display for InclusionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reference => "reference",
            Self::Instance => "instance",
            Self::All => "all",
        })
    }
}

/// One inclusion of a document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InclusionItem {
    /// The path as written in the `source` attribute.
    pub logical_path: String,
    /// The resolved file.
    pub physical_path: PathBuf,
    /// Visibility of the included instances.
    pub kind: InclusionType,
    /// The included document once it has been processed this build.
    #[serde(skip)]
    pub document: Option<DocId>,
}

impl InclusionItem {
    /// An unresolved inclusion.
    pub fn new(logical_path: impl Into<String>, physical_path: PathBuf, kind: InclusionType) -> Self {
        Self {
            logical_path: logical_path.into(),
            physical_path,
            kind,
            document: None,
        }
    }
}
