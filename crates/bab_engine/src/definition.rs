//! Named string definitions (`<Defines>`).
//!
//! A document sees its own definitions plus every definition of the documents it
//! includes. Values starting with `=` are expressions, evaluated once on first use.

use crate::expression::{DefineLookup, ExpressionEvaluator};
use bab_common::{BuildError, BuildResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One `<Define name=".." value=".." override="..">`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Definition {
    /// Name the definition is referenced by (`$Name`).
    pub name: String,
    /// The value as written. Not persisted; cached definitions only keep the result.
    #[serde(skip)]
    pub original_value: Option<String>,
    /// The value after expression evaluation.
    pub evaluated_value: Option<String>,
    /// Whether the definition may replace one from an included document.
    pub is_override: bool,
    /// Document that declared the definition.
    #[serde(skip)]
    pub source: PathBuf,
}

impl Definition {
    /// A definition declared in `source`.
    pub fn new(name: impl Into<String>, value: impl Into<String>, is_override: bool, source: &Path) -> Self {
        Self {
            name: name.into(),
            original_value: Some(value.into()),
            evaluated_value: None,
            is_override,
            source: source.to_path_buf(),
        }
    }
}

/// Definitions by name.
#[derive(Clone, Debug, Default)]
pub struct DefinitionSet {
    entries: BTreeMap<String, Definition>,
}

fn duplicate(name: &str, new: &Path, existing: &Path) -> BuildError {
    BuildError::new(
        ErrorCode::DuplicateDefine,
        format!(
            "Definition {name} defined in {} is already defined in {}",
            new.display(),
            existing.display()
        ),
    )
}

impl DefinitionSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a definition.
    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.entries.get(name)
    }

    /// The evaluated value of `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries.get(name)?.evaluated_value.as_deref()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every definition.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.entries.values()
    }

    /// Merges the visible definitions of an included document.
    ///
    /// The same definition reached through two inclusion paths is fine; two
    /// definitions of one name from different documents are not.
    pub fn merge(&mut self, other: &DefinitionSet) -> BuildResult<()> {
        for def in other.iter() {
            match self.entries.get(&def.name) {
                Some(existing) if existing.source != def.source => {
                    return Err(duplicate(&def.name, &def.source, &existing.source));
                }
                Some(_) => {}
                None => {
                    self.entries.insert(def.name.clone(), def.clone());
                }
            }
        }
        Ok(())
    }

    /// Evaluates `defines` (in declaration order) and adds them to the set.
    ///
    /// Earlier definitions are visible to later ones.
    pub fn evaluate_into(
        &mut self,
        defines: &mut [Definition],
        evaluator: &dyn ExpressionEvaluator,
    ) -> BuildResult<()> {
        for def in defines.iter_mut() {
            if def.evaluated_value.is_none() {
                let raw = def.original_value.clone().unwrap_or_default();
                let value = match raw.strip_prefix('=') {
                    Some(expr) => evaluator.evaluate(expr, &mut Lookup::new(self))?,
                    None => raw,
                };
                def.evaluated_value = Some(value);
            }
            if let Some(existing) = self.entries.get(&def.name) {
                if existing.source != def.source && !def.is_override {
                    return Err(duplicate(&def.name, &def.source, &existing.source));
                }
            }
            self.entries.insert(def.name.clone(), def.clone());
        }
        Ok(())
    }
}

/// [`DefineLookup`] over a set, optionally recording what was read.
pub struct Lookup<'a> {
    set: &'a DefinitionSet,
    used: Option<&'a mut BTreeMap<String, String>>,
}

impl<'a> Lookup<'a> {
    /// Lookups that are not recorded.
    pub fn new(set: &'a DefinitionSet) -> Self {
        Self { set, used: None }
    }

    /// Lookups recorded into `used` as `name → evaluated value`.
    pub fn recording(set: &'a DefinitionSet, used: &'a mut BTreeMap<String, String>) -> Self {
        Self {
            set,
            used: Some(used),
        }
    }
}

impl DefineLookup for Lookup<'_> {
    fn lookup_define(&mut self, name: &str) -> Option<String> {
        let value = self.set.value(name)?.to_string();
        if let Some(used) = &mut self.used {
            used.insert(name.to_string(), value.clone());
        }
        Some(value)
    }
}
