//! Stable asset instance identity.

use crate::hash::{hash_text, hash_text_lower};
use crate::result::{BuildError, BuildResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The identity of one declared asset instance.
///
/// `type_id` is the case-sensitive hash of the type name and `instance_id` the
/// case-insensitive hash of the instance name. Equality, ordering and hashing look
/// only at `(type_id, instance_id)`: two handles whose ids collide are the same
/// identity even when their display names differ.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InstanceHandle {
    type_name: String,
    instance_name: String,
    type_id: u32,
    instance_id: u32,
    /// Content hash of the instance's type, filled in during validation.
    pub type_hash: u32,
    /// Content hash of the instance's final XML, filled in during validation.
    pub instance_hash: u32,
}

/// Case-sensitive type id for a type name.
pub fn type_id_of(type_name: &str) -> u32 {
    hash_text(type_name)
}

/// Case-insensitive instance id for an instance name.
pub fn instance_id_of(instance_name: &str) -> u32 {
    hash_text_lower(instance_name)
}

impl InstanceHandle {
    /// Creates a handle from a type name and an instance name.
    pub fn new(type_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let instance_name = instance_name.into();
        Self {
            type_id: type_id_of(&type_name),
            instance_id: instance_id_of(&instance_name),
            type_name,
            instance_name,
            type_hash: 0,
            instance_hash: 0,
        }
    }

    /// Creates a handle with known content hashes, as stored in a manifest.
    pub fn with_hashes(
        type_name: impl Into<String>,
        type_hash: u32,
        instance_name: impl Into<String>,
        instance_hash: u32,
    ) -> Self {
        let mut handle = Self::new(type_name, instance_name);
        handle.type_hash = type_hash;
        handle.instance_hash = instance_hash;
        handle
    }

    /// Parses `"Type:Instance"` or a bare `"Instance"` (type id `0`).
    pub fn parse(text: &str) -> BuildResult<Self> {
        let parts: Vec<&str> = text.split(':').collect();
        match parts.as_slice() {
            [instance] => Ok(Self {
                instance_id: instance_id_of(instance),
                instance_name: (*instance).to_string(),
                ..Self::default()
            }),
            [type_name, instance] => Ok(Self::new(*type_name, *instance)),
            _ => Err(BuildError::new(
                ErrorCode::ReferencingError,
                format!("Invalid instance name '{text}'."),
            )),
        }
    }

    /// The type name as written in source (may be empty for untyped references).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The instance name as written in source.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Case-sensitive hash of the type name.
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    /// Case-insensitive hash of the instance name.
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Replaces the type name, recomputing the type id.
    pub fn set_type_name(&mut self, type_name: impl Into<String>) {
        self.type_name = type_name.into();
        self.type_id = type_id_of(&self.type_name);
    }

    /// `"Type:Instance"`.
    pub fn name(&self) -> String {
        format!("{}:{}", self.type_name, self.instance_name)
    }

    /// `"Type:Instance [tttttttt:iiiiiiii]"`.
    pub fn full_name(&self) -> String {
        format!(
            "{}:{} [{:08x}:{:08x}]",
            self.type_name, self.instance_name, self.type_id, self.instance_id
        )
    }

    /// Base name shared by the asset and custom-data files of this exact content.
    pub fn file_base(&self) -> String {
        format!(
            "{:08x}.{:08x}.{:08x}.{:08x}",
            self.type_id, self.type_hash, self.instance_id, self.instance_hash
        )
    }
}

impl PartialEq for InstanceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.instance_id == other.instance_id
    }
}

impl Eq for InstanceHandle {}

impl Hash for InstanceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.instance_id.hash(state);
    }
}

impl PartialOrd for InstanceHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InstanceHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.type_id, self.instance_id).cmp(&(other.type_id, other.instance_id))
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic() {
        let a = InstanceHandle::new("GameObject", "Tank");
        let b = InstanceHandle::new("GameObject", "Tank");
        assert_eq!(a.type_id(), b.type_id());
        assert_eq!(a.instance_id(), b.instance_id());
        assert_eq!(a, b);
    }

    #[test]
    fn instance_name_is_case_insensitive() {
        let a = InstanceHandle::new("GameObject", "Tank");
        let b = InstanceHandle::new("GameObject", "TANK");
        assert_eq!(a, b);
        let c = InstanceHandle::new("gameobject", "Tank");
        assert_ne!(a, c);
    }

    #[test]
    fn equality_ignores_hashes_and_names() {
        let a = InstanceHandle::with_hashes("T", 1, "foo", 2);
        let mut b = InstanceHandle::with_hashes("T", 3, "FOO", 4);
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        b.instance_hash = 99;
        assert_eq!(a, b);
        assert_ne!(a.instance_name(), b.instance_name());
    }

    #[test]
    fn parse_forms() {
        let typed = InstanceHandle::parse("Weapon:Gun").unwrap();
        assert_eq!(typed, InstanceHandle::new("Weapon", "Gun"));
        let bare = InstanceHandle::parse("Gun").unwrap();
        assert_eq!(bare.type_id(), 0);
        assert_eq!(bare.instance_name(), "Gun");
        let err = InstanceHandle::parse("a:b:c").unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferencingError);
    }

    #[test]
    fn set_type_name_recomputes_id() {
        let mut h = InstanceHandle::parse("Gun").unwrap();
        h.set_type_name("Weapon");
        assert_eq!(h, InstanceHandle::new("Weapon", "Gun"));
    }

    #[test]
    fn name_formats() {
        let mut h = InstanceHandle::new("T", "a");
        h.type_hash = 0x10;
        h.instance_hash = 0xabc;
        assert_eq!(h.name(), "T:a");
        assert!(h.full_name().starts_with("T:a ["));
        let base = h.file_base();
        let parts: Vec<&str> = base.split('.').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1], "00000010");
        assert_eq!(parts[3], "00000abc");
    }

    #[test]
    fn ordering_by_type_then_instance() {
        let mut handles = vec![
            InstanceHandle::new("B", "x"),
            InstanceHandle::new("A", "y"),
            InstanceHandle::new("A", "x"),
        ];
        handles.sort();
        for pair in handles.windows(2) {
            assert!(
                (pair[0].type_id(), pair[0].instance_id())
                    <= (pair[1].type_id(), pair[1].instance_id())
            );
        }
    }
}
