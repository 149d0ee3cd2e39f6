//! Insertion-ordered sets of instances keyed by identity.

use crate::instance::InstanceRef;
use bab_common::InstanceHandle;
use std::collections::HashMap;

/// Instances visible in one scope, in the order they became visible.
#[derive(Clone, Debug, Default)]
pub struct InstanceSet {
    entries: Vec<(InstanceHandle, InstanceRef)>,
    index: HashMap<InstanceHandle, usize>,
}

impl InstanceSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance unless its identity is already present. Returns whether it was added.
    pub fn try_add(&mut self, handle: InstanceHandle, r: InstanceRef) -> bool {
        if self.index.contains_key(&handle) {
            return false;
        }
        self.index.insert(handle.clone(), self.entries.len());
        self.entries.push((handle, r));
        true
    }

    /// Adds every instance of `other` that is not yet present.
    pub fn add_all(&mut self, other: &InstanceSet) {
        for (handle, r) in &other.entries {
            self.try_add(handle.clone(), *r);
        }
    }

    /// The instance with `handle`'s identity.
    pub fn get(&self, handle: &InstanceHandle) -> Option<InstanceRef> {
        self.index.get(handle).map(|&i| self.entries[i].1)
    }

    /// Whether `handle`'s identity is present.
    pub fn contains(&self, handle: &InstanceHandle) -> bool {
        self.index.contains_key(handle)
    }

    /// Keeps the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&InstanceHandle, &InstanceRef) -> bool) {
        self.entries.retain(|(h, r)| keep(h, r));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (h, _))| (h.clone(), i))
            .collect();
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&InstanceHandle, InstanceRef)> {
        self.entries.iter().map(|(h, r)| (h, *r))
    }
}
