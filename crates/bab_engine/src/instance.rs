//! Declared asset instances.
//!
//! An instance lives inside the document that declares it and is reached from every
//! other place through an [`InstanceRef`]. While its document is being built the
//! instance is [`InstanceState::Live`] and owns its XML; once the document completes
//! the XML is released (inheritable instances keep theirs as an override source),
//! and the persisted form is an [`InstanceSnapshot`] with no XML at all.

use crate::arena::DocId;
use bab_common::InstanceHandle;
use bab_xml::Element;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Where an instance is stored inside its document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// A declaration of the document itself.
    Own(usize),
    /// An entry of a precompiled manifest loaded on behalf of the document.
    Precompiled(usize),
}

/// Non-owning reference to an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceRef {
    /// Owning document.
    pub doc: DocId,
    /// Position in the document.
    pub slot: Slot,
}

/// Lifecycle of an instance's in-memory data.
#[derive(Clone, Debug, Default)]
pub enum InstanceState {
    /// Being built; XML is available unless it has been dropped.
    Live {
        /// The instance XML.
        xml: Option<Element>,
        /// Side-car file the compiler may write.
        custom_data_path: Option<PathBuf>,
    },
    /// Built this session.
    Complete {
        /// Kept only for inheritable instances.
        xml: Option<Element>,
    },
    /// Restored from the session cache or a manifest.
    #[default]
    Cached,
}

/// The persisted fields of an instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    /// Identity with content hashes.
    pub handle: InstanceHandle,
    /// Compiler version stamp.
    pub processing_hash: u32,
    /// Strong references.
    pub referenced: Vec<InstanceHandle>,
    /// Weak references.
    pub weak_referenced: Vec<InstanceHandle>,
    /// Resolved referenced files.
    pub referenced_files: Vec<String>,
    /// Declared inheritance source.
    pub inherit_from: Option<InstanceHandle>,
    /// Prevalidation hash of the inheritance source at merge time.
    pub inherit_from_xml_hash: u32,
    /// Hash of the merged XML before validation rewrote it.
    pub prevalidation_xml_hash: u32,
    /// Whether the type derives from `BaseInheritableAsset`.
    pub is_inheritable: bool,
    /// Whether the compiler writes custom data.
    pub has_custom_data: bool,
}

/// One instance as declared in one document.
#[derive(Clone, Debug)]
pub struct InstanceDeclaration {
    /// Identity; hashes are filled in by validation.
    pub handle: InstanceHandle,
    /// Declaring document.
    pub document: DocId,
    /// Compiler version stamp.
    pub processing_hash: u32,
    /// Strong references in document order.
    pub referenced: Vec<InstanceHandle>,
    /// Weak references in document order.
    pub weak_referenced: Vec<InstanceHandle>,
    /// Resolved referenced files.
    pub referenced_files: Vec<String>,
    /// Declared inheritance source.
    pub inherit_from: Option<InstanceHandle>,
    /// Prevalidation hash of the inheritance source at merge time.
    pub inherit_from_xml_hash: u32,
    /// Hash of the merged XML before validation; `0` until merged this session.
    pub prevalidation_xml_hash: u32,
    /// Whether the type derives from `BaseInheritableAsset`.
    pub is_inheritable: bool,
    /// Whether the compiler writes custom data.
    pub has_custom_data: bool,
    /// Strong references after resolution, with resolved types.
    pub validated_referenced: Option<Vec<InstanceHandle>>,
    /// Resolved strong dependencies that belong to the same stream.
    pub output_dependencies: Vec<InstanceRef>,
    /// Transitive strong dependencies within the stream.
    pub all_dependents: BTreeSet<InstanceHandle>,
    state: InstanceState,
}

impl InstanceDeclaration {
    /// A freshly parsed instance.
    pub fn new(handle: InstanceHandle, document: DocId, xml: Element) -> Self {
        Self {
            handle,
            document,
            processing_hash: 0,
            referenced: Vec::new(),
            weak_referenced: Vec::new(),
            referenced_files: Vec::new(),
            inherit_from: None,
            inherit_from_xml_hash: 0,
            prevalidation_xml_hash: 0,
            is_inheritable: false,
            has_custom_data: false,
            validated_referenced: None,
            output_dependencies: Vec::new(),
            all_dependents: BTreeSet::new(),
            state: InstanceState::Live {
                xml: Some(xml),
                custom_data_path: None,
            },
        }
    }

    /// An instance known only from a precompiled manifest.
    pub fn precompiled(handle: InstanceHandle, document: DocId) -> Self {
        Self::from_snapshot(
            InstanceSnapshot {
                handle,
                processing_hash: 0,
                referenced: Vec::new(),
                weak_referenced: Vec::new(),
                referenced_files: Vec::new(),
                inherit_from: None,
                inherit_from_xml_hash: 0,
                prevalidation_xml_hash: 0,
                is_inheritable: false,
                has_custom_data: false,
            },
            document,
        )
    }

    /// Rehydrates a persisted instance.
    pub fn from_snapshot(snapshot: InstanceSnapshot, document: DocId) -> Self {
        Self {
            handle: snapshot.handle,
            document,
            processing_hash: snapshot.processing_hash,
            referenced: snapshot.referenced,
            weak_referenced: snapshot.weak_referenced,
            referenced_files: snapshot.referenced_files,
            inherit_from: snapshot.inherit_from,
            inherit_from_xml_hash: snapshot.inherit_from_xml_hash,
            prevalidation_xml_hash: snapshot.prevalidation_xml_hash,
            is_inheritable: snapshot.is_inheritable,
            has_custom_data: snapshot.has_custom_data,
            validated_referenced: None,
            output_dependencies: Vec::new(),
            all_dependents: BTreeSet::new(),
            state: InstanceState::Cached,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    /// The instance XML, if it is still held.
    pub fn xml(&self) -> Option<&Element> {
        match &self.state {
            InstanceState::Live { xml, .. } | InstanceState::Complete { xml } => xml.as_ref(),
            InstanceState::Cached => None,
        }
    }

    /// Mutable access to the instance XML.
    pub fn xml_mut(&mut self) -> Option<&mut Element> {
        match &mut self.state {
            InstanceState::Live { xml, .. } | InstanceState::Complete { xml } => xml.as_mut(),
            InstanceState::Cached => None,
        }
    }

    /// Replaces the XML, making the instance live again.
    pub fn set_xml(&mut self, element: Element) {
        match &mut self.state {
            InstanceState::Live { xml, .. } => *xml = Some(element),
            _ => {
                self.state = InstanceState::Live {
                    xml: Some(element),
                    custom_data_path: None,
                }
            }
        }
    }

    /// Releases the XML.
    pub fn drop_xml(&mut self) {
        match &mut self.state {
            InstanceState::Live { xml, .. } | InstanceState::Complete { xml } => *xml = None,
            InstanceState::Cached => {}
        }
    }

    /// Where the compiler may write custom data.
    pub fn custom_data_path(&self) -> Option<&std::path::Path> {
        match &self.state {
            InstanceState::Live {
                custom_data_path, ..
            } => custom_data_path.as_deref(),
            _ => None,
        }
    }

    /// Sets the custom-data path of a live instance.
    pub fn set_custom_data_path(&mut self, path: PathBuf) {
        if let InstanceState::Live {
            custom_data_path, ..
        } = &mut self.state
        {
            *custom_data_path = Some(path);
        }
    }

    /// Ends the live phase. Non-inheritable instances release their XML.
    pub fn complete(&mut self) {
        if let InstanceState::Live { xml, .. } = &mut self.state {
            let xml = if self.is_inheritable { xml.take() } else { None };
            self.state = InstanceState::Complete { xml };
        }
    }

    /// Forgets per-build resolution results.
    pub fn reset_resolution(&mut self) {
        self.validated_referenced = None;
        self.output_dependencies.clear();
        self.all_dependents.clear();
    }

    /// The persisted form.
    pub fn make_cacheable(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            handle: self.handle.clone(),
            processing_hash: self.processing_hash,
            referenced: self.referenced.clone(),
            weak_referenced: self.weak_referenced.clone(),
            referenced_files: self.referenced_files.clone(),
            inherit_from: self.inherit_from.clone(),
            inherit_from_xml_hash: self.inherit_from_xml_hash,
            prevalidation_xml_hash: self.prevalidation_xml_hash,
            is_inheritable: self.is_inheritable,
            has_custom_data: self.has_custom_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaId;

    fn doc() -> DocId {
        DocId::from_raw(0)
    }

    #[test]
    fn complete_releases_xml_unless_inheritable() {
        let mut plain = InstanceDeclaration::new(InstanceHandle::new("T", "a"), doc(), Element::new("T"));
        plain.complete();
        assert!(plain.xml().is_none());
        assert!(matches!(plain.state(), InstanceState::Complete { .. }));

        let mut base = InstanceDeclaration::new(InstanceHandle::new("T", "b"), doc(), Element::new("T"));
        base.is_inheritable = true;
        base.complete();
        assert!(base.xml().is_some());
    }

    #[test]
    fn snapshot_keeps_identity_and_drops_xml() {
        let mut inst = InstanceDeclaration::new(InstanceHandle::new("T", "a"), doc(), Element::new("T"));
        inst.handle.instance_hash = 42;
        inst.referenced.push(InstanceHandle::new("T", "b"));
        inst.all_dependents.insert(InstanceHandle::new("T", "b"));
        let restored = InstanceDeclaration::from_snapshot(inst.make_cacheable(), doc());
        assert_eq!(restored.handle.instance_hash, 42);
        assert_eq!(restored.referenced.len(), 1);
        assert!(restored.all_dependents.is_empty());
        assert!(restored.xml().is_none());
        assert!(matches!(restored.state(), InstanceState::Cached));
    }

    #[test]
    fn custom_data_path_only_while_live() {
        let mut inst = InstanceDeclaration::new(InstanceHandle::new("T", "a"), doc(), Element::new("T"));
        inst.set_custom_data_path(PathBuf::from("/o/cdata/x.cdata"));
        assert!(inst.custom_data_path().is_some());
        inst.complete();
        assert!(inst.custom_data_path().is_none());
    }
}
