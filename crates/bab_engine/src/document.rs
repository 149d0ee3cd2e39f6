//! Asset declaration documents.
//!
//! A [`Document`] is one source file in the session arena. It is created either
//! from scratch ([`DocumentState::None`], then loaded) or from the snapshot the
//! session cache kept of its last build ([`DocumentState::Shallow`]). Loading parses
//! the XML and gathers the document's tags, definitions, inclusions and instances.

use crate::arena::DocId;
use crate::definition::{Definition, DefinitionSet};
use crate::error;
use crate::inclusion::{InclusionItem, InclusionType};
use crate::instance::{InstanceDeclaration, InstanceRef, InstanceSnapshot, Slot};
use crate::instance_set::InstanceSet;
use crate::resolver::PathResolver;
use bab_cache::CacheDocument;
use bab_common::{fast_hash, hash_text_lower, BuildError, BuildResult, ErrorCode, InstanceHandle};
use bab_schema::SchemaSet;
use bab_xml::Element;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const INCLUDES: &str = "Includes";
const INCLUDE: &str = "Include";
const DEFINES: &str = "Defines";
const DEFINE: &str = "Define";
const TAGS: &str = "Tags";
const INHERIT_FROM: &str = "inheritFrom";

/// How far a document has been processed this build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DocumentState {
    /// Not opened yet.
    #[default]
    None,
    /// Restored from the session cache, not yet verified.
    Shallow,
    /// Parsed and gathered, not yet validated.
    Loaded,
    /// Fully processed.
    Complete,
}

/// How [`Document::load`] treats what is already known about the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Discard everything and gather again.
    FromScratch,
    /// Re-gather tags, definitions and instances; keep resolved inclusions.
    InPlace,
}

/// The four rolling hashes of a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHashes {
    /// Content hash of the source file.
    pub document: u32,
    /// Combined content hash of every referenced file.
    pub dependent_files: u32,
    /// Hash of the resolved inclusion paths.
    pub include_paths: u32,
    /// Checksum of the stream the document generated, if any.
    pub output_checksum: u32,
}

/// What the session cache keeps of a document between runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// The source file.
    pub source_path: PathBuf,
    /// The path as first referenced.
    pub logical_path: String,
    /// Build configuration.
    pub configuration: String,
    /// `<Tags>` content.
    pub tags: Vec<String>,
    /// Evaluated definitions of the document itself.
    pub defines: Vec<Definition>,
    /// Definitions read while validating, with the value read.
    pub used_defines: BTreeMap<String, String>,
    /// Inclusions in declaration order.
    pub inclusions: Vec<InclusionItem>,
    /// Files referenced by the document's instances.
    pub dependent_files: BTreeSet<PathBuf>,
    /// Streams that consumed the document.
    pub stream_hints: Vec<String>,
    /// Own instances.
    pub instances: Vec<InstanceSnapshot>,
    /// Rolling hashes at the end of the build.
    pub hashes: DocumentHashes,
}

impl CacheDocument for DocumentSnapshot {
    fn stream_hints(&self) -> &[String] {
        &self.stream_hints
    }
}

/// One source file of the build.
#[derive(Debug)]
pub struct Document {
    /// The source file.
    pub source_path: PathBuf,
    /// The path as first referenced.
    pub logical_path: String,
    /// Directory relative includes are resolved against.
    pub source_directory: PathBuf,
    /// Build configuration.
    pub configuration: String,
    /// Processing progress.
    pub state: DocumentState,
    /// How the document was last parsed this session.
    pub last_load: Option<LoadMode>,
    /// Set while the document is on the processing stack.
    pub processing: bool,
    /// Loaded only to serve as an inheritance source.
    pub reloaded_for_inheritance: bool,
    /// `<Tags>` content.
    pub tags: Vec<String>,
    /// The document's own definitions, in declaration order.
    pub self_defines: Vec<Definition>,
    /// Every definition visible to the document.
    pub all_defines: DefinitionSet,
    /// Definitions read while validating.
    pub used_defines: BTreeMap<String, String>,
    /// Inclusions in declaration order.
    pub inclusions: Vec<InclusionItem>,
    /// Files referenced by the document's instances.
    pub dependent_files: BTreeSet<PathBuf>,
    /// Streams that consumed the document.
    pub stream_hints: Vec<String>,
    /// Own instances, in declaration order.
    pub instances: Vec<InstanceDeclaration>,
    /// Instances read from a precompiled manifest in place of the source.
    pub precompiled: Vec<InstanceDeclaration>,
    /// Own instances by identity.
    pub self_set: InstanceSet,
    /// Instances of `All` inclusions.
    pub all: InstanceSet,
    /// Instances of `Instance` inclusions.
    pub tentative: InstanceSet,
    /// Instances of `Reference` inclusions.
    pub reference: InstanceSet,
    /// `self_set` followed by `all`: what the document contributes to its includer.
    pub merged: InstanceSet,
    /// Current rolling hashes.
    pub hashes: DocumentHashes,
    /// Hashes recorded by the previous build.
    pub last_hashes: DocumentHashes,
}

impl Document {
    /// A document that has never been opened.
    pub fn new(source_path: PathBuf, logical_path: impl Into<String>, configuration: &str) -> Self {
        let source_directory = source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            source_path,
            logical_path: logical_path.into(),
            source_directory,
            configuration: configuration.to_string(),
            state: DocumentState::None,
            last_load: None,
            processing: false,
            reloaded_for_inheritance: false,
            tags: Vec::new(),
            self_defines: Vec::new(),
            all_defines: DefinitionSet::new(),
            used_defines: BTreeMap::new(),
            inclusions: Vec::new(),
            dependent_files: BTreeSet::new(),
            stream_hints: Vec::new(),
            instances: Vec::new(),
            precompiled: Vec::new(),
            self_set: InstanceSet::new(),
            all: InstanceSet::new(),
            tentative: InstanceSet::new(),
            reference: InstanceSet::new(),
            merged: InstanceSet::new(),
            hashes: DocumentHashes::default(),
            last_hashes: DocumentHashes::default(),
        }
    }

    /// Rehydrates a document from its cache snapshot.
    pub fn from_snapshot(id: DocId, snapshot: DocumentSnapshot) -> Self {
        let mut doc = Self::new(
            snapshot.source_path,
            snapshot.logical_path,
            &snapshot.configuration,
        );
        doc.state = DocumentState::Shallow;
        doc.tags = snapshot.tags;
        doc.self_defines = snapshot.defines;
        for def in &mut doc.self_defines {
            def.source = doc.source_path.clone();
        }
        doc.used_defines = snapshot.used_defines;
        doc.inclusions = snapshot.inclusions;
        doc.dependent_files = snapshot.dependent_files;
        doc.stream_hints = snapshot.stream_hints;
        doc.instances = snapshot
            .instances
            .into_iter()
            .map(|snap| InstanceDeclaration::from_snapshot(snap, id))
            .collect();
        doc.rebuild_self_set(id);
        doc.hashes = snapshot.hashes;
        doc.last_hashes = snapshot.hashes;
        doc
    }

    /// The persisted form.
    pub fn make_cacheable(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            source_path: self.source_path.clone(),
            logical_path: self.logical_path.clone(),
            configuration: self.configuration.clone(),
            tags: self.tags.clone(),
            defines: self.self_defines.clone(),
            used_defines: self.used_defines.clone(),
            inclusions: self.inclusions.clone(),
            dependent_files: self.dependent_files.clone(),
            stream_hints: self.stream_hints.clone(),
            instances: self
                .instances
                .iter()
                .map(InstanceDeclaration::make_cacheable)
                .collect(),
            hashes: self.hashes,
        }
    }

    /// Whether the XML of the document is in memory.
    pub fn is_loaded(&self) -> bool {
        self.state == DocumentState::Loaded || self.reloaded_for_inheritance
    }

    /// The instance stored at `slot`.
    pub fn instance(&self, slot: Slot) -> Option<&InstanceDeclaration> {
        match slot {
            Slot::Own(i) => self.instances.get(i),
            Slot::Precompiled(i) => self.precompiled.get(i),
        }
    }

    /// Mutable access to the instance stored at `slot`.
    pub fn instance_mut(&mut self, slot: Slot) -> Option<&mut InstanceDeclaration> {
        match slot {
            Slot::Own(i) => self.instances.get_mut(i),
            Slot::Precompiled(i) => self.precompiled.get_mut(i),
        }
    }

    /// Whether `child` is the target of one of the document's own inclusions.
    pub fn includes_directly(&self, child: DocId) -> bool {
        self.inclusions
            .iter()
            .any(|inc| inc.document == Some(child) && inc.kind != InclusionType::Reference)
    }

    fn rebuild_self_set(&mut self, id: DocId) {
        self.self_set.clear();
        for (i, inst) in self.instances.iter().enumerate() {
            self.self_set.try_add(
                inst.handle.clone(),
                InstanceRef {
                    doc: id,
                    slot: Slot::Own(i),
                },
            );
        }
    }

    /// Clears the inclusion scopes before the inclusions are routed again.
    pub fn reset_scopes(&mut self) {
        self.all.clear();
        self.tentative.clear();
        self.reference.clear();
        self.merged.clear();
        self.all_defines.clear();
    }

    /// Parses the source file and gathers its contents.
    pub fn load(
        &mut self,
        id: DocId,
        schema: &SchemaSet,
        resolver: &PathResolver,
        mode: LoadMode,
        reason: &str,
    ) -> BuildResult<()> {
        tracing::info!(
            reason,
            in_place = mode == LoadMode::InPlace,
            "loading file://{}",
            self.source_path.display()
        );
        let root = bab_xml::parse_file(&self.source_path)
            .map_err(|e| error::from_xml_in(&self.source_path, e))?;

        self.tags.clear();
        self.self_defines.clear();
        self.used_defines.clear();
        self.instances.clear();
        self.precompiled.clear();
        self.self_set.clear();
        if mode == LoadMode::FromScratch {
            self.inclusions.clear();
            self.dependent_files.clear();
        }

        self.gather_tags(&root);
        self.gather_defines(&root)?;
        if mode == LoadMode::FromScratch {
            self.gather_includes(&root, resolver)?;
        }
        self.gather_instances(id, root, schema)?;
        self.hashes.include_paths = self.include_path_hash();
        self.last_load = Some(mode);
        if !self.reloaded_for_inheritance {
            self.state = DocumentState::Loaded;
        }
        Ok(())
    }

    fn gather_tags(&mut self, root: &Element) {
        for tags in root.elements().filter(|e| e.name == TAGS) {
            self.tags
                .extend(tags.text().split_whitespace().map(str::to_string));
            for tag in tags.elements() {
                match tag.attr("name") {
                    Some(name) => self.tags.push(name.trim().to_string()),
                    None => self.tags.push(tag.text().trim().to_string()),
                }
            }
        }
        self.tags.retain(|t| !t.is_empty());
    }

    fn gather_defines(&mut self, root: &Element) -> BuildResult<()> {
        for defines in root.elements().filter(|e| e.name == DEFINES) {
            for define in defines.elements().filter(|e| e.name == DEFINE) {
                let Some(name) = define.attr("name") else {
                    return Err(BuildError::new(
                        ErrorCode::XmlFormattingError,
                        format!(
                            "Define without a name in file://{}",
                            self.source_path.display()
                        ),
                    ));
                };
                let value = define
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| define.text());
                let is_override = define
                    .attr("override")
                    .is_some_and(|v| matches!(v.trim(), "true" | "1"));
                if self.self_defines.iter().any(|d| d.name == name) {
                    return Err(BuildError::new(
                        ErrorCode::DuplicateDefine,
                        format!(
                            "Definition {name} is defined twice in {}",
                            self.source_path.display()
                        ),
                    ));
                }
                self.self_defines
                    .push(Definition::new(name, value, is_override, &self.source_path));
            }
        }
        Ok(())
    }

    fn gather_includes(&mut self, root: &Element, resolver: &PathResolver) -> BuildResult<()> {
        for includes in root.elements().filter(|e| e.name == INCLUDES) {
            for include in includes.elements().filter(|e| e.name == INCLUDE) {
                let Some(source) = include.attr("source") else {
                    return Err(BuildError::new(
                        ErrorCode::XmlFormattingError,
                        format!(
                            "Include without a source attribute in file://{}",
                            self.source_path.display()
                        ),
                    ));
                };
                let kind: InclusionType = include.attr("type").unwrap_or("all").parse()?;
                let physical = resolver.resolve(&self.source_directory, source)?;
                self.inclusions
                    .push(InclusionItem::new(source.trim(), physical, kind));
            }
        }
        Ok(())
    }

    fn gather_instances(&mut self, id: DocId, root: Element, schema: &SchemaSet) -> BuildResult<()> {
        for node in root.children {
            let bab_xml::Node::Element(mut xml) = node else {
                continue;
            };
            if matches!(xml.name.as_str(), INCLUDES | DEFINES | TAGS) {
                continue;
            }
            let Some(instance_id) = xml.attr("id").map(str::to_string) else {
                return Err(BuildError::new(
                    ErrorCode::NoIdAttributeForAsset,
                    format!(
                        "Node of type {} in file://{} has no id attribute",
                        xml.name,
                        self.source_path.display()
                    ),
                ));
            };
            let inherit_from = match xml.remove_attr(INHERIT_FROM) {
                Some(value) if value.contains(':') => Some(InstanceHandle::parse(value.trim())?),
                Some(value) => Some(InstanceHandle::new(xml.name.clone(), value.trim())),
                None => None,
            };
            let handle = InstanceHandle::new(xml.name.clone(), instance_id);

            // Only the annotations are needed here; overrides may be partial.
            let _ = schema.validate_instance(&mut xml);

            let slot = self.instances.len();
            let added = self.self_set.try_add(
                handle.clone(),
                InstanceRef {
                    doc: id,
                    slot: Slot::Own(slot),
                },
            );
            if !added {
                return Err(self.duplicate_instance(&handle));
            }
            let mut inst = InstanceDeclaration::new(handle, id, xml);
            inst.inherit_from = inherit_from;
            self.instances.push(inst);
        }
        Ok(())
    }

    fn duplicate_instance(&self, handle: &InstanceHandle) -> BuildError {
        let path = self.source_path.display();
        let existing = self
            .self_set
            .get(handle)
            .and_then(|r| self.instance(r.slot))
            .map(|i| i.handle.name());
        let message = match existing {
            Some(existing) if existing != handle.name() => {
                format!("Duplicate Instance: {} (other is {existing})", handle.name())
            }
            _ => format!("Duplicate Instance: {}, in {path} and {path}", handle.name()),
        };
        BuildError::new(ErrorCode::DuplicateInstance, message)
    }

    /// Hash of the resolved inclusion paths.
    pub fn include_path_hash(&self) -> u32 {
        let mut bytes = Vec::with_capacity(self.inclusions.len() * 4);
        for inc in &self.inclusions {
            bytes.extend_from_slice(&hash_text_lower(&inc.physical_path.to_string_lossy()).to_le_bytes());
        }
        fast_hash(&bytes)
    }

    /// Combined content hash of the dependent files.
    pub fn dependent_file_hash(
        &self,
        file_hash: &mut dyn FnMut(&Path) -> BuildResult<u32>,
    ) -> BuildResult<u32> {
        let mut bytes = Vec::with_capacity(self.dependent_files.len() * 4);
        for file in &self.dependent_files {
            bytes.extend_from_slice(&file_hash(file)?.to_le_bytes());
        }
        Ok(fast_hash(&bytes))
    }

    /// Ends processing. Instance XML is released.
    pub fn complete(&mut self) {
        for inst in &mut self.instances {
            inst.complete();
        }
        self.reloaded_for_inheritance = false;
        self.state = DocumentState::Complete;
    }

    /// Parses the source again to give cached instances their XML back.
    ///
    /// Instance metadata is kept. Prevalidation hashes are cleared so that the
    /// instances are merged again before they serve as inheritance sources.
    pub fn reload_xml(&mut self, schema: &SchemaSet) -> BuildResult<()> {
        tracing::info!(
            reason = "Inheritance source",
            "reloading file://{}",
            self.source_path.display()
        );
        let root = bab_xml::parse_file(&self.source_path)
            .map_err(|e| error::from_xml_in(&self.source_path, e))?;
        for node in root.children {
            let bab_xml::Node::Element(mut xml) = node else {
                continue;
            };
            if matches!(xml.name.as_str(), INCLUDES | DEFINES | TAGS) {
                continue;
            }
            let Some(instance_id) = xml.attr("id").map(str::to_string) else {
                continue;
            };
            let handle = InstanceHandle::new(xml.name.clone(), instance_id);
            let Some(r) = self.self_set.get(&handle) else {
                continue;
            };
            xml.remove_attr(INHERIT_FROM);
            let _ = schema.validate_instance(&mut xml);
            if let Some(inst) = self.instance_mut(r.slot) {
                inst.set_xml(xml);
                inst.prevalidation_xml_hash = 0;
            }
        }
        self.reloaded_for_inheritance = true;
        Ok(())
    }

    /// Releases a document that was loaded only to serve as an inheritance source.
    pub fn reset(&mut self) {
        if self.reloaded_for_inheritance {
            let complete = self.state == DocumentState::Complete;
            for inst in &mut self.instances {
                inst.drop_xml();
                if complete {
                    inst.complete();
                }
            }
            self.reloaded_for_inheritance = false;
        }
    }

    /// Records that `stream` consumed the document.
    pub fn add_stream_hint(&mut self, stream: &str) {
        if !self.stream_hints.iter().any(|s| s == stream) {
            self.stream_hints.push(stream.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaId;
    use bab_config::PathSettings;

    const XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="BaseAssetType">
    <xs:attribute name="id" type="xs:string" use="required"/>
  </xs:complexType>
  <xs:complexType name="Thing">
    <xs:complexContent>
      <xs:extension base="BaseAssetType">
        <xs:attribute name="size" type="xs:int"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="Thing" type="Thing"/>
</xs:schema>"#;

    fn load(text: &str) -> BuildResult<Document> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.xml"), "<AssetDeclaration/>").unwrap();
        let path = dir.path().join("doc.xml");
        std::fs::write(&path, text).unwrap();
        let schema = SchemaSet::parse(XSD).unwrap();
        let resolver = PathResolver::new(&PathSettings::default(), "");
        let mut doc = Document::new(path.clone(), path.to_string_lossy(), "");
        doc.load(DocId::from_raw(0), &schema, &resolver, LoadMode::FromScratch, "test")?;
        Ok(doc)
    }

    #[test]
    fn gathers_every_section() {
        let doc = load(
            r#"<AssetDeclaration xmlns="uri:ea.com:eala:asset">
                 <Tags>alpha beta</Tags>
                 <Defines><Define name="Size" value="=3*2"/></Defines>
                 <Includes><Include type="instance" source="other.xml"/></Includes>
                 <Thing id="a" size="1" inheritFrom="b"/>
                 <Thing id="b"/>
               </AssetDeclaration>"#,
        )
        .unwrap();
        assert_eq!(doc.state, DocumentState::Loaded);
        assert_eq!(doc.tags, ["alpha", "beta"]);
        assert_eq!(doc.self_defines[0].original_value.as_deref(), Some("=3*2"));
        assert_eq!(doc.inclusions.len(), 1);
        assert_eq!(doc.inclusions[0].kind, InclusionType::Instance);
        assert!(doc.inclusions[0].physical_path.ends_with("other.xml"));
        assert_eq!(doc.instances.len(), 2);
        let a = &doc.instances[0];
        assert_eq!(a.inherit_from, Some(InstanceHandle::new("Thing", "b")));
        assert!(a.xml().unwrap().attr("inheritFrom").is_none());
        assert_eq!(a.xml().unwrap().schema_type(), Some("Thing"));
        assert_eq!(doc.self_set.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let err = load(r#"<AssetDeclaration><Thing id="a"/><Thing id="a"/></AssetDeclaration>"#)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateInstance);
        assert!(err.message.starts_with("Duplicate Instance: Thing:a, in "));
    }

    #[test]
    fn ids_differing_in_case_are_one_identity() {
        let err = load(r#"<AssetDeclaration><Thing id="Foo"/><Thing id="FOO"/></AssetDeclaration>"#)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateInstance);
        assert_eq!(err.message, "Duplicate Instance: Thing:FOO (other is Thing:Foo)");
    }

    #[test]
    fn missing_id_and_bad_include() {
        let err = load(r#"<AssetDeclaration><Thing size="1"/></AssetDeclaration>"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoIdAttributeForAsset);
        let err = load(
            r#"<AssetDeclaration><Includes><Include type="all" source="x:y.xml"/></Includes></AssetDeclaration>"#,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::IllegalPathAlias);
        let err = load(
            r#"<AssetDeclaration><Includes><Include type="merge" source="other.xml"/></Includes></AssetDeclaration>"#,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::XmlFormattingError);
    }

    #[test]
    fn snapshot_restores_shallow_document() {
        let mut doc = load(
            r#"<AssetDeclaration><Defines><Define name="N" value="v"/></Defines><Thing id="a"/></AssetDeclaration>"#,
        )
        .unwrap();
        doc.self_defines[0].evaluated_value = Some("v".to_string());
        doc.instances[0].handle.instance_hash = 9;
        doc.hashes.document = 77;
        doc.complete();
        let restored = Document::from_snapshot(DocId::from_raw(3), doc.make_cacheable());
        assert_eq!(restored.state, DocumentState::Shallow);
        assert_eq!(restored.hashes.document, 77);
        assert_eq!(restored.last_hashes.document, 77);
        assert_eq!(restored.self_defines[0].source, restored.source_path);
        assert_eq!(restored.instances[0].handle.instance_hash, 9);
        assert_eq!(
            restored.self_set.get(&InstanceHandle::new("Thing", "a")),
            Some(InstanceRef {
                doc: DocId::from_raw(3),
                slot: Slot::Own(0)
            })
        );
    }

    #[test]
    fn reload_restores_xml_of_cached_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        std::fs::write(
            &path,
            r#"<AssetDeclaration><Thing id="a" size="2"/><Thing id="b" inheritFrom="a"/></AssetDeclaration>"#,
        )
        .unwrap();
        let schema = SchemaSet::parse(XSD).unwrap();
        let resolver = PathResolver::new(&PathSettings::default(), "");
        let mut doc = Document::new(path.clone(), "doc.xml", "");
        doc.load(DocId::from_raw(0), &schema, &resolver, LoadMode::FromScratch, "test")
            .unwrap();
        doc.instances[0].prevalidation_xml_hash = 5;
        let mut cached = Document::from_snapshot(DocId::from_raw(0), doc.make_cacheable());
        assert!(cached.instances[0].xml().is_none());

        cached.reload_xml(&schema).unwrap();
        assert!(cached.is_loaded());
        assert_eq!(cached.state, DocumentState::Shallow);
        assert_eq!(cached.instances[0].xml().unwrap().attr("size"), Some("2"));
        assert_eq!(cached.instances[0].prevalidation_xml_hash, 0);
        assert!(cached.instances[1].xml().unwrap().attr("inheritFrom").is_none());
        assert_eq!(cached.instances[1].inherit_from, Some(InstanceHandle::new("Thing", "a")));

        cached.reset();
        assert!(!cached.is_loaded());
        assert!(cached.instances[0].xml().is_none());
    }

    #[test]
    fn include_path_hash_tracks_paths() {
        let mut doc = Document::new(PathBuf::from("/d/a.xml"), "a.xml", "");
        let empty = doc.include_path_hash();
        doc.inclusions.push(InclusionItem::new(
            "b.xml",
            PathBuf::from("/d/b.xml"),
            InclusionType::All,
        ));
        let one = doc.include_path_hash();
        assert_ne!(empty, one);
        doc.inclusions[0].physical_path = PathBuf::from("/D/B.XML");
        assert_eq!(doc.include_path_hash(), one);
    }
}
