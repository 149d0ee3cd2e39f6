//! Per-instance work of a loaded document: inheritance, validation, compilation.

use crate::arena::DocId;
use crate::asset::{AssetLocation, WrittenAsset};
use crate::definition::Lookup;
use crate::document::Document;
use crate::error;
use crate::expression::{DefineLookup, ExpressionEvaluator};
use crate::instance::{InstanceRef, Slot};
use crate::joiner::NodeJoiner;
use crate::output::OutputManager;
use crate::plugin::{CompileInput, ExtendedTypeInfo, PluginContext};
use crate::session::BuildSession;
use bab_common::{fast_hash, BuildError, BuildResult, ErrorCode, InstanceHandle};
use bab_diagnostics::{Diagnostic, DiagnosticCode};
use bab_schema::{SchemaSet, ASSET_REFERENCE, BASE_INHERITABLE_ASSET, FILE_REFERENCE, WEAK_REFERENCE};
use bab_xml::{xml_hash, Element};
use std::time::Instant;

const SOURCE_XML: &str = "SourceXml";

/// The type hash an instance is compiled under.
///
/// Types whose plugin reports no layout hash fall back to the schema fingerprint,
/// so schema edits still invalidate them.
pub(crate) fn effective_type_hash(info: &ExtendedTypeInfo, schema: &SchemaSet, type_name: &str) -> u32 {
    if info.type_hash != 0 {
        info.type_hash
    } else {
        schema.fingerprint(type_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ValueKind {
    Strong,
    Weak,
    File,
    Hashed(String),
}

#[derive(Debug)]
struct ScannedValue {
    kind: ValueKind,
    value: String,
    ref_type: Option<String>,
}

fn classify(schema: &SchemaSet, type_name: &str, hashable: &dyn Fn(&str) -> bool) -> Option<ValueKind> {
    if schema.is_derived_from(type_name, WEAK_REFERENCE) {
        Some(ValueKind::Weak)
    } else if schema.is_derived_from(type_name, ASSET_REFERENCE) {
        Some(ValueKind::Strong)
    } else if schema.is_derived_from(type_name, FILE_REFERENCE) {
        Some(ValueKind::File)
    } else if hashable(type_name) {
        Some(ValueKind::Hashed(type_name.to_string()))
    } else {
        None
    }
}

/// Collects every typed value of `xml` that names an instance, a file or a hashed string.
fn scan_values(xml: &Element, schema: &SchemaSet, hashable: &dyn Fn(&str) -> bool) -> Vec<ScannedValue> {
    let mut found = Vec::new();
    xml.walk(&mut |el| {
        for attr in &el.attributes {
            let Some(info) = &attr.schema else {
                continue;
            };
            if let Some(kind) = classify(schema, &info.type_name, hashable) {
                found.push(ScannedValue {
                    kind,
                    value: attr.value.trim().to_string(),
                    ref_type: info.ref_type.clone(),
                });
            }
        }
        if let Some(info) = &el.schema {
            if el.has_text() && el.elements().next().is_none() {
                if let Some(kind) = classify(schema, &info.type_name, hashable) {
                    found.push(ScannedValue {
                        kind,
                        value: el.text().trim().to_string(),
                        ref_type: info.ref_type.clone(),
                    });
                }
            }
        }
    });
    found.retain(|v| !v.value.is_empty());
    found
}

/// Parses `Name` or `Type:Name`, typing bare names with the schema's `refType`.
fn parse_reference(
    value: &str,
    ref_type: Option<&str>,
    schema: &SchemaSet,
    owner: &InstanceHandle,
) -> BuildResult<InstanceHandle> {
    let mut handle = InstanceHandle::parse(value)?;
    match ref_type {
        Some(expected) if handle.type_name().is_empty() => handle.set_type_name(expected),
        Some(expected) if !schema.is_derived_from(handle.type_name(), expected) => {
            return Err(BuildError::new(
                ErrorCode::ReferencingError,
                format!(
                    "Reference '{value}' in {} must be of type {expected}",
                    owner.name()
                ),
            ));
        }
        None if handle.type_name().is_empty() => {
            return Err(BuildError::new(
                ErrorCode::ReferencingError,
                format!("Reference '{value}' in {} does not name a type", owner.name()),
            ));
        }
        _ => {}
    }
    Ok(handle)
}

/// Replaces every `=expression` attribute value or text of `element`.
fn evaluate_values(
    element: &mut Element,
    evaluator: &dyn ExpressionEvaluator,
    defines: &mut dyn DefineLookup,
) -> BuildResult<()> {
    for attr in &mut element.attributes {
        if let Some(expr) = attr.value.strip_prefix('=') {
            let value = evaluator.evaluate(expr, defines)?;
            attr.value = value;
        }
    }
    if element.has_text() && element.elements().next().is_none() {
        let text = element.text();
        if let Some(expr) = text.trim().strip_prefix('=') {
            let value = evaluator.evaluate(expr, defines)?;
            element.set_text(value);
        }
    }
    Ok(())
}

fn push_unique(list: &mut Vec<InstanceHandle>, handle: InstanceHandle) {
    if !list.contains(&handle) {
        list.push(handle);
    }
}

impl BuildSession {
    /// Merges, validates and compiles every own instance of a loaded document.
    pub(crate) fn process_instances(
        &mut self,
        id: DocId,
        mut om: Option<&mut OutputManager>,
    ) -> BuildResult<()> {
        for index in 0..self.documents[id].instances.len() {
            let r = InstanceRef {
                doc: id,
                slot: Slot::Own(index),
            };
            self.ensure_merged(r, &mut Vec::new())?;
            self.validate(r)?;
            if let Some(om) = om.as_deref_mut() {
                self.compile(r, om)?;
            }
            self.counters.instances_processed += 1;
        }
        Ok(())
    }

    /// Locates the instance `r` inherits from.
    ///
    /// Legal sources are instances of the same document and instances of
    /// documents it includes directly through an `Instance` inclusion. An instance
    /// naming itself overrides the included instance of the same name. Sources
    /// from other documents must be inheritable assets.
    pub(crate) fn find_inherit_source(
        &self,
        r: InstanceRef,
        source: &InstanceHandle,
    ) -> BuildResult<InstanceRef> {
        let doc = &self.documents[r.doc];
        let owner = self.decl(r)?.handle.name();
        let fail = |message: String| {
            BuildError::new(
                ErrorCode::InheritFromError,
                format!("{message} (file://{})", doc.source_path.display()),
            )
        };
        let mut from_self = false;
        let found = if *source == self.decl(r)?.handle {
            doc.tentative.get(source).ok_or_else(|| {
                fail(format!(
                    "{owner} inherits from itself, but no included instance of that name exists"
                ))
            })?
        } else if let Some(own) = doc.self_set.get(source) {
            from_self = true;
            own
        } else if doc.all.contains(source) {
            return Err(fail(format!(
                "Inheritance source {} of {owner} must not come from an 'all' inclusion",
                source.name()
            )));
        } else if let Some(included) = doc.tentative.get(source) {
            included
        } else if doc.reference.contains(source) {
            return Err(fail(format!(
                "Inheritance source {} of {owner} belongs to a referenced stream",
                source.name()
            )));
        } else {
            return Err(fail(format!(
                "Inheritance source {} of {owner} not found",
                source.name()
            )));
        };
        if found.doc != r.doc && !doc.includes_directly(found.doc) {
            return Err(fail(format!(
                "Inheritance source {} of {owner} must be declared in a directly included document",
                source.name()
            )));
        }
        // Instances of the same document are always eligible.
        if !from_self
            && !self
                .schema
                .is_derived_from(source.type_name(), BASE_INHERITABLE_ASSET)
        {
            return Err(fail(format!(
                "Inheritance source {} of {owner} is not an inheritable asset",
                source.name()
            )));
        }
        Ok(found)
    }

    /// Applies the inheritance chain of `r` and records its prevalidation hash.
    fn ensure_merged(&mut self, r: InstanceRef, visiting: &mut Vec<InstanceRef>) -> BuildResult<()> {
        let inst = self.decl(r)?;
        if inst.prevalidation_xml_hash != 0 {
            return Ok(());
        }
        if visiting.contains(&r) {
            return Err(BuildError::new(
                ErrorCode::InheritFromError,
                format!("Circular inheritance involving {}", inst.handle.name()),
            ));
        }
        let source = inst.inherit_from.clone();
        visiting.push(r);

        if let Some(source) = source {
            let source_ref = self.find_inherit_source(r, &source)?;
            if self.decl(source_ref)?.xml().is_none() {
                self.reload_for_inheritance(source_ref.doc)?;
            }
            self.ensure_merged(source_ref, visiting)?;

            let base_decl = self.decl(source_ref)?;
            let source_hash = base_decl.prevalidation_xml_hash;
            let base = base_decl.xml().ok_or_else(|| {
                BuildError::new(
                    ErrorCode::InheritFromError,
                    format!("Inheritance source {} has no XML", source.name()),
                )
            })?;
            let overlay = self
                .decl(r)?
                .xml()
                .ok_or_else(|| BuildError::internal("Instance XML released before merging"))?;
            let doc_path = &self.documents[r.doc].source_path;
            let merged = NodeJoiner::new(&self.schema, doc_path).override_instance(base, overlay)?;

            let inst = self.decl_mut(r)?;
            inst.set_xml(merged);
            inst.inherit_from_xml_hash = source_hash;
        }

        let inst = self.decl_mut(r)?;
        let hash = inst.xml().map_or(0, |xml| xml_hash(0, xml));
        inst.prevalidation_xml_hash = if hash == 0 { 1 } else { hash };
        visiting.pop();
        Ok(())
    }

    fn reload_for_inheritance(&mut self, id: DocId) -> BuildResult<()> {
        self.documents[id].reload_xml(&self.schema)?;
        self.counters.files_parsed += 1;
        if !self.reloaded.contains(&id) {
            self.reloaded.push(id);
        }
        Ok(())
    }

    /// Evaluates, validates and scans the merged XML of `r`, then fills in its hashes.
    fn validate(&mut self, r: InstanceRef) -> BuildResult<()> {
        let Slot::Own(index) = r.slot else {
            return Ok(());
        };
        let Self {
            settings,
            schema,
            plugins,
            evaluator,
            resolver,
            hash_bins,
            cache,
            documents,
            missing_files,
            ..
        } = self;
        let Document {
            source_path,
            source_directory,
            all_defines,
            used_defines,
            dependent_files,
            instances,
            ..
        } = &mut documents[r.doc];
        let inst = instances
            .get_mut(index)
            .ok_or_else(|| BuildError::internal("Dangling instance reference"))?;
        let handle = inst.handle.clone();
        let in_file = |message: String| format!("{} in file://{}: {message}", handle.name(), source_path.display());

        let xml = inst
            .xml_mut()
            .ok_or_else(|| BuildError::internal(format!("{} has no XML to validate", handle.name())))?;
        xml.try_walk_mut(&mut |el| {
            evaluate_values(
                el,
                &**evaluator,
                &mut Lookup::recording(all_defines, used_defines),
            )
        })
        .map_err(|e| BuildError::new(e.code, in_file(e.message)))?;
        schema.validate_instance(xml).map_err(|e| {
            let err = error::from_schema(e);
            BuildError::new(err.code, in_file(err.message))
        })?;

        let xml: &Element = xml;
        let hashable = |t: &str| hash_bins.is_hashable_type(t);
        let scanned = scan_values(xml, schema, &hashable);
        let structure_hash = xml_hash(0, xml);

        let mut referenced = Vec::new();
        let mut weak_referenced = Vec::new();
        let mut files = Vec::new();
        let mut hashed = Vec::new();
        for item in scanned {
            match item.kind {
                ValueKind::Strong => push_unique(
                    &mut referenced,
                    parse_reference(&item.value, item.ref_type.as_deref(), schema, &handle)?,
                ),
                ValueKind::Weak => push_unique(
                    &mut weak_referenced,
                    parse_reference(&item.value, item.ref_type.as_deref(), schema, &handle)?,
                ),
                ValueKind::File => files.push(item.value),
                ValueKind::Hashed(type_name) => hashed.push((type_name, item.value)),
            }
        }
        for (type_name, value) in &hashed {
            hash_bins.record_typed(type_name, value)?;
        }

        let configuration = &settings.build.configuration;
        let platform = settings.build.target_platform;
        let mut file_hashes = Vec::with_capacity(files.len() * 4);
        let mut referenced_files = Vec::with_capacity(files.len());
        for logical in &files {
            let path = resolver.resolve(source_directory, logical)?;
            let item = &mut cache.file(&path, configuration, platform).hash_item;
            if !item.exists() {
                let message = format!(
                    "File {} referenced by {} not found",
                    path.display(),
                    handle.name()
                );
                if settings.build.error_level > 0 {
                    return Err(BuildError::new(ErrorCode::FileNotFound, message));
                }
                if missing_files.insert(path.clone()) {
                    tracing::warn!("{message}");
                    plugins.diagnostics().emit(
                        Diagnostic::warning(DiagnosticCode::MISSING_FILE, message)
                            .with_origin(source_path.as_path(), Some(handle.name())),
                    );
                }
            }
            file_hashes.extend_from_slice(&item.hash().map_err(error::from_cache)?.to_le_bytes());
            dependent_files.insert(path.clone());
            referenced_files.push(path.to_string_lossy().into_owned());
        }

        let info = plugins.type_info(&handle);
        inst.handle.type_hash = effective_type_hash(&info, schema, handle.type_name());
        inst.handle.instance_hash = structure_hash ^ fast_hash(&file_hashes);
        inst.processing_hash = info.processing_hash;
        inst.has_custom_data = info.has_custom_data;
        inst.is_inheritable = schema.is_derived_from(handle.type_name(), BASE_INHERITABLE_ASSET);
        inst.referenced = referenced;
        inst.weak_referenced = weak_referenced;
        inst.referenced_files = referenced_files;
        inst.reset_resolution();

        hash_bins.record_handle(&inst.handle)?;
        for reference in inst.referenced.iter().chain(&inst.weak_referenced) {
            hash_bins.record_handle(reference)?;
        }

        if settings.build.output_intermediate_xml {
            let target = settings
                .paths
                .intermediate_directory()
                .join(format!("FinalXml_{}", platform.name()))
                .join(handle.type_name())
                .join(format!("{}.xml", handle.instance_name()));
            let mut wrapper = Element::new(SOURCE_XML);
            wrapper.set_attr("source", source_path.to_string_lossy());
            if let Some(xml) = inst.xml() {
                wrapper.push(xml.clone());
            }
            let written = match target.parent() {
                Some(dir) => std::fs::create_dir_all(dir).map_err(|e| e.to_string()),
                None => Ok(()),
            }
            .and_then(|()| bab_xml::write_file(&target, &wrapper).map_err(|e| e.to_string()));
            if let Err(e) = written {
                tracing::warn!("Could not write {}: {e}", target.display());
            }
        }
        Ok(())
    }

    /// Compiles `r` for `om` unless its output is already available somewhere, then
    /// materializes it in the output directory.
    fn compile(&mut self, r: InstanceRef, om: &mut OutputManager) -> BuildResult<()> {
        let Slot::Own(index) = r.slot else {
            return Ok(());
        };
        let Self {
            settings,
            plugins,
            verifiers,
            stats,
            store,
            documents,
            failed,
            counters,
            ..
        } = self;
        let doc = &mut documents[r.doc];
        let source = doc.source_path.clone();
        let inst = doc
            .instances
            .get_mut(index)
            .ok_or_else(|| BuildError::internal("Dangling instance reference"))?;
        let info = plugins.type_info(&inst.handle);
        let ctx = store.context();
        let asset = om.asset(&inst.handle, inst.has_custom_data, info.use_build_cache);
        let available = !asset
            .location(AssetLocation::ALL, false, false, &ctx)
            .is_empty();
        if !available && inst.has_custom_data {
            let path = asset.cdata_path();
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
            }
            inst.set_custom_data_path(path);
        }

        let inst = &*inst;
        if !available {
            let xml = inst.xml().ok_or_else(|| {
                BuildError::internal(format!("{} has no XML to compile", inst.handle.name()))
            })?;
            let input = CompileInput {
                handle: &inst.handle,
                xml,
                referenced: &inst.referenced,
                weak_referenced: &inst.weak_referenced,
                referenced_files: &inst.referenced_files,
                custom_data_path: inst.custom_data_path(),
            };
            let pctx = PluginContext {
                platform: settings.build.target_platform,
                big_endian: store.big_endian,
                diagnostics: plugins.diagnostics(),
                source: &source,
            };
            let plugin = plugins.plugin(inst.handle.type_id());
            tracing::debug!(plugin = plugin.name(), "compiling {}", inst.handle.name());
            let started = Instant::now();
            let buffer = match plugin.process(&input, &pctx) {
                Ok(buffer) => buffer,
                Err(e) => {
                    plugins.diagnostics().emit(
                        Diagnostic::error(
                            DiagnosticCode::PLUGIN_FAILED,
                            format!("{} failed to compile: {}", inst.handle.name(), e.message),
                        )
                        .with_origin(source.as_path(), Some(inst.handle.name())),
                    );
                    failed.insert(inst.handle.clone());
                    return Ok(());
                }
            };
            if !verifiers.verify(&input, &pctx) {
                return Err(BuildError::new(
                    ErrorCode::GameDataVerification,
                    format!(
                        "Game data verification failed for {} (file://{})",
                        inst.handle.name(),
                        source.display()
                    ),
                ));
            }
            stats.record(
                inst.handle.type_name(),
                inst.handle.instance_name(),
                started.elapsed(),
            );
            asset.set_buffer(buffer);
            counters.instances_compiled += 1;
        }
        failed.remove(&inst.handle);

        let from = asset.commit(&ctx)?;
        if from == AssetLocation::LOCAL || from == AssetLocation::CACHE {
            counters.assets_copied += 1;
        }
        if from != AssetLocation::BASE_PATCH_STREAM {
            let written = WrittenAsset {
                asset_dir: om.asset_dir().to_path_buf(),
                cdata_dir: om.cdata_dir().to_path_buf(),
            };
            store
                .last_written
                .insert(inst.handle.file_base(), written);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
        <xs:simpleType name="AssetReference"><xs:restriction base="xs:string"/></xs:simpleType>
        <xs:simpleType name="WeakReference"><xs:restriction base="xs:string"/></xs:simpleType>
        <xs:simpleType name="FileReference"><xs:restriction base="xs:string"/></xs:simpleType>
        <xs:complexType name="BaseAssetType"><xs:attribute name="id" type="xs:string"/></xs:complexType>
        <xs:complexType name="Weapon"><xs:complexContent><xs:extension base="BaseAssetType"/></xs:complexContent></xs:complexType>
        <xs:complexType name="Unit"><xs:complexContent><xs:extension base="BaseAssetType">
          <xs:attribute name="weapon" type="AssetReference"/>
          <xs:attribute name="icon" type="FileReference"/>
          <xs:attribute name="buddy" type="WeakReference"/>
        </xs:extension></xs:complexContent></xs:complexType>
        <xs:element name="Unit" type="Unit"/>
      </xs:schema>"#;

    fn scan(text: &str) -> Vec<ScannedValue> {
        let schema = SchemaSet::parse(XSD).unwrap();
        let mut xml = bab_xml::parse_document(text).unwrap();
        let _ = schema.validate_instance(&mut xml);
        scan_values(&xml, &schema, &|_| false)
    }

    #[test]
    fn values_are_classified_by_schema_type() {
        let found = scan(r#"<Unit id="u" weapon="Weapon:gun" icon="art/u.tga" buddy="pal"/>"#);
        let kinds: Vec<_> = found.iter().map(|v| (v.kind.clone(), v.value.as_str())).collect();
        assert_eq!(
            kinds,
            [
                (ValueKind::Strong, "Weapon:gun"),
                (ValueKind::File, "art/u.tga"),
                (ValueKind::Weak, "pal"),
            ]
        );
    }

    #[test]
    fn empty_references_are_skipped() {
        assert!(scan(r#"<Unit id="u" weapon=" "/>"#).is_empty());
    }

    #[test]
    fn bare_reference_takes_ref_type() {
        let schema = SchemaSet::parse(XSD).unwrap();
        let owner = InstanceHandle::new("Unit", "u");
        let h = parse_reference("gun", Some("Weapon"), &schema, &owner).unwrap();
        assert_eq!(h, InstanceHandle::new("Weapon", "gun"));
        assert_eq!(h.type_name(), "Weapon");

        let err = parse_reference("gun", None, &schema, &owner).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferencingError);
        let err = parse_reference("Unit:gun", Some("Weapon"), &schema, &owner).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferencingError);
    }

    #[test]
    fn expressions_replace_values() {
        use crate::definition::{Definition, DefinitionSet};
        use crate::expression::DefaultEvaluator;
        use std::collections::BTreeMap;
        use std::path::Path;

        let mut set = DefinitionSet::new();
        let mut defs = vec![Definition::new("Size", "4", false, Path::new("d.xml"))];
        set.evaluate_into(&mut defs, &DefaultEvaluator).unwrap();
        let mut used = BTreeMap::new();
        let mut xml = bab_xml::parse_document(r#"<Unit id="u" size="=$Size * 2"><Name>=$Size</Name></Unit>"#).unwrap();
        xml.try_walk_mut(&mut |el| evaluate_values(el, &DefaultEvaluator, &mut Lookup::recording(&set, &mut used)))
            .unwrap();
        assert_eq!(xml.attr("size"), Some("8"));
        assert_eq!(xml.child("Name").unwrap().text(), "4");
        assert_eq!(used.get("Size").map(String::as_str), Some("4"));
    }
}
