//! Processing of one document.
//!
//! A document is processed in phases. It is first brought up to date, either
//! by loading it or by checking a cached snapshot against the file system. Its
//! inclusions are then processed recursively and routed into its scopes. Next come
//! its definitions. If it was loaded, every instance is merged, validated and
//! compiled. A document that generates a stream finally computes its output
//! closure and commits it.

use crate::arena::{ArenaId, DocId};
use crate::asset::AssetLocation;
use crate::compile::effective_type_hash;
use crate::document::{Document, DocumentState, LoadMode};
use crate::error;
use crate::inclusion::{InclusionItem, InclusionType};
use crate::instance::{InstanceDeclaration, InstanceRef, Slot};
use crate::instance_set::InstanceSet;
use crate::manifest::Manifest;
use crate::output::OutputManager;
use crate::session::BuildSession;
use bab_common::{BuildError, BuildResult, ErrorCode, InstanceHandle};
use std::path::{Path, PathBuf};

impl BuildSession {
    /// The arena entry of `path`, rehydrated from the session cache when possible.
    pub(crate) fn open_document(&mut self, path: &Path, logical: &str) -> DocId {
        let key = self.doc_key(path);
        if let Some(&id) = self.doc_index.get(&key) {
            return id;
        }
        let configuration = self.settings.build.configuration.clone();
        let platform = self.settings.build.target_platform;
        let id = DocId::from_raw(self.documents.len() as u32);
        let doc = match self.cache.take_document(path, &configuration, platform) {
            Some(snapshot) => Document::from_snapshot(id, snapshot),
            None => Document::new(path.to_path_buf(), logical, &configuration),
        };
        let id = self.documents.alloc(doc);
        self.doc_index.insert(key, id);
        id
    }

    /// Processes the document at `path`.
    ///
    /// `parent_om` is the stream the document's instances are compiled for when it
    /// does not generate one itself.
    pub(crate) fn process_document(
        &mut self,
        path: &Path,
        logical: &str,
        parent_om: Option<&mut OutputManager>,
        generate: bool,
    ) -> BuildResult<DocId> {
        let id = self.open_document(path, logical);
        if self.documents[id].processing {
            let chain: Vec<String> = self
                .processing_stack
                .iter()
                .skip_while(|d| **d != id)
                .map(|d| self.documents[*d].source_path.display().to_string())
                .chain(std::iter::once(path.display().to_string()))
                .collect();
            return Err(BuildError::new(
                ErrorCode::CircularDependency,
                format!("Circular inclusion: {}", chain.join(" -> ")),
            ));
        }
        self.documents[id].processing = true;
        self.processing_stack.push(id);
        let result = self.process_document_contents(id, parent_om, generate);
        self.processing_stack.pop();
        self.documents[id].processing = false;
        result.map(|()| id)
    }

    fn process_document_contents(
        &mut self,
        id: DocId,
        mut parent_om: Option<&mut OutputManager>,
        generate: bool,
    ) -> BuildResult<()> {
        let path = self.documents[id].source_path.clone();
        if !path.is_file() {
            return Err(BuildError::new(
                ErrorCode::FileNotFound,
                format!("File not found: file://{}", path.display()),
            ));
        }

        if self.documents[id].state == DocumentState::Complete {
            if generate {
                return Ok(());
            }
            let Some(om) = parent_om.as_deref_mut() else {
                return Ok(());
            };
            self.documents[id].add_stream_hint(om.stream());
            if self.outputs_available(id, om) {
                return Ok(());
            }
            self.load_document(id, LoadMode::FromScratch, "Output missing for another stream")?;
        }

        let mut own_om = if generate {
            Some(OutputManager::new(&path, &self.settings, &self.resolver)?)
        } else {
            None
        };
        self.prepare_document(id, own_om.as_mut().or(parent_om))?;
        if let Some(om) = own_om.as_mut() {
            self.generate_output(id, om)?;
        }
        self.finish_document(id)
    }

    fn prepare_document(&mut self, id: DocId, mut om: Option<&mut OutputManager>) -> BuildResult<()> {
        match self.documents[id].state {
            DocumentState::None => self.load_document(id, LoadMode::FromScratch, "New document")?,
            DocumentState::Shallow => self.reinitialize(id, om.as_deref_mut())?,
            DocumentState::Loaded | DocumentState::Complete => {}
        }
        if let Some(om) = om.as_deref() {
            self.documents[id].add_stream_hint(om.stream());
        }
        self.process_inclusions(id, om.as_deref_mut())?;
        self.process_defines(id)?;
        if self.documents[id].state == DocumentState::Loaded {
            self.process_instances(id, om)?;
        }
        Ok(())
    }

    pub(crate) fn load_document(&mut self, id: DocId, mode: LoadMode, reason: &str) -> BuildResult<()> {
        let configuration = self.settings.build.configuration.clone();
        let platform = self.settings.build.target_platform;
        let doc = &mut self.documents[id];
        doc.load(id, &self.schema, &self.resolver, mode, reason)?;
        doc.hashes.document = self
            .cache
            .file(&doc.source_path, &configuration, platform)
            .hash_item
            .hash()
            .map_err(error::from_cache)?;
        self.counters.files_parsed += 1;
        Ok(())
    }

    fn reinitialize(&mut self, id: DocId, om: Option<&mut OutputManager>) -> BuildResult<()> {
        match self.reload_reason(id, om)? {
            Some(reason) => self.load_document(id, LoadMode::FromScratch, reason),
            None => {
                self.refresh_include_paths(id)?;
                self.counters.documents_reused += 1;
                tracing::debug!(
                    "reusing cached file://{}",
                    self.documents[id].source_path.display()
                );
                Ok(())
            }
        }
    }

    /// Why a cached document must be loaded again, if it must.
    fn reload_reason(
        &mut self,
        id: DocId,
        om: Option<&mut OutputManager>,
    ) -> BuildResult<Option<&'static str>> {
        let configuration = self.settings.build.configuration.clone();
        let platform = self.settings.build.target_platform;
        let doc = &mut self.documents[id];
        let cache = &mut self.cache;

        doc.hashes.document = cache
            .file(&doc.source_path, &configuration, platform)
            .hash_item
            .hash()
            .map_err(error::from_cache)?;
        if doc.hashes.document != doc.last_hashes.document {
            return Ok(Some("Content changed"));
        }
        doc.hashes.dependent_files = doc.dependent_file_hash(&mut |file| {
            cache
                .file(file, &configuration, platform)
                .hash_item
                .hash()
                .map_err(error::from_cache)
        })?;
        if doc.hashes.dependent_files != doc.last_hashes.dependent_files {
            return Ok(Some("Dependent files changed"));
        }
        for inst in &doc.instances {
            let info = self.plugins.type_info(&inst.handle);
            if inst.handle.type_hash != effective_type_hash(&info, &self.schema, inst.handle.type_name()) {
                return Ok(Some("Type changed"));
            }
            if inst.processing_hash != info.processing_hash {
                return Ok(Some("Asset compiler changed"));
            }
        }
        if let Some(om) = om {
            let ctx = self.store.context();
            for inst in &doc.instances {
                let use_build_cache = self.plugins.type_info(&inst.handle).use_build_cache;
                let asset = om.asset(&inst.handle, inst.has_custom_data, use_build_cache);
                if asset
                    .location(AssetLocation::ALL, false, false, &ctx)
                    .is_empty()
                {
                    return Ok(Some("Output missing"));
                }
            }
        }
        Ok(None)
    }

    fn refresh_include_paths(&mut self, id: DocId) -> BuildResult<()> {
        let doc = &mut self.documents[id];
        let resolved: Vec<PathBuf> = doc
            .inclusions
            .iter()
            .map(|inc| self.resolver.resolve(&doc.source_directory, &inc.logical_path))
            .collect::<BuildResult<_>>()?;
        for (inc, physical) in doc.inclusions.iter_mut().zip(resolved) {
            inc.physical_path = physical;
        }
        doc.hashes.include_paths = doc.include_path_hash();
        if doc.hashes.include_paths != doc.last_hashes.include_paths {
            tracing::debug!(
                "include paths of file://{} moved",
                doc.source_path.display()
            );
        }
        Ok(())
    }

    /// Whether every own instance of a completed document has output for `om`.
    fn outputs_available(&self, id: DocId, om: &mut OutputManager) -> bool {
        let ctx = self.store.context();
        self.documents[id].instances.iter().all(|inst| {
            let use_build_cache = self.plugins.type_info(&inst.handle).use_build_cache;
            !om.asset(&inst.handle, inst.has_custom_data, use_build_cache)
                .location(AssetLocation::ALL, false, false, &ctx)
                .is_empty()
        })
    }

    fn process_inclusions(&mut self, id: DocId, mut om: Option<&mut OutputManager>) -> BuildResult<()> {
        self.documents[id].reset_scopes();
        let inclusions = self.documents[id].inclusions.clone();
        for (index, inc) in inclusions.iter().enumerate() {
            let child = match inc.kind {
                InclusionType::Reference => match self.load_precompiled(inc)? {
                    Some(child) => child,
                    None => self.process_document(&inc.physical_path, &inc.logical_path, None, true)?,
                },
                InclusionType::Instance | InclusionType::All => self.process_document(
                    &inc.physical_path,
                    &inc.logical_path,
                    om.as_deref_mut(),
                    false,
                )?,
            };
            self.documents[id].inclusions[index].document = Some(child);
            self.route_inclusion(id, child, inc.kind)?;
        }

        // Instances that also arrive through a reference belong to the other stream.
        let doc = &mut self.documents[id];
        let reference = std::mem::take(&mut doc.reference);
        let shadowed = |h: &InstanceHandle, r: &InstanceRef| reference.get(h).is_some_and(|x| x.doc == r.doc);
        doc.all.retain(|h, r| !shadowed(h, r));
        doc.tentative.retain(|h, r| !shadowed(h, r));
        doc.reference = reference;
        Ok(())
    }

    fn route_inclusion(&mut self, id: DocId, child: DocId, kind: InclusionType) -> BuildResult<()> {
        let child_doc = &self.documents[child];
        let merged = child_doc.merged.clone();
        let tentative = child_doc.tentative.clone();
        let reference = child_doc.reference.clone();
        let defines = child_doc.all_defines.clone();

        match kind {
            InclusionType::Reference => {
                let doc = &mut self.documents[id];
                doc.reference.add_all(&reference);
                doc.reference.add_all(&merged);
            }
            InclusionType::All => {
                self.add_to_all(id, &merged)?;
                let doc = &mut self.documents[id];
                doc.tentative.add_all(&tentative);
                doc.reference.add_all(&reference);
            }
            InclusionType::Instance => {
                let doc = &mut self.documents[id];
                doc.tentative.add_all(&merged);
                doc.tentative.add_all(&tentative);
                doc.reference.add_all(&reference);
            }
        }
        self.documents[id].all_defines.merge(&defines)
    }

    fn add_to_all(&mut self, id: DocId, incoming: &InstanceSet) -> BuildResult<()> {
        for (handle, r) in incoming.iter() {
            match self.documents[id].all.get(handle) {
                Some(existing) if existing != r => {
                    return Err(self.duplicate_across(handle, existing, r));
                }
                Some(_) => {}
                None => {
                    self.documents[id].all.try_add(handle.clone(), r);
                }
            }
        }
        Ok(())
    }

    fn duplicate_across(&self, handle: &InstanceHandle, a: InstanceRef, b: InstanceRef) -> BuildError {
        BuildError::new(
            ErrorCode::DuplicateInstance,
            format!(
                "Duplicate Instance: {}, in {} and {}",
                handle.name(),
                self.documents[a.doc].source_path.display(),
                self.documents[b.doc].source_path.display()
            ),
        )
    }

    /// Serves a `Reference` inclusion from the manifest it produced earlier.
    fn load_precompiled(&mut self, inc: &InclusionItem) -> BuildResult<Option<DocId>> {
        let build = &self.settings.build;
        let name = OutputManager::stream_name(&inc.physical_path, &self.settings, &self.resolver);
        let eligible = build.use_precompiled
            || (build.stream_hints
                && self.cache.is_warm()
                && !self.cache.is_stream_dirty(&name.to_lowercase()));
        if !eligible {
            return Ok(None);
        }
        let manifest_path = self
            .settings
            .paths
            .output_directory
            .join(format!("{name}.manifest"));
        if !manifest_path.is_file() {
            return Ok(None);
        }
        let manifest = match Manifest::load(&manifest_path, self.store.big_endian) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("Not using precompiled stream: {e}");
                return Ok(None);
            }
        };
        if let Err(e) = manifest.check_compatible(
            &manifest_path,
            build.linked_streams,
            self.plugins.all_types_hash(),
        ) {
            tracing::warn!("Not using precompiled stream: {e}");
            return Ok(None);
        }

        let id = self.open_document(&inc.physical_path, &inc.logical_path);
        let doc = &mut self.documents[id];
        if doc.processing || doc.state == DocumentState::Complete {
            // Either a cycle the regular path reports, or already built this session.
            return Ok(if doc.processing { None } else { Some(id) });
        }
        doc.precompiled.clear();
        doc.reset_scopes();
        for i in 0..manifest.entries.len() {
            let Some(handle) = manifest.entry_handle(i) else {
                continue;
            };
            self.resident.insert(handle.file_base());
            let slot = Slot::Precompiled(doc.precompiled.len());
            doc.precompiled
                .push(InstanceDeclaration::precompiled(handle.clone(), id));
            doc.merged.try_add(handle, InstanceRef { doc: id, slot });
        }
        tracing::info!(
            manifest = %manifest_path.display(),
            assets = doc.precompiled.len(),
            "using precompiled stream"
        );
        Ok(Some(id))
    }

    fn process_defines(&mut self, id: DocId) -> BuildResult<()> {
        self.evaluate_defines(id)?;
        if self.documents[id].state == DocumentState::Shallow {
            if let Some(reason) = self.in_place_reason(id) {
                self.load_document(id, LoadMode::InPlace, reason)?;
                self.evaluate_defines(id)?;
            }
        }
        self.merge_scopes(id)
    }

    fn evaluate_defines(&mut self, id: DocId) -> BuildResult<()> {
        let doc = &mut self.documents[id];
        let mut defines = std::mem::take(&mut doc.self_defines);
        let result = doc
            .all_defines
            .evaluate_into(&mut defines, self.evaluator.as_ref());
        doc.self_defines = defines;
        result
    }

    /// Why a cached document must be re-gathered even though its file is unchanged.
    fn in_place_reason(&self, id: DocId) -> Option<&'static str> {
        let doc = &self.documents[id];
        let defines_changed = doc
            .used_defines
            .iter()
            .any(|(name, value)| doc.all_defines.value(name) != Some(value.as_str()));
        if defines_changed {
            return Some("Used definitions changed");
        }
        for (index, inst) in doc.instances.iter().enumerate() {
            let Some(source) = &inst.inherit_from else {
                continue;
            };
            let r = InstanceRef {
                doc: id,
                slot: Slot::Own(index),
            };
            let source_hash = self
                .find_inherit_source(r, source)
                .and_then(|s| self.decl(s))
                .map(|s| s.prevalidation_xml_hash);
            if source_hash.ok() != Some(inst.inherit_from_xml_hash) {
                return Some("inheritFrom source changed");
            }
        }
        None
    }

    fn merge_scopes(&mut self, id: DocId) -> BuildResult<()> {
        let doc = &self.documents[id];
        let conflict = doc.all.iter().find_map(|(handle, r)| {
            doc.self_set
                .get(handle)
                .filter(|own| *own != r)
                .map(|own| (handle.clone(), own, r))
        });
        if let Some((handle, own, other)) = conflict {
            return Err(self.duplicate_across(&handle, own, other));
        }
        let doc = &mut self.documents[id];
        let mut merged = doc.self_set.clone();
        merged.add_all(&doc.all);
        doc.merged = merged;
        Ok(())
    }

    fn finish_document(&mut self, id: DocId) -> BuildResult<()> {
        let configuration = self.settings.build.configuration.clone();
        let platform = self.settings.build.target_platform;
        let doc = &mut self.documents[id];
        let cache = &mut self.cache;
        doc.hashes.include_paths = doc.include_path_hash();
        doc.hashes.dependent_files = doc.dependent_file_hash(&mut |file| {
            cache
                .file(file, &configuration, platform)
                .hash_item
                .hash()
                .map_err(error::from_cache)
        })?;
        doc.complete();
        for other in std::mem::take(&mut self.reloaded) {
            self.documents[other].reset();
        }
        Ok(())
    }
}
