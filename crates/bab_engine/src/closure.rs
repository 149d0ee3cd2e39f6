//! The output closure of a generating document.
//!
//! Starting from the document's merged instances, strong references are resolved
//! and followed until every instance the stream needs is known. Instances that
//! resolve through a `Reference` inclusion stay in their own stream. Weak
//! references only pull in instances found in the tentative scope.

use crate::arena::DocId;
use crate::asset::WrittenAsset;
use crate::document::Document;
use crate::inclusion::InclusionType;
use crate::instance::{InstanceDeclaration, InstanceRef, Slot};
use crate::ordering::{simple_order, stable_order, OrderItem};
use crate::output::{OutputManager, StreamEntry};
use crate::session::BuildSession;
use bab_common::{BuildError, BuildResult, ErrorCode, InstanceHandle};
use bab_diagnostics::{Diagnostic, DiagnosticCode};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// The scope a reference resolved in, in lookup order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scope {
    Own,
    All,
    Tentative,
    Reference,
}

#[derive(Default)]
struct ClosureWalk {
    stack: Vec<InstanceRef>,
    done: HashSet<InstanceRef>,
    output: Vec<InstanceRef>,
    deferred: Vec<InstanceRef>,
}

struct Resolved {
    handle: InstanceHandle,
    target: InstanceRef,
    scope: Scope,
}

impl BuildSession {
    /// Finds `handle` in the first scope of `doc` that has it.
    fn find_in_scopes(doc: &Document, handle: &InstanceHandle) -> Option<(InstanceRef, Scope)> {
        [
            (Scope::Own, &doc.self_set),
            (Scope::All, &doc.all),
            (Scope::Tentative, &doc.tentative),
            (Scope::Reference, &doc.reference),
        ]
        .into_iter()
        .find_map(|(scope, set)| set.get(handle).map(|r| (r, scope)))
    }

    /// Resolves `reference` in the scopes of `doc`.
    ///
    /// An exact match in any scope wins. Otherwise a reference to a type with
    /// derived types matches instances of those types, and more than one such
    /// match is an error.
    pub(crate) fn lookup_reference(
        &self,
        doc: &Document,
        reference: &InstanceHandle,
    ) -> BuildResult<Option<(InstanceRef, Scope)>> {
        if let Some(found) = Self::find_in_scopes(doc, reference) {
            return Ok(Some(found));
        }
        let Some(derived) = self.schema.derived_types(reference.type_name()) else {
            return Ok(None);
        };
        let matches: Vec<(InstanceHandle, (InstanceRef, Scope))> = derived
            .iter()
            .map(|t| InstanceHandle::new(t.as_str(), reference.instance_name()))
            .filter_map(|candidate| {
                Self::find_in_scopes(doc, &candidate).map(|found| (candidate, found))
            })
            .collect();
        if matches.len() > 1 {
            let names: Vec<String> = matches
                .iter()
                .map(|(handle, _)| format!("'{}'", handle.name()))
                .collect();
            return Err(BuildError::new(
                ErrorCode::ReferencingError,
                format!(
                    "Reference {} is ambiguous. Possible matches: {} (file://{})",
                    reference.name(),
                    names.join(", "),
                    doc.source_path.display()
                ),
            ));
        }
        Ok(matches.into_iter().next().map(|(_, found)| found))
    }

    fn resolve_references(&mut self, r: InstanceRef, weak: bool) -> BuildResult<Vec<Resolved>> {
        let inst = self.decl(r)?;
        let doc = &self.documents[r.doc];
        let references = if weak {
            &inst.weak_referenced
        } else {
            &inst.referenced
        };
        let mut resolved = Vec::with_capacity(references.len());
        let mut missing = Vec::new();
        for reference in references {
            match self.lookup_reference(doc, reference)? {
                Some((target, scope)) => resolved.push(Resolved {
                    handle: self.decl(target)?.handle.clone(),
                    target,
                    scope,
                }),
                None if weak => {
                    tracing::debug!(
                        "weak reference {} of {} not found",
                        reference.name(),
                        inst.handle.name()
                    );
                }
                None => missing.push(reference.clone()),
            }
        }
        if !missing.is_empty() {
            let owner = inst.handle.name();
            let source = doc.source_path.clone();
            for reference in missing {
                self.report_unknown(&reference, &owner, &source)?;
            }
        }
        Ok(resolved)
    }

    fn report_unknown(&mut self, reference: &InstanceHandle, owner: &str, source: &Path) -> BuildResult<()> {
        let message = format!(
            "Unknown reference {} in {owner} (file://{})",
            reference.name(),
            source.display()
        );
        if self.settings.build.error_level > 0 {
            return Err(BuildError::new(ErrorCode::UnknownReference, message));
        }
        if self.missing_references.insert(reference.name()) {
            tracing::warn!("{message}");
            self.plugins.diagnostics().emit(
                Diagnostic::warning(DiagnosticCode::UNKNOWN_REFERENCE, message)
                    .with_origin(source, Some(owner.to_string())),
            );
        }
        Ok(())
    }

    fn visit(&mut self, r: InstanceRef, walk: &mut ClosureWalk) -> BuildResult<()> {
        if walk.done.contains(&r) {
            return Ok(());
        }
        if walk.stack.contains(&r) {
            let from = walk.stack.last().copied().unwrap_or(r);
            return Err(BuildError::new(
                ErrorCode::CircularDependency,
                format!(
                    "Circular dependency detected between {} and {}",
                    self.decl(from)?.handle.name(),
                    self.decl(r)?.handle.name()
                ),
            ));
        }
        if matches!(r.slot, Slot::Precompiled(_)) {
            walk.done.insert(r);
            return Ok(());
        }
        walk.stack.push(r);

        let strong = self.resolve_references(r, false)?;
        let weak = self.resolve_references(r, true)?;
        let mut validated = Vec::with_capacity(strong.len());
        let mut dependencies = Vec::new();
        let mut dependents = BTreeSet::new();
        for resolved in strong {
            validated.push(resolved.handle);
            if resolved.scope == Scope::Reference || matches!(resolved.target.slot, Slot::Precompiled(_)) {
                continue;
            }
            self.visit(resolved.target, walk)?;
            let dependency = self.decl(resolved.target)?;
            dependents.insert(dependency.handle.clone());
            dependents.extend(dependency.all_dependents.iter().cloned());
            dependencies.push(resolved.target);
        }
        walk.deferred.extend(
            weak.into_iter()
                .filter(|w| w.scope == Scope::Tentative)
                .map(|w| w.target),
        );

        let inst = self.decl_mut(r)?;
        inst.validated_referenced = Some(validated);
        inst.output_dependencies = dependencies;
        inst.all_dependents = dependents;
        walk.stack.pop();
        walk.done.insert(r);
        walk.output.push(r);
        Ok(())
    }

    /// Every instance the stream of `id` outputs, dependencies before dependents
    /// in discovery order.
    fn output_closure(&mut self, id: DocId) -> BuildResult<Vec<InstanceRef>> {
        let roots: Vec<InstanceRef> = self.documents[id].merged.iter().map(|(_, r)| r).collect();
        let mut walk = ClosureWalk::default();
        for r in roots {
            self.visit(r, &mut walk)?;
        }
        while let Some(r) = walk.deferred.pop() {
            self.visit(r, &mut walk)?;
        }
        Ok(walk.output)
    }

    /// Computes, orders and commits the stream generated by `id`.
    pub(crate) fn generate_output(&mut self, id: DocId, om: &mut OutputManager) -> BuildResult<()> {
        let output = self.output_closure(id)?;

        let decls: Vec<&InstanceDeclaration> = output
            .iter()
            .map(|r| self.decl(*r))
            .collect::<BuildResult<_>>()?;
        let items: Vec<OrderItem<'_>> = decls
            .iter()
            .map(|d| OrderItem {
                handle: &d.handle,
                dependents: &d.all_dependents,
                dependency_count: self.schema.asset_dependency_count(d.handle.type_name()),
            })
            .collect();
        let order = if self.settings.build.stable_sort {
            stable_order(&items, om.base_order())?
        } else {
            simple_order(&items)?
        };

        let mut entries = Vec::with_capacity(order.len());
        for i in order {
            let decl = decls[i];
            if self.failed.contains(&decl.handle) {
                self.plugins.diagnostics().emit(
                    Diagnostic::warning(
                        DiagnosticCode::DISCARDED_OUTPUT,
                        format!("{} has no compiled output and is left out of the stream", decl.handle.name()),
                    )
                    .with_origin(self.documents[output[i].doc].source_path.as_path(), Some(decl.handle.name())),
                );
                continue;
            }
            let info = self.plugins.type_info(&decl.handle);
            om.asset(&decl.handle, decl.has_custom_data, info.use_build_cache);
            entries.push(StreamEntry {
                handle: decl.handle.clone(),
                source: self.documents[output[i].doc]
                    .source_path
                    .to_string_lossy()
                    .into_owned(),
                references: decl.validated_referenced.clone().unwrap_or_default(),
                tokenized: info.tokenized,
            });
        }

        let referenced_manifests: Vec<String> = self.documents[id]
            .inclusions
            .iter()
            .filter(|inc| inc.kind == InclusionType::Reference)
            .map(|inc| {
                format!(
                    "{}.manifest",
                    OutputManager::stream_name(&inc.physical_path, &self.settings, &self.resolver)
                )
            })
            .collect();
        let fresh = entries
            .iter()
            .filter(|e| self.store.last_written.contains_key(&e.handle.file_base()))
            .count();
        let keep: HashSet<String> = self
            .store
            .last_written
            .keys()
            .chain(self.resident.iter())
            .cloned()
            .collect();
        let report = om.commit_stream(
            &entries,
            referenced_manifests,
            self.plugins.all_types_hash(),
            self.settings.build.linked_streams,
            &keep,
            &self.store.context(),
        )?;

        let written = WrittenAsset {
            asset_dir: om.asset_dir().to_path_buf(),
            cdata_dir: om.cdata_dir().to_path_buf(),
        };
        for file_base in &report.written {
            self.store
                .last_written
                .insert(file_base.clone(), written.clone());
        }
        let tier = |name: &str| report.from_tier.get(name).copied().unwrap_or(0);
        self.counters.assets_copied += tier("local") + tier("cache");
        self.counters.assets_reused += (tier("output") + tier("base")).saturating_sub(fresh);
        self.documents[id].hashes.output_checksum = report.checksum;
        tracing::debug!(
            unchanged = report.manifest_unchanged,
            deleted = report.deleted,
            "stream cleanup finished"
        );
        self.last_stream = Some((report.manifest_path, report.checksum));
        Ok(())
    }
}
