//! Asset compiler and verifier plugins.
//!
//! The engine never looks inside a compiled asset. Each asset type is served by an
//! [`AssetPlugin`] registered under the type's id; types without a plugin fall back
//! to [`NullPlugin`], which reports a `P001` diagnostic and produces no output.

use bab_common::{fast_hash, BuildResult, InstanceHandle, TargetPlatform};
use bab_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use bab_xml::Element;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// What a plugin knows about one asset type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtendedTypeInfo {
    /// Schema type name.
    pub type_name: String,
    /// Case-sensitive hash of the type name.
    pub type_id: u32,
    /// Hash of the compiled layout. `0` means the type produces no output.
    pub type_hash: u32,
    /// Version stamp of the compiler; a change forces recompilation.
    pub processing_hash: u32,
    /// Whether instances write a side-car `.cdata` file.
    pub has_custom_data: bool,
    /// Whether string tokens in the payload are tokenized.
    pub tokenized: bool,
    /// Whether compiled instances may be shared through the build cache.
    pub use_build_cache: bool,
}

/// The three payload sections of a compiled instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetBuffer {
    /// Instance data.
    pub instance_data: Vec<u8>,
    /// Relocation table.
    pub relocation_data: Vec<u8>,
    /// Import table.
    pub imports_data: Vec<u8>,
}

impl AssetBuffer {
    /// Total payload size in bytes.
    pub fn len(&self) -> usize {
        self.instance_data.len() + self.relocation_data.len() + self.imports_data.len()
    }

    /// Whether all three sections are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The instance a plugin is asked to compile or verify.
pub struct CompileInput<'a> {
    /// Identity of the instance, hashes included.
    pub handle: &'a InstanceHandle,
    /// The final, validated instance XML.
    pub xml: &'a Element,
    /// Strong references in document order.
    pub referenced: &'a [InstanceHandle],
    /// Weak references in document order.
    pub weak_referenced: &'a [InstanceHandle],
    /// Logical paths of referenced files.
    pub referenced_files: &'a [String],
    /// Where the plugin may write custom data, if the type has any.
    pub custom_data_path: Option<&'a Path>,
}

/// Build-wide facts handed to plugins.
pub struct PluginContext<'a> {
    /// Platform being built.
    pub platform: TargetPlatform,
    /// Byte order of the payload.
    pub big_endian: bool,
    /// Where per-instance problems are reported.
    pub diagnostics: &'a DiagnosticSink,
    /// Source document of the instance.
    pub source: &'a Path,
}

/// Compiles instances of the types it is registered for.
pub trait AssetPlugin: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Describes `type_name`.
    fn type_info(&self, type_name: &str, type_id: u32) -> ExtendedTypeInfo;

    /// Hash over every type layout the plugin knows. Stored in manifests.
    fn all_types_hash(&self) -> u32;

    /// Compiler version, folded into the session cache's compiler version.
    fn version(&self) -> u32 {
        0
    }

    /// Compiles one instance.
    fn process(&self, input: &CompileInput<'_>, ctx: &PluginContext<'_>) -> BuildResult<AssetBuffer>;
}

/// Checks game data after compilation.
pub trait VerifierPlugin: Send + Sync {
    /// Returns `false` if the instance must not ship.
    fn verify(&self, input: &CompileInput<'_>, ctx: &PluginContext<'_>) -> bool;
}

/// Fallback for types nobody registered.
#[derive(Debug, Default)]
pub struct NullPlugin {
    reported: Mutex<BTreeSet<u32>>,
}

impl NullPlugin {
    /// Reports a missing plugin, once per type.
    fn report(&self, handle: &InstanceHandle, diagnostics: &DiagnosticSink, source: &Path) {
        let mut reported = self.reported.lock().unwrap_or_else(|e| e.into_inner());
        if reported.insert(handle.type_id()) {
            diagnostics.emit(
                Diagnostic::warning(
                    DiagnosticCode::NO_PLUGIN,
                    format!("no plugin registered for type '{}'", handle.type_name()),
                )
                .with_origin(source, Some(handle.name())),
            );
        }
    }
}

impl AssetPlugin for NullPlugin {
    fn name(&self) -> &str {
        "null"
    }

    fn type_info(&self, type_name: &str, type_id: u32) -> ExtendedTypeInfo {
        ExtendedTypeInfo {
            type_name: type_name.to_string(),
            type_id,
            ..ExtendedTypeInfo::default()
        }
    }

    fn all_types_hash(&self) -> u32 {
        0
    }

    fn process(&self, input: &CompileInput<'_>, ctx: &PluginContext<'_>) -> BuildResult<AssetBuffer> {
        self.report(input.handle, ctx.diagnostics, ctx.source);
        Ok(AssetBuffer::default())
    }
}

/// Plugins keyed by type id.
pub struct PluginRegistry {
    plugins: BTreeMap<u32, Arc<dyn AssetPlugin>>,
    fallback: NullPlugin,
    diagnostics: Arc<DiagnosticSink>,
}

impl PluginRegistry {
    /// An empty registry reporting into `diagnostics`.
    pub fn new(diagnostics: Arc<DiagnosticSink>) -> Self {
        Self {
            plugins: BTreeMap::new(),
            fallback: NullPlugin::default(),
            diagnostics,
        }
    }

    /// Registers `plugin` for `type_name`, replacing any previous registration.
    pub fn register(&mut self, type_name: &str, plugin: Arc<dyn AssetPlugin>) {
        let type_id = bab_common::type_id_of(type_name);
        tracing::debug!(type_name, plugin = plugin.name(), "registered plugin");
        self.plugins.insert(type_id, plugin);
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no type has a plugin.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// The plugin for `type_id`, or the fallback.
    pub fn plugin(&self, type_id: u32) -> &dyn AssetPlugin {
        match self.plugins.get(&type_id) {
            Some(plugin) => plugin.as_ref(),
            None => &self.fallback,
        }
    }

    /// Type information for the type of `handle`.
    pub fn type_info(&self, handle: &InstanceHandle) -> ExtendedTypeInfo {
        self.plugin(handle.type_id())
            .type_info(handle.type_name(), handle.type_id())
    }

    /// The sink plugins report into.
    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    /// Aggregate of every registered plugin's all-types hash, `0` if none.
    pub fn all_types_hash(&self) -> u32 {
        self.fold(|p| p.all_types_hash())
    }

    /// Aggregate compiler version, `0` if no plugin is registered.
    pub fn version(&self) -> u32 {
        self.fold(|p| p.version())
    }

    fn fold(&self, value: impl Fn(&dyn AssetPlugin) -> u32) -> u32 {
        if self.plugins.is_empty() {
            return 0;
        }
        let mut bytes = Vec::with_capacity(self.plugins.len() * 8);
        for (type_id, plugin) in &self.plugins {
            bytes.extend_from_slice(&type_id.to_le_bytes());
            bytes.extend_from_slice(&value(plugin.as_ref()).to_le_bytes());
        }
        fast_hash(&bytes)
    }
}

/// Verifiers keyed by type id. Types without a verifier always pass.
#[derive(Default)]
pub struct VerifierRegistry {
    verifiers: BTreeMap<u32, Arc<dyn VerifierPlugin>>,
}

impl VerifierRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `verifier` for `type_name`.
    pub fn register(&mut self, type_name: &str, verifier: Arc<dyn VerifierPlugin>) {
        self.verifiers
            .insert(bab_common::type_id_of(type_name), verifier);
    }

    /// Runs the verifier for the type of `input`.
    pub fn verify(&self, input: &CompileInput<'_>, ctx: &PluginContext<'_>) -> bool {
        match self.verifiers.get(&input.handle.type_id()) {
            Some(verifier) => verifier.verify(input, ctx),
            None => true,
        }
    }
}
