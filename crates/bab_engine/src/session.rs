//! The build session.
//!
//! A [`BuildSession`] owns everything one build touches: settings, schema,
//! plugins, the session cache, the string hash bins and the arena of documents.
//! Documents and instances refer to each other through [`DocId`] and
//! [`InstanceRef`], never through pointers, so the whole graph lives and dies
//! with the session. Two sessions in one process share nothing.

use crate::arena::{Arena, DocId};
use crate::asset::{AssetContext, CacheAccess, FsCacheAccess, RetryPolicy, WrittenAsset};
use crate::document::{Document, DocumentSnapshot, DocumentState};
use crate::error;
use crate::expression::{DefaultEvaluator, ExpressionEvaluator};
use crate::hash_bins::{HashBins, STRING_HASHES_FILE};
use crate::instance::{InstanceDeclaration, InstanceRef};
use crate::plugin::{PluginRegistry, VerifierRegistry};
use crate::resolver::{normalize, PathResolver};
use crate::stats::CompileStats;
use bab_cache::SessionCache;
use bab_common::{fast_hash, BuildError, BuildResult, ErrorCode, InstanceHandle};
use bab_config::Settings;
use bab_diagnostics::DiagnosticSink;
use bab_schema::SchemaSet;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Where compiled assets live and how they are copied between tiers.
pub(crate) struct AssetStore {
    /// Assets materialized this session, by file base.
    pub(crate) last_written: BTreeMap<String, WrittenAsset>,
    pub(crate) access: Arc<dyn CacheAccess>,
    pub(crate) retry: RetryPolicy,
    pub(crate) copy_buffer: Mutex<Vec<u8>>,
    pub(crate) big_endian: bool,
    pub(crate) always_touch_cache: bool,
}

impl AssetStore {
    fn new(settings: &Settings) -> Self {
        Self {
            last_written: BTreeMap::new(),
            access: Arc::new(FsCacheAccess),
            retry: RetryPolicy::default(),
            copy_buffer: Mutex::new(Vec::new()),
            big_endian: settings.build.is_big_endian(),
            always_touch_cache: settings.build.always_touch_cache,
        }
    }

    pub(crate) fn context(&self) -> AssetContext<'_> {
        AssetContext {
            big_endian: self.big_endian,
            last_written: &self.last_written,
            cache: self.access.as_ref(),
            copy_buffer: &self.copy_buffer,
            retry: self.retry,
            always_touch_cache: self.always_touch_cache,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub(crate) files_parsed: usize,
    pub(crate) documents_reused: usize,
    pub(crate) instances_processed: usize,
    pub(crate) instances_compiled: usize,
    pub(crate) assets_copied: usize,
    pub(crate) assets_reused: usize,
}

/// What one build did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    /// Documents opened.
    pub documents: usize,
    /// Documents parsed from source, including reloads.
    pub files_parsed: usize,
    /// Cached documents reused without parsing.
    pub documents_reused: usize,
    /// Instances merged, validated and checked for output.
    pub instances_processed: usize,
    /// Instances a plugin compiled.
    pub instances_compiled: usize,
    /// Assets copied from another stream or the build cache.
    pub assets_copied: usize,
    /// Assets already present in the output directory or base stream.
    pub assets_reused: usize,
    /// Distinct references that resolved to nothing.
    pub missing_references: usize,
    /// Checksum of the root stream.
    pub stream_checksum: u32,
    /// Manifest of the root stream.
    pub manifest: PathBuf,
}

/// Owns all state of one build.
pub struct BuildSession {
    pub(crate) settings: Settings,
    pub(crate) schema: SchemaSet,
    pub(crate) plugins: PluginRegistry,
    pub(crate) verifiers: VerifierRegistry,
    pub(crate) evaluator: Box<dyn ExpressionEvaluator>,
    pub(crate) resolver: PathResolver,
    pub(crate) hash_bins: HashBins,
    pub(crate) stats: CompileStats,
    pub(crate) cache: SessionCache<DocumentSnapshot>,
    pub(crate) documents: Arena<DocId, Document>,
    pub(crate) doc_index: HashMap<String, DocId>,
    pub(crate) processing_stack: Vec<DocId>,
    /// Documents reloaded as inheritance sources, released when the current document completes.
    pub(crate) reloaded: Vec<DocId>,
    /// Instances whose plugin failed this build.
    pub(crate) failed: HashSet<InstanceHandle>,
    pub(crate) missing_references: BTreeSet<String>,
    pub(crate) missing_files: BTreeSet<PathBuf>,
    /// File bases of assets owned by precompiled streams.
    pub(crate) resident: HashSet<String>,
    pub(crate) store: AssetStore,
    pub(crate) counters: Counters,
    pub(crate) last_stream: Option<(PathBuf, u32)>,
}

impl BuildSession {
    /// A session over `settings`, `schema` and `plugins`.
    pub fn new(settings: Settings, schema: SchemaSet, plugins: PluginRegistry) -> Self {
        let resolver = PathResolver::new(&settings.paths, &settings.output.postfix);
        let hash_bins = HashBins::new(&settings.string_hash_bins);
        let store = AssetStore::new(&settings);
        Self {
            settings,
            schema,
            plugins,
            verifiers: VerifierRegistry::new(),
            evaluator: Box::new(DefaultEvaluator),
            resolver,
            hash_bins,
            stats: CompileStats::new(),
            cache: SessionCache::new(PathBuf::new()),
            documents: Arena::new(),
            doc_index: HashMap::new(),
            processing_stack: Vec::new(),
            reloaded: Vec::new(),
            failed: HashSet::new(),
            missing_references: BTreeSet::new(),
            missing_files: BTreeSet::new(),
            resident: HashSet::new(),
            store,
            counters: Counters::default(),
            last_stream: None,
        }
    }

    /// Replaces the game-data verifiers.
    pub fn with_verifiers(mut self, verifiers: VerifierRegistry) -> Self {
        self.verifiers = verifiers;
        self
    }

    /// Replaces the expression evaluator.
    pub fn with_evaluator(mut self, evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replaces how the shared build cache is read and how often a locked file is retried.
    pub fn with_cache_access(mut self, access: Arc<dyn CacheAccess>, retry: RetryPolicy) -> Self {
        self.store.access = access;
        self.store.retry = retry;
        self
    }

    /// Settings of the session.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The loaded schema.
    pub fn schema(&self) -> &SchemaSet {
        &self.schema
    }

    /// Non-fatal problems reported so far.
    pub fn diagnostics(&self) -> &DiagnosticSink {
        self.plugins.diagnostics()
    }

    /// Compile timings of the last build.
    pub fn stats(&self) -> &CompileStats {
        &self.stats
    }

    /// String tables recorded so far.
    pub fn hash_bins(&self) -> &HashBins {
        &self.hash_bins
    }

    /// Every document opened by the last build.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().map(|(_, doc)| doc)
    }

    /// The document of `path`, if the last build opened it.
    pub fn document(&self, path: &Path) -> Option<&Document> {
        let id = self.doc_index.get(&self.doc_key(&normalize(path)))?;
        Some(&self.documents[*id])
    }

    /// The first declaration of `handle` in the last build.
    pub fn find_instance(&self, handle: &InstanceHandle) -> Option<&InstanceDeclaration> {
        self.documents()
            .flat_map(|doc| doc.instances.iter())
            .find(|inst| inst.handle == *handle)
    }

    pub(crate) fn doc_key(&self, path: &Path) -> String {
        format!(
            "{}|{}",
            path.to_string_lossy().to_lowercase(),
            self.settings.build.configuration
        )
    }

    pub(crate) fn decl(&self, r: InstanceRef) -> BuildResult<&InstanceDeclaration> {
        self.documents[r.doc]
            .instance(r.slot)
            .ok_or_else(|| BuildError::internal("Dangling instance reference"))
    }

    pub(crate) fn decl_mut(&mut self, r: InstanceRef) -> BuildResult<&mut InstanceDeclaration> {
        self.documents[r.doc]
            .instance_mut(r.slot)
            .ok_or_else(|| BuildError::internal("Dangling instance reference"))
    }

    fn compilers_version(&self) -> u32 {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend_from_slice(&self.plugins.version().to_le_bytes());
        bytes.extend_from_slice(&self.plugins.all_types_hash().to_le_bytes());
        fast_hash(&bytes)
    }

    fn reset_run(&mut self) {
        self.stats.clear();
        self.documents = Arena::new();
        self.doc_index.clear();
        self.processing_stack.clear();
        self.reloaded.clear();
        self.failed.clear();
        self.missing_references.clear();
        self.missing_files.clear();
        self.resident.clear();
        self.store.last_written.clear();
        self.counters = Counters::default();
        self.last_stream = None;
        self.hash_bins = HashBins::new(&self.settings.string_hash_bins);
    }

    fn open_session_cache(&mut self, input: &Path) -> BuildResult<()> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        let path = self
            .settings
            .paths
            .session_cache_dir()
            .join(format!("{stem}.cache"));
        let mut cache = SessionCache::load(&path).map_err(error::from_cache)?;
        let version = self.compilers_version();
        if cache.is_warm() && cache.asset_compilers_version() != version {
            tracing::info!(
                previous = cache.asset_compilers_version(),
                current = version,
                "asset compilers changed, starting a new session cache"
            );
            cache = SessionCache::new(&path);
        }
        cache.set_asset_compilers_version(version);
        tracing::debug!(
            cache = %path.display(),
            warm = cache.is_warm(),
            "opened session cache"
        );
        self.cache = cache;
        Ok(())
    }

    fn store_snapshots(&mut self) {
        let platform = self.settings.build.target_platform;
        for (_, doc) in self.documents.iter() {
            if doc.state != DocumentState::None {
                self.cache.store_document(
                    &doc.source_path,
                    &doc.configuration,
                    platform,
                    doc.make_cacheable(),
                );
            }
        }
    }

    /// Builds the stream rooted at `input`.
    pub fn build(&mut self, input: &Path) -> BuildResult<BuildSummary> {
        let started = Instant::now();
        if !input.is_file() {
            return Err(BuildError::new(
                ErrorCode::InputXmlFileNotFound,
                format!("Input file '{}' not found.", input.display()),
            ));
        }
        let input = if input.is_absolute() {
            normalize(input)
        } else {
            let cwd = std::env::current_dir().map_err(|e| BuildError::io(input, e))?;
            normalize(&cwd.join(input))
        };
        tracing::info!(
            input = %input.display(),
            platform = self.settings.build.target_platform.name(),
            configuration = %self.settings.build.configuration,
            "starting build"
        );

        self.reset_run();
        self.open_session_cache(&input)?;
        let bins_path = self
            .settings
            .paths
            .output_directory
            .join(STRING_HASHES_FILE);
        self.hash_bins.load(&bins_path);

        let logical = input.to_string_lossy().into_owned();
        self.process_document(&input, &logical, None, true)?;

        self.store_snapshots();
        self.hash_bins.save(&bins_path)?;
        self.cache
            .save(self.settings.build.compress_session_cache)
            .map_err(error::from_cache)?;
        self.stats.log();

        let (manifest, stream_checksum) = self.last_stream.clone().unwrap_or_default();
        let summary = BuildSummary {
            documents: self.documents.len(),
            files_parsed: self.counters.files_parsed,
            documents_reused: self.counters.documents_reused,
            instances_processed: self.counters.instances_processed,
            instances_compiled: self.counters.instances_compiled,
            assets_copied: self.counters.assets_copied,
            assets_reused: self.counters.assets_reused,
            missing_references: self.missing_references.len(),
            stream_checksum,
            manifest,
        };
        tracing::info!(
            documents = summary.documents,
            parsed = summary.files_parsed,
            reused = summary.documents_reused,
            compiled = summary.instances_compiled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );
        Ok(summary)
    }
}
