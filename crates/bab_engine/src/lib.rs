//! Incremental compilation of XML asset declarations into binary asset streams.
//!
//! A [`BuildSession`] owns everything one build needs: settings, the schema set,
//! the plugin registry, the session cache and an arena of loaded documents.
//! Building an input document parses it and its inclusions, merges inheritance,
//! validates and compiles every instance through its [`AssetPlugin`], then
//! computes the output closure and commits it as a stream of `.bin` assets
//! described by a [`Manifest`].
//!
//! Documents whose content, dependencies and compiler versions are unchanged
//! since the previous run are restored from the session cache instead of being
//! parsed again. Compiled assets are reused from the output directory, a base
//! patch stream or the shared build cache when their header still matches.
//!
//! ```no_run
//! use bab_config::Settings;
//! use bab_engine::{BuildSession, PluginRegistry};
//! use bab_schema::SchemaSet;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::default();
//! let schema = SchemaSet::load("Data/Assets.xsd".as_ref())?;
//! let plugins = PluginRegistry::new(Arc::new(Default::default()));
//! let mut session = BuildSession::new(settings, schema, plugins);
//! let summary = session.build("Data/Root.xml".as_ref())?;
//! println!("{:08x}", summary.stream_checksum);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod arena;
pub mod asset;
pub mod definition;
pub mod document;
pub mod error;
pub mod expression;
pub mod hash_bins;
pub mod inclusion;
pub mod instance;
pub mod instance_set;
pub mod joiner;
pub mod manifest;
pub mod ordering;
pub mod output;
pub mod passthrough;
pub mod plugin;
pub mod resolver;
pub mod session;
pub mod stats;

mod closure;
mod compile;
mod processor;

pub use arena::{Arena, DocId};
pub use asset::{AssetHeader, BinaryAsset, CacheAccess, FsCacheAccess, RetryPolicy};
pub use definition::{Definition, DefinitionSet};
pub use document::{Document, DocumentSnapshot, DocumentState, LoadMode};
pub use expression::{DefaultEvaluator, DefineLookup, ExpressionEvaluator};
pub use hash_bins::HashBins;
pub use inclusion::{InclusionItem, InclusionType};
pub use instance::{InstanceDeclaration, InstanceRef, InstanceState, Slot};
pub use instance_set::InstanceSet;
pub use manifest::{Manifest, ManifestHeader};
pub use output::OutputManager;
pub use passthrough::PassthroughPlugin;
pub use plugin::{
    AssetBuffer, AssetPlugin, CompileInput, ExtendedTypeInfo, NullPlugin, PluginContext,
    PluginRegistry, VerifierPlugin, VerifierRegistry,
};
pub use resolver::PathResolver;
pub use session::{BuildSession, BuildSummary};
pub use stats::CompileStats;
