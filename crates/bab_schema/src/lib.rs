//! The asset schema model.
//!
//! Asset schemas are written in a subset of XSD: named and anonymous complex and
//! simple types, sequence/choice/all content, complex and simple content derived by
//! extension or restriction, enumerations, lists, and `xs:include`. The
//! [`SchemaSet`] built from them answers the questions the build engine asks:
//! which types derive from which, which asset types a type can transitively
//! reference, and what each node of an instance is typed as.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod model;
pub mod set;
pub mod validate;

pub use error::SchemaError;
pub use model::{
    AttributeDecl, ComplexType, Derivation, ElementDecl, Particle, ParticleKind, SimpleType,
    UNBOUNDED,
};
pub use set::{ContentModel, SchemaSet, TypeDef};

/// Root of every asset type.
pub const BASE_ASSET_TYPE: &str = "BaseAssetType";
/// Root of asset types that may be used as `inheritFrom` sources.
pub const BASE_INHERITABLE_ASSET: &str = "BaseInheritableAsset";
/// Root of strong asset reference types.
pub const ASSET_REFERENCE: &str = "AssetReference";
/// Root of weak asset reference types.
pub const WEAK_REFERENCE: &str = "WeakReference";
/// Root of file reference types.
pub const FILE_REFERENCE: &str = "FileReference";
