//! Owned XML trees for asset declaration documents.
//!
//! Source documents are parsed into an owned [`Element`] tree that the engine
//! mutates freely: override merging, reference rewriting and schema annotation all
//! work on this tree. Serialization is canonical (namespace declarations are
//! regenerated, insignificant whitespace is dropped), which makes [`xml_hash`] a
//! stable content hash.

#![warn(missing_docs)]

pub mod element;
pub mod error;
pub mod hash;
pub mod reader;
pub mod writer;

pub use element::{Attribute, Element, Node, SchemaInfo};
pub use error::XmlError;
pub use hash::{xml_hash, XML_HASH_CHUNK};
pub use reader::{parse_document, parse_file};
pub use writer::{to_xml_string, write_file};

/// Namespace of asset declaration documents.
pub const ASSET_NS: &str = "uri:ea.com:eala:asset";
/// Namespace of per-node merge directives (`joinAction`, `insertPosition`).
pub const INSTANCE_NS: &str = "uri:ea.com:eala:asset:instance";
/// Namespace of schema annotations (`refType`).
pub const SCHEMA_NS: &str = "uri:ea.com:eala:asset:schema";
