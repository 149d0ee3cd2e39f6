//! Incremental build state that survives between runs.
//!
//! [`FileHashItem`] tracks one source file's content hash and modification time,
//! hashing lazily through the read-ahead [`AsyncFileReader`]. [`SessionCache`]
//! persists those items, together with an optional snapshot of each document's
//! last result, keyed by path, build configuration and target platform.

#![warn(missing_docs)]

pub mod error;
pub mod file_hash;
pub mod reader;
pub mod session;

pub use error::CacheError;
pub use file_hash::FileHashItem;
pub use reader::{AsyncFileReader, CHUNK_SIZE};
pub use session::{CacheDocument, FileItem, SessionCache, CACHE_VERSION, ENGINE_VERSION};
