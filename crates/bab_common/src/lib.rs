//! Shared foundational types used across the binary asset builder.
//!
//! This crate provides the 32-bit FastHash family used for every asset identity,
//! the [`InstanceHandle`] identity type, target platforms, and the fatal
//! [`BuildError`] type with its [`ErrorCode`] catalogue.

#![warn(missing_docs)]

pub mod handle;
pub mod hash;
pub mod platform;
pub mod result;

pub use handle::{instance_id_of, type_id_of, InstanceHandle};
pub use hash::{
    fast_hash, fast_hash_seeded, hash_text, hash_text_lower, hash_text_seeded, ContentHash,
};
pub use platform::TargetPlatform;
pub use result::{BuildError, BuildResult, ErrorCode};
