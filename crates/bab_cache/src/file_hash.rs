//! Lazily evaluated per-file change state.

use crate::error::CacheError;
use crate::reader::AsyncFileReader;
use bab_common::{fast_hash_seeded, TargetPlatform};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// How much of a [`FileHashItem`] has been evaluated this session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
enum FileState {
    #[default]
    AllInvalid,
    ExistsValid,
    DateValid,
    HashValid,
}

/// Content hash and modification time of one file, for one configuration and platform.
///
/// Existence, date and hash are each computed at most once per session, on first
/// use. The hash is only recomputed when the modification time moved since the
/// last time it was taken.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileHashItem {
    path: PathBuf,
    configuration: String,
    platform: TargetPlatform,
    hash: u32,
    last_date: Option<SystemTime>,
    #[serde(skip)]
    state: FileState,
    #[serde(skip)]
    current_date: Option<SystemTime>,
    #[serde(skip)]
    exists: bool,
}

impl FileHashItem {
    /// Creates an item that has never been hashed.
    pub fn new(path: impl Into<PathBuf>, configuration: &str, platform: TargetPlatform) -> Self {
        Self {
            path: path.into(),
            configuration: configuration.to_string(),
            platform,
            hash: 0,
            last_date: None,
            state: FileState::AllInvalid,
            current_date: None,
            exists: false,
        }
    }

    /// The tracked file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build configuration the item was recorded for.
    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    /// Target platform the item was recorded for.
    pub fn platform(&self) -> TargetPlatform {
        self.platform
    }

    /// Forgets everything evaluated this session.
    pub fn reset(&mut self) {
        self.state = FileState::AllInvalid;
        self.current_date = None;
    }

    /// Whether the file exists.
    pub fn exists(&mut self) -> bool {
        if self.state < FileState::ExistsValid {
            self.exists = self.path.is_file();
            self.state = FileState::ExistsValid;
        }
        self.exists
    }

    /// Whether the file's modification time differs from when it was last hashed.
    pub fn is_dirty(&mut self) -> bool {
        if self.state < FileState::DateValid {
            if self.exists() {
                self.current_date = std::fs::metadata(&self.path)
                    .and_then(|m| m.modified())
                    .ok();
            }
            self.state = FileState::DateValid;
        }
        self.current_date.is_none() || self.last_date != self.current_date
    }

    /// The file's content hash, `0` for a missing file.
    pub fn hash(&mut self) -> Result<u32, CacheError> {
        if self.state < FileState::HashValid {
            if self.is_dirty() {
                if self.exists() {
                    self.update_hash()?;
                } else {
                    self.hash = 0;
                }
            }
            self.state = FileState::HashValid;
        }
        Ok(self.hash)
    }

    fn update_hash(&mut self) -> Result<(), CacheError> {
        let reader = AsyncFileReader::open(&self.path)?;
        let mut hash = reader.file_size() as u32;
        reader.for_each_chunk(|chunk| hash = fast_hash_seeded(hash, chunk))?;
        tracing::trace!(path = %self.path.display(), hash = format_args!("{hash:08x}"), "hashed file");
        self.hash = hash;
        self.last_date = self.current_date;
        Ok(())
    }
}
