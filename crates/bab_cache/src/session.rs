//! The persistent session cache.
//!
//! On disk the cache is a length-prefixed bincode header (magic, cache version,
//! engine version, payload checksum) followed by the bincode payload, the whole
//! file optionally deflated.

use crate::error::CacheError;
use crate::file_hash::FileHashItem;
use bab_common::{ContentHash, TargetPlatform};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const CACHE_MAGIC: [u8; 4] = *b"BABC";

/// Format version of the cache file.
pub const CACHE_VERSION: u32 = 18;

/// Version of the document model stored in the cache.
pub const ENGINE_VERSION: u32 = 11;

/// A document snapshot the cache can persist.
pub trait CacheDocument: Serialize + DeserializeOwned {
    /// Names of the streams that consumed the document when it was last built.
    fn stream_hints(&self) -> &[String];

    /// Clears per-session state before the snapshot is reused.
    fn reset_state(&mut self) {}
}

/// One tracked file and its last document snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileItem<D> {
    /// Change state of the file.
    pub hash_item: FileHashItem,
    /// The last document built from the file, if any.
    pub document: Option<D>,
}

#[derive(Serialize, Deserialize)]
struct CacheHeader {
    magic: [u8; 4],
    version: u32,
    engine_version: u32,
    checksum: ContentHash,
}

#[derive(Serialize, Deserialize)]
struct LastState<D> {
    created: SystemTime,
    asset_compilers_version: u32,
    files: Vec<FileItem<D>>,
}

/// Tracked files keyed by lowercased path, configuration and platform.
pub struct SessionCache<D> {
    path: PathBuf,
    created: SystemTime,
    asset_compilers_version: u32,
    files: BTreeMap<String, FileItem<D>>,
    dirty_streams: Option<BTreeSet<String>>,
    from_disk: bool,
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

fn cache_key(path: &Path, configuration: &str, platform: TargetPlatform) -> String {
    let mut key = path.to_string_lossy().to_lowercase();
    if !configuration.is_empty() {
        key.push(':');
        key.push_str(&configuration.to_lowercase());
    }
    if platform != TargetPlatform::All {
        key.push(':');
        key.push_str(&platform.index().to_string());
    }
    key
}

impl<D: CacheDocument> SessionCache<D> {
    /// An empty cache that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            created: SystemTime::now(),
            asset_compilers_version: 0,
            files: BTreeMap::new(),
            dirty_streams: None,
            from_disk: false,
        }
    }

    /// Loads the cache saved at `path` (or `path.deflate`).
    ///
    /// A missing file or a version mismatch yields an empty cache. A file that
    /// cannot be decoded is renamed to `.corrupt` and reported as an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let mut cache = Self::new(path);
        let compressed = suffixed(&cache.path, ".deflate");
        let (file, raw) = if compressed.is_file() {
            tracing::info!("loading compressed session cache");
            let bytes = std::fs::read(&compressed).map_err(|e| CacheError::io(&compressed, e))?;
            let mut raw = Vec::new();
            let inflated = DeflateDecoder::new(bytes.as_slice()).read_to_end(&mut raw);
            if let Err(e) = inflated {
                return Err(quarantine(&compressed, e.to_string()));
            }
            (compressed, raw)
        } else if cache.path.is_file() {
            tracing::info!("loading session cache");
            let raw = std::fs::read(&cache.path).map_err(|e| CacheError::io(&cache.path, e))?;
            (cache.path.clone(), raw)
        } else {
            return Ok(cache);
        };

        let Some(last) = decode::<D>(&file, &raw)? else {
            return Ok(cache);
        };
        cache.created = last.created;
        cache.asset_compilers_version = last.asset_compilers_version;
        cache.from_disk = true;
        cache.check_files(last.files);
        if let Ok(age) = SystemTime::now().duration_since(cache.created) {
            let minutes = age.as_secs() / 60;
            tracing::info!(
                "session cache age is {} days, {} hours, {} minutes",
                minutes / (24 * 60),
                (minutes / 60) % 24,
                minutes % 60
            );
        }
        Ok(cache)
    }

    fn check_files(&mut self, files: Vec<FileItem<D>>) {
        tracing::info!("checking {} files for updates", files.len());
        let mut dirty = Some(BTreeSet::new());
        for mut item in files {
            if let Some(doc) = &mut item.document {
                doc.reset_state();
            }
            item.hash_item.reset();
            if item.hash_item.is_dirty() {
                if let Some(streams) = &mut dirty {
                    match &item.document {
                        Some(doc) if !doc.stream_hints().is_empty() => {
                            streams.extend(doc.stream_hints().iter().cloned());
                        }
                        _ => {
                            tracing::info!(
                                "building all streams because {} has no stream hints",
                                item.hash_item.path().display()
                            );
                            dirty = None;
                        }
                    }
                }
            }
            let key = cache_key(
                item.hash_item.path(),
                item.hash_item.configuration(),
                item.hash_item.platform(),
            );
            self.files.insert(key, item);
        }
        self.dirty_streams = dirty;
    }

    /// Whether the cache was read back from a previous session.
    pub fn is_warm(&self) -> bool {
        self.from_disk
    }

    /// The file the cache is saved to, without the `.deflate` suffix.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Streams whose inputs changed since the cache was saved; `None` means all.
    pub fn dirty_streams(&self) -> Option<&BTreeSet<String>> {
        self.dirty_streams.as_ref()
    }

    /// Whether `stream` must be rebuilt.
    pub fn is_stream_dirty(&self, stream: &str) -> bool {
        self.dirty_streams
            .as_ref()
            .map_or(true, |streams| streams.contains(stream))
    }

    /// Combined version of the asset compilers that produced the cached output.
    pub fn asset_compilers_version(&self) -> u32 {
        self.asset_compilers_version
    }

    /// Records the asset compilers version for the next session.
    pub fn set_asset_compilers_version(&mut self, version: u32) {
        self.asset_compilers_version = version;
    }

    /// The tracked item for a file, created on first request.
    pub fn file(
        &mut self,
        path: &Path,
        configuration: &str,
        platform: TargetPlatform,
    ) -> &mut FileItem<D> {
        let key = cache_key(path, configuration, platform);
        self.files.entry(key).or_insert_with(|| FileItem {
            hash_item: FileHashItem::new(path, configuration, platform),
            document: None,
        })
    }

    /// The last document snapshot of a file, if one was cached.
    pub fn document(
        &self,
        path: &Path,
        configuration: &str,
        platform: TargetPlatform,
    ) -> Option<&D> {
        self.files
            .get(&cache_key(path, configuration, platform))
            .and_then(|item| item.document.as_ref())
    }

    /// Takes a file's document snapshot out of the cache.
    pub fn take_document(
        &mut self,
        path: &Path,
        configuration: &str,
        platform: TargetPlatform,
    ) -> Option<D> {
        self.files
            .get_mut(&cache_key(path, configuration, platform))
            .and_then(|item| item.document.take())
    }

    /// Stores the document snapshot of a file.
    pub fn store_document(
        &mut self,
        path: &Path,
        configuration: &str,
        platform: TargetPlatform,
        document: D,
    ) {
        self.file(path, configuration, platform).document = Some(document);
    }

    /// Writes the cache, keeping the previous file as `.old`.
    ///
    /// Items whose file no longer exists are dropped.
    pub fn save(&mut self, compressed: bool) -> Result<(), CacheError> {
        let files: Vec<FileItem<D>> = std::mem::take(&mut self.files)
            .into_values()
            .filter_map(|mut item| item.hash_item.exists().then_some(item))
            .collect();
        let last = LastState {
            created: self.created,
            asset_compilers_version: self.asset_compilers_version,
            files,
        };
        let result = self.write(&last, compressed);
        self.files = last
            .files
            .into_iter()
            .map(|item| {
                let key = cache_key(
                    item.hash_item.path(),
                    item.hash_item.configuration(),
                    item.hash_item.platform(),
                );
                (key, item)
            })
            .collect();
        result
    }

    fn write(&self, last: &LastState<D>, compressed: bool) -> Result<(), CacheError> {
        let config = bincode::config::standard();
        let payload = bincode::serde::encode_to_vec(last, config).map_err(|e| {
            CacheError::Serialization {
                reason: e.to_string(),
            }
        })?;
        let header = CacheHeader {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION,
            engine_version: ENGINE_VERSION,
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, config).map_err(|e| {
            CacheError::Serialization {
                reason: e.to_string(),
            }
        })?;
        let mut raw = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        raw.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        raw.extend_from_slice(&header_bytes);
        raw.extend_from_slice(&payload);

        let target = if compressed {
            suffixed(&self.path, ".deflate")
        } else {
            self.path.clone()
        };
        let bytes = if compressed {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&raw)
                .map_err(|e| CacheError::io(&target, e))?;
            encoder.finish().map_err(|e| CacheError::io(&target, e))?
        } else {
            raw
        };
        if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
        }
        let tmp = suffixed(&target, ".tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| CacheError::io(&tmp, e))?;
        if target.exists() {
            let old = suffixed(&target, ".old");
            if old.exists() {
                std::fs::remove_file(&old).map_err(|e| CacheError::io(&old, e))?;
            }
            std::fs::rename(&target, &old).map_err(|e| CacheError::io(&target, e))?;
        }
        std::fs::rename(&tmp, &target).map_err(|e| CacheError::io(&target, e))?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "saved session cache");
        Ok(())
    }
}

/// Moves an unreadable cache file aside.
fn quarantine(path: &Path, reason: String) -> CacheError {
    let corrupt = suffixed(path, ".corrupt");
    if let Err(e) = std::fs::rename(path, &corrupt) {
        tracing::warn!("could not move {} aside: {e}", path.display());
    }
    tracing::info!("session cache file {} could not be opened: {reason}", path.display());
    CacheError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

/// Decodes a cache file. `Ok(None)` means the file is intact but from another version.
fn decode<D: CacheDocument>(path: &Path, raw: &[u8]) -> Result<Option<LastState<D>>, CacheError> {
    let config = bincode::config::standard();
    if raw.len() < 4 {
        return Err(quarantine(path, "file is truncated".to_string()));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&raw[..4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let Some(header_raw) = raw.get(4..4 + header_len) else {
        return Err(quarantine(path, "header is truncated".to_string()));
    };
    let header: CacheHeader = match bincode::serde::decode_from_slice(header_raw, config) {
        Ok((header, _)) => header,
        Err(e) => return Err(quarantine(path, e.to_string())),
    };
    if header.magic != CACHE_MAGIC {
        return Err(quarantine(path, "bad magic".to_string()));
    }
    if header.version != CACHE_VERSION {
        tracing::info!(
            "session cache outdated: version is {}, expected {CACHE_VERSION}",
            header.version
        );
        return Ok(None);
    }
    if header.engine_version != ENGINE_VERSION {
        tracing::info!(
            "document processor version mismatch: version is {}, expected {ENGINE_VERSION}",
            header.engine_version
        );
        return Ok(None);
    }
    let payload = &raw[4 + header_len..];
    if ContentHash::from_bytes(payload) != header.checksum {
        return Err(quarantine(path, "checksum mismatch".to_string()));
    }
    match bincode::serde::decode_from_slice(payload, config) {
        Ok((last, _)) => Ok(Some(last)),
        Err(e) => Err(quarantine(path, e.to_string())),
    }
}
