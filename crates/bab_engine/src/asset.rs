//! Compiled assets and the storage tiers they can be found in.
//!
//! A [`BinaryAsset`] is one compiled instance for one stream. Its bytes may be
//! resident in the base patch stream, already in this stream's output directory,
//! in memory after compilation, in another stream's output written earlier this
//! session, or in the shared build cache. [`BinaryAsset::commit`] materializes it
//! into the output directory from the best tier available.

use crate::plugin::AssetBuffer;
use bab_common::{BuildError, BuildResult, ErrorCode, InstanceHandle};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

bitflags! {
    /// Storage tiers, in priority order.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AssetLocation: u32 {
        /// Resident in the base patch stream; nothing to write.
        const BASE_PATCH_STREAM = 1 << 0;
        /// Present in this stream's asset directory.
        const OUTPUT = 1 << 1;
        /// Compiled this run and held in memory.
        const MEMORY = 1 << 2;
        /// Written by another stream earlier this session.
        const LOCAL = 1 << 3;
        /// Present in the shared build cache.
        const CACHE = 1 << 4;
        /// Every tier.
        const ALL = Self::BASE_PATCH_STREAM.bits()
            | Self::OUTPUT.bits()
            | Self::MEMORY.bits()
            | Self::LOCAL.bits()
            | Self::CACHE.bits();
    }
}

const PRIORITY: [AssetLocation; 5] = [
    AssetLocation::BASE_PATCH_STREAM,
    AssetLocation::OUTPUT,
    AssetLocation::MEMORY,
    AssetLocation::LOCAL,
    AssetLocation::CACHE,
];

/// Fixed header in front of every asset file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHeader {
    /// Type id of the instance.
    pub type_id: u32,
    /// Type hash of the instance.
    pub type_hash: u32,
    /// Instance id.
    pub instance_id: u32,
    /// Instance hash.
    pub instance_hash: u32,
    /// Size of the instance section.
    pub instance_size: u32,
    /// Size of the relocation section.
    pub relocation_size: u32,
    /// Size of the imports section.
    pub imports_size: u32,
}

impl AssetHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 28;

    /// Header for `buffer` compiled from `handle`.
    pub fn new(handle: &InstanceHandle, buffer: &AssetBuffer) -> Self {
        Self {
            type_id: handle.type_id(),
            type_hash: handle.type_hash,
            instance_id: handle.instance_id(),
            instance_hash: handle.instance_hash,
            instance_size: buffer.instance_data.len() as u32,
            relocation_size: buffer.relocation_data.len() as u32,
            imports_size: buffer.imports_data.len() as u32,
        }
    }

    /// Whether the identity fields describe `handle` exactly.
    pub fn matches(&self, handle: &InstanceHandle) -> bool {
        self.type_id == handle.type_id()
            && self.type_hash == handle.type_hash
            && self.instance_id == handle.instance_id()
            && self.instance_hash == handle.instance_hash
    }

    /// Size of the three payload sections together.
    pub fn payload_len(&self) -> u64 {
        u64::from(self.instance_size) + u64::from(self.relocation_size) + u64::from(self.imports_size)
    }

    /// Expected length of the asset file.
    pub fn file_len(&self) -> u64 {
        Self::SIZE as u64 + self.payload_len()
    }

    /// Whether all sections are empty.
    pub fn is_empty(&self) -> bool {
        self.payload_len() == 0
    }

    /// Same naming as [`InstanceHandle::file_base`].
    pub fn file_base(&self) -> String {
        format!(
            "{:08x}.{:08x}.{:08x}.{:08x}",
            self.type_id, self.type_hash, self.instance_id, self.instance_hash
        )
    }

    fn fields(&self) -> [u32; 7] {
        [
            self.type_id,
            self.type_hash,
            self.instance_id,
            self.instance_hash,
            self.instance_size,
            self.relocation_size,
            self.imports_size,
        ]
    }

    /// Encodes the header.
    pub fn to_bytes(&self, big_endian: bool) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        for (chunk, value) in out.chunks_exact_mut(4).zip(self.fields()) {
            let bytes = if big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            chunk.copy_from_slice(&bytes);
        }
        out
    }

    /// Decodes a header.
    pub fn from_bytes(bytes: &[u8; Self::SIZE], big_endian: bool) -> Self {
        let mut v = [0u32; 7];
        for (slot, chunk) in v.iter_mut().zip(bytes.chunks_exact(4)) {
            let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
            *slot = if big_endian {
                u32::from_be_bytes(raw)
            } else {
                u32::from_le_bytes(raw)
            };
        }
        Self {
            type_id: v[0],
            type_hash: v[1],
            instance_id: v[2],
            instance_hash: v[3],
            instance_size: v[4],
            relocation_size: v[5],
            imports_size: v[6],
        }
    }

    /// Reads a header from the front of `reader`.
    pub fn read(reader: &mut dyn Read, big_endian: bool) -> io::Result<Self> {
        let mut bytes = [0u8; Self::SIZE];
        reader.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(&bytes, big_endian))
    }

    /// Reads the header of the asset file at `path`.
    pub fn read_file(path: &Path, big_endian: bool) -> io::Result<Self> {
        Self::read(&mut File::open(path)?, big_endian)
    }
}

/// Read access to the shared build cache.
pub trait CacheAccess: Send + Sync {
    /// Opens a cached file for reading.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// Plain filesystem access.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsCacheAccess;

impl CacheAccess for FsCacheAccess {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// How often a copy from the shared cache is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts.
    pub attempts: u32,
    /// Pause after a failed attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            delay: Duration::from_millis(500),
        }
    }
}

/// Where an asset was written earlier this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenAsset {
    /// Directory of the `.asset` file.
    pub asset_dir: PathBuf,
    /// Directory of the `.cdata` file.
    pub cdata_dir: PathBuf,
}

/// Session state an asset needs to locate and copy itself.
pub struct AssetContext<'a> {
    /// Byte order of headers.
    pub big_endian: bool,
    /// Assets written this session, by file base.
    pub last_written: &'a BTreeMap<String, WrittenAsset>,
    /// Access to the shared cache.
    pub cache: &'a dyn CacheAccess,
    /// Scratch buffer for file copies; one copy at a time.
    pub copy_buffer: &'a Mutex<Vec<u8>>,
    /// Retry policy for shared-cache copies.
    pub retry: RetryPolicy,
    /// Refresh cache timestamps even when the cache was not read.
    pub always_touch_cache: bool,
}

const COPY_CHUNK: usize = 1 << 20;

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn touch(path: &Path) -> io::Result<()> {
    File::options().write(true).open(path)?.set_modified(SystemTime::now())
}

/// One compiled instance for one stream.
#[derive(Debug)]
pub struct BinaryAsset {
    handle: InstanceHandle,
    has_custom_data: bool,
    in_base_stream: bool,
    asset_dir: PathBuf,
    cdata_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    header: Option<AssetHeader>,
    buffer: Option<AssetBuffer>,
    known: AssetLocation,
    present: AssetLocation,
    /// Whether the asset belongs to the stream's output set.
    pub is_output: bool,
}

impl BinaryAsset {
    /// An asset whose files live in `asset_dir` and `cdata_dir`.
    pub fn new(
        handle: InstanceHandle,
        has_custom_data: bool,
        asset_dir: PathBuf,
        cdata_dir: PathBuf,
        cache_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            handle,
            has_custom_data,
            in_base_stream: false,
            asset_dir,
            cdata_dir,
            cache_dir,
            header: None,
            buffer: None,
            known: AssetLocation::empty(),
            present: AssetLocation::empty(),
            is_output: false,
        }
    }

    /// The instance the asset was compiled from.
    pub fn handle(&self) -> &InstanceHandle {
        &self.handle
    }

    /// Points the asset at a new version of its instance.
    pub fn update_instance(&mut self, handle: &InstanceHandle, has_custom_data: bool, cache_dir: Option<PathBuf>) {
        let changed = handle.file_base() != self.handle.file_base();
        self.handle = handle.clone();
        self.has_custom_data = has_custom_data;
        self.cache_dir = cache_dir;
        if changed {
            self.header = None;
            self.buffer = None;
            self.known = AssetLocation::empty();
            self.present = AssetLocation::empty();
        }
    }

    /// Marks the asset as resident in the base patch stream.
    pub fn set_in_base_stream(&mut self, in_base: bool) {
        self.in_base_stream = in_base;
        self.known.remove(AssetLocation::BASE_PATCH_STREAM);
    }

    /// Uses a header recorded by a previous run instead of reading the file.
    pub fn prefill_header(&mut self, header: AssetHeader) {
        if header.matches(&self.handle) {
            if header.is_empty() {
                tracing::warn!(
                    "Suspicious file sizes for {}. Reloading info from disk.",
                    self.handle.name()
                );
                return;
            }
            self.header = Some(header);
        }
    }

    /// Holds freshly compiled output.
    pub fn set_buffer(&mut self, buffer: AssetBuffer) {
        self.header = Some(AssetHeader::new(&self.handle, &buffer));
        self.buffer = Some(buffer);
        self.known.remove(AssetLocation::MEMORY);
    }

    /// The header, once known.
    pub fn header(&self) -> Option<&AssetHeader> {
        self.header.as_ref()
    }

    /// Whether the instance's compiler writes custom data.
    pub fn has_custom_data(&self) -> bool {
        self.has_custom_data
    }

    /// The `.asset` file in the output.
    pub fn asset_path(&self) -> PathBuf {
        self.asset_dir.join(format!("{}.asset", self.handle.file_base()))
    }

    /// The `.cdata` file in the output.
    pub fn cdata_path(&self) -> PathBuf {
        self.cdata_dir.join(format!("{}.cdata", self.handle.file_base()))
    }

    fn cache_paths(&self) -> Option<(PathBuf, PathBuf)> {
        let dir = self.cache_dir.as_ref()?;
        let base = self.handle.file_base();
        Some((dir.join(format!("{base}.asset")), dir.join(format!("{base}.cdata"))))
    }

    fn output_present(&self) -> bool {
        self.asset_path().is_file() && (!self.has_custom_data || self.cdata_path().is_file())
    }

    fn local_source(&self, ctx: &AssetContext<'_>) -> Option<(PathBuf, PathBuf)> {
        let written = ctx.last_written.get(&self.handle.file_base())?;
        if written.asset_dir == self.asset_dir {
            return None;
        }
        let base = self.handle.file_base();
        let asset = written.asset_dir.join(format!("{base}.asset"));
        let cdata = written.cdata_dir.join(format!("{base}.cdata"));
        (asset.is_file() && (!self.has_custom_data || cdata.is_file())).then_some((asset, cdata))
    }

    fn check(&self, tier: AssetLocation, ctx: &AssetContext<'_>) -> bool {
        if tier == AssetLocation::BASE_PATCH_STREAM {
            self.in_base_stream
        } else if tier == AssetLocation::OUTPUT {
            self.output_present()
        } else if tier == AssetLocation::MEMORY {
            self.buffer.is_some()
        } else if tier == AssetLocation::LOCAL {
            self.local_source(ctx).is_some()
        } else if tier == AssetLocation::CACHE {
            self.cache_paths().is_some_and(|(asset, cdata)| {
                asset.is_file() && (!self.has_custom_data || cdata.is_file())
            })
        } else {
            false
        }
    }

    /// The tiers of `filter` the asset is available in.
    ///
    /// Without `return_all` only the highest-priority tier is returned. Results are
    /// remembered until `force_update` asks for a fresh look.
    pub fn location(
        &mut self,
        filter: AssetLocation,
        force_update: bool,
        return_all: bool,
        ctx: &AssetContext<'_>,
    ) -> AssetLocation {
        if force_update {
            self.known.remove(filter);
        }
        let mut result = AssetLocation::empty();
        for tier in PRIORITY.into_iter().filter(|t| filter.contains(*t)) {
            if !self.known.contains(tier) {
                let present = self.check(tier, ctx);
                self.present.set(tier, present);
                self.known.insert(tier);
            }
            if self.present.contains(tier) {
                result.insert(tier);
                if !return_all {
                    break;
                }
            }
        }
        result
    }

    /// Materializes the asset in the output directory. Returns the tier it came from.
    pub fn commit(&mut self, ctx: &AssetContext<'_>) -> BuildResult<AssetLocation> {
        let from = self.location(AssetLocation::ALL, false, false, ctx);
        if from == AssetLocation::BASE_PATCH_STREAM {
            return Ok(from);
        } else if from == AssetLocation::OUTPUT {
            self.update_header_from_output(ctx)?;
        } else if from == AssetLocation::MEMORY {
            self.write_from_memory(ctx.big_endian)?;
        } else if from == AssetLocation::LOCAL {
            let copied = match self.local_source(ctx) {
                Some((asset, cdata)) => self.copy_from(&asset, &cdata, &open_fs, ctx),
                None => false,
            };
            if !copied {
                return Err(BuildError::internal(format!(
                    "Failure to commit asset {} from previous output",
                    self.handle.name()
                )));
            }
            let header = AssetHeader::read_file(&self.asset_path(), ctx.big_endian)
                .map_err(|e| BuildError::io(&self.asset_path(), e))?;
            self.header = Some(header);
        } else if from == AssetLocation::CACHE {
            self.commit_from_cache(ctx)?;
        } else {
            return Err(BuildError::new(
                ErrorCode::DependencyCacheFailure,
                format!("Attempted to commit non-existing asset {}", self.handle.name()),
            ));
        }

        if self.location(AssetLocation::OUTPUT, true, false, ctx).is_empty() {
            return Err(BuildError::internal(format!(
                "Failure to commit asset {}",
                self.handle.name()
            )));
        }
        if from == AssetLocation::MEMORY {
            self.copy_to_cache(ctx);
        }
        if from == AssetLocation::CACHE || ctx.always_touch_cache {
            self.touch_cache();
        }
        Ok(from)
    }

    fn commit_from_cache(&mut self, ctx: &AssetContext<'_>) -> BuildResult<()> {
        let Some((asset, cdata)) = self.cache_paths() else {
            return Err(BuildError::internal(format!(
                "Asset {} has no build cache location",
                self.handle.name()
            )));
        };
        let open = |path: &Path| ctx.cache.open_read(path);
        let mut failures = 0;
        for attempt in 0..ctx.retry.attempts {
            if self.copy_from(&asset, &cdata, &open, ctx) {
                if failures > 0 {
                    tracing::info!(
                        asset = %self.handle.name(),
                        attempt = attempt + 1,
                        "copied asset from build cache after retrying"
                    );
                }
                let header = AssetHeader::read_file(&self.asset_path(), ctx.big_endian)
                    .map_err(|e| BuildError::io(&self.asset_path(), e))?;
                self.header = Some(header);
                return Ok(());
            }
            failures += 1;
            if attempt + 1 < ctx.retry.attempts && !ctx.retry.delay.is_zero() {
                std::thread::sleep(ctx.retry.delay);
            }
        }
        Err(BuildError::internal(format!(
            "Asset copy failed. Failure to commit asset {} from network ({}, {failures} failures)",
            self.handle.name(),
            asset.display()
        )))
    }

    fn update_header_from_output(&mut self, ctx: &AssetContext<'_>) -> BuildResult<()> {
        let path = self.asset_path();
        let len = std::fs::metadata(&path)
            .map_err(|e| BuildError::io(&path, e))?
            .len();
        let header = match self.header {
            Some(h) if h.matches(&self.handle) => h,
            _ => AssetHeader::read_file(&path, ctx.big_endian).map_err(|e| BuildError::io(&path, e))?,
        };
        if header.matches(&self.handle) && header.file_len() == len {
            self.header = Some(header);
            return Ok(());
        }

        tracing::warn!(
            asset = %self.handle.name(),
            expected = header.file_len(),
            actual = len,
            "asset file has an unexpected size, deleting it"
        );
        remove_stale(&path);
        self.header = None;
        self.known.remove(AssetLocation::OUTPUT);
        if self.location(AssetLocation::CACHE, true, false, ctx).is_empty() {
            return Err(BuildError::new(
                ErrorCode::UnexpectedSize,
                format!("Asset file {} has an unexpected size.", path.display()),
            ));
        }
        if let Some((cached, _)) = self.cache_paths() {
            let valid = AssetHeader::read_file(&cached, ctx.big_endian)
                .ok()
                .zip(std::fs::metadata(&cached).ok())
                .is_some_and(|(h, m)| h.matches(&self.handle) && h.file_len() == m.len());
            if !valid {
                remove_stale(&cached);
                return Err(BuildError::new(
                    ErrorCode::UnexpectedSize,
                    "Can't recover from last error. Please restart to rebuild asset.",
                ));
            }
        }
        self.commit_from_cache(ctx)
    }

    fn write_from_memory(&mut self, big_endian: bool) -> BuildResult<()> {
        let Some(buffer) = self.buffer.take() else {
            return Err(BuildError::internal(format!(
                "Asset {} has no compiled data",
                self.handle.name()
            )));
        };
        let header = AssetHeader::new(&self.handle, &buffer);
        let path = self.asset_path();
        let tmp = with_suffix(&path, ".tmp");
        let write = || -> io::Result<()> {
            std::fs::create_dir_all(&self.asset_dir)?;
            let mut file = File::create(&tmp)?;
            file.write_all(&header.to_bytes(big_endian))?;
            file.write_all(&buffer.instance_data)?;
            file.write_all(&buffer.relocation_data)?;
            file.write_all(&buffer.imports_data)?;
            file.sync_all()?;
            drop(file);
            std::fs::rename(&tmp, &path)
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp);
            return Err(BuildError::io(&path, e));
        }
        self.header = Some(header);
        self.known.remove(AssetLocation::MEMORY);
        Ok(())
    }

    /// Copies the asset (and custom data) from another location, checking identity.
    fn copy_from(
        &self,
        asset: &Path,
        cdata: &Path,
        open: &dyn Fn(&Path) -> io::Result<Box<dyn Read + Send>>,
        ctx: &AssetContext<'_>,
    ) -> bool {
        let dest = self.asset_path();
        let dest_cdata = self.cdata_path();
        let result = (|| -> io::Result<bool> {
            let mut reader = open(asset)?;
            let header = AssetHeader::read(&mut reader, ctx.big_endian)?;
            if !header.matches(&self.handle) {
                tracing::warn!(
                    asset = %self.handle.name(),
                    source = %asset.display(),
                    "asset header does not match the requested instance"
                );
                return Ok(false);
            }
            std::fs::create_dir_all(&self.asset_dir)?;
            let tmp = with_suffix(&dest, ".tmp");
            let mut out = File::create(&tmp)?;
            out.write_all(&header.to_bytes(ctx.big_endian))?;
            let copied = copy_stream(&mut reader, &mut out, ctx.copy_buffer)?;
            drop(out);
            if copied != header.payload_len() {
                let _ = std::fs::remove_file(&tmp);
                return Ok(false);
            }
            std::fs::rename(&tmp, &dest)?;
            if self.has_custom_data {
                std::fs::create_dir_all(&self.cdata_dir)?;
                let mut reader = open(cdata)?;
                let tmp = with_suffix(&dest_cdata, ".tmp");
                let mut out = File::create(&tmp)?;
                copy_stream(&mut reader, &mut out, ctx.copy_buffer)?;
                drop(out);
                std::fs::rename(&tmp, &dest_cdata)?;
            }
            Ok(true)
        })();
        match result {
            Ok(true) => true,
            Ok(false) => {
                let _ = std::fs::remove_file(&dest);
                false
            }
            Err(e) => {
                tracing::debug!(source = %asset.display(), "asset copy failed: {e}");
                let _ = std::fs::remove_file(with_suffix(&dest, ".tmp"));
                let _ = std::fs::remove_file(with_suffix(&dest_cdata, ".tmp"));
                let _ = std::fs::remove_file(&dest);
                false
            }
        }
    }

    /// Publishes a freshly compiled asset to the shared cache.
    fn copy_to_cache(&self, ctx: &AssetContext<'_>) {
        let Some((asset, cdata)) = self.cache_paths() else {
            return;
        };
        let mut pairs = vec![(self.asset_path(), asset)];
        if self.has_custom_data {
            pairs.push((self.cdata_path(), cdata));
        }
        for (from, to) in pairs {
            let result = if to.is_file() {
                touch(&to)
            } else {
                copy_file(&from, &to, ctx.copy_buffer)
            };
            if let Err(e) = result {
                tracing::warn!(
                    "Could not copy {} to build cache {}: {e}",
                    from.display(),
                    to.display()
                );
            }
        }
    }

    /// Refreshes the cache entry's timestamps.
    fn touch_cache(&self) {
        let Some((asset, cdata)) = self.cache_paths() else {
            return;
        };
        for path in [asset, cdata] {
            if path.is_file() {
                if let Err(e) = touch(&path) {
                    tracing::debug!(path = %path.display(), "could not touch cache entry: {e}");
                }
            }
        }
    }

    /// Reads the three payload sections back from the output file.
    pub fn read_sections(&self, big_endian: bool) -> BuildResult<AssetBuffer> {
        let path = self.asset_path();
        let bytes = std::fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
        let Some(head) = bytes.first_chunk::<{ AssetHeader::SIZE }>() else {
            return Err(BuildError::new(
                ErrorCode::UnexpectedSize,
                format!("Asset file {} is truncated.", path.display()),
            ));
        };
        let header = AssetHeader::from_bytes(head, big_endian);
        if header.file_len() != bytes.len() as u64 {
            return Err(BuildError::new(
                ErrorCode::UnexpectedSize,
                format!("Asset file {} has an unexpected size.", path.display()),
            ));
        }
        let body = &bytes[AssetHeader::SIZE..];
        let (instance, rest) = body.split_at(header.instance_size as usize);
        let (relocation, imports) = rest.split_at(header.relocation_size as usize);
        Ok(AssetBuffer {
            instance_data: instance.to_vec(),
            relocation_data: relocation.to_vec(),
            imports_data: imports.to_vec(),
        })
    }
}

fn open_fs(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    Ok(Box::new(File::open(path)?))
}

fn copy_stream(reader: &mut dyn Read, out: &mut dyn Write, buffer: &Mutex<Vec<u8>>) -> io::Result<u64> {
    let mut buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
    if buf.len() < COPY_CHUNK {
        buf.resize(COPY_CHUNK, 0);
    }
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf[..])?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

fn copy_file(from: &Path, to: &Path, buffer: &Mutex<Vec<u8>>) -> io::Result<()> {
    if let Some(dir) = to.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = with_suffix(to, ".tmp");
    let mut reader = File::open(from)?;
    let mut out = File::create(&tmp)?;
    copy_stream(&mut reader, &mut out, buffer)?;
    drop(out);
    std::fs::rename(&tmp, to)
}

fn remove_stale(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!(path = %path.display(), "could not delete stale asset: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingCache {
        opens: AtomicU32,
        failures: u32,
    }

    impl CacheAccess for CountingCache {
        fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            Ok(Box::new(File::open(path)?))
        }
    }

    fn handle() -> InstanceHandle {
        InstanceHandle::with_hashes("Weapon", 0x11, "Gun", 0x22)
    }

    fn buffer() -> AssetBuffer {
        AssetBuffer {
            instance_data: b"payload".to_vec(),
            relocation_data: vec![1, 2, 3, 4],
            imports_data: Vec::new(),
        }
    }

    fn write_asset(dir: &Path, handle: &InstanceHandle) {
        std::fs::create_dir_all(dir).unwrap();
        let header = AssetHeader::new(handle, &buffer());
        let mut bytes = header.to_bytes(false).to_vec();
        bytes.extend_from_slice(b"payload");
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        std::fs::write(dir.join(format!("{}.asset", handle.file_base())), bytes).unwrap();
    }

    fn context<'a>(
        last_written: &'a BTreeMap<String, WrittenAsset>,
        cache: &'a dyn CacheAccess,
        copy_buffer: &'a Mutex<Vec<u8>>,
    ) -> AssetContext<'a> {
        AssetContext {
            big_endian: false,
            last_written,
            cache,
            copy_buffer,
            retry: RetryPolicy {
                attempts: 20,
                delay: Duration::ZERO,
            },
            always_touch_cache: false,
        }
    }

    #[test]
    fn header_round_trip_both_endians() {
        let header = AssetHeader::new(&handle(), &buffer());
        for big in [false, true] {
            assert_eq!(AssetHeader::from_bytes(&header.to_bytes(big), big), header);
        }
        assert_eq!(header.file_len(), 28 + 11);
        assert_eq!(header.file_base(), handle().file_base());
    }

    #[test]
    fn memory_commit_writes_and_publishes_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let last = BTreeMap::new();
        let copy = Mutex::new(Vec::new());
        let ctx = context(&last, &FsCacheAccess, &copy);
        let mut asset = BinaryAsset::new(
            handle(),
            false,
            dir.path().join("out/assets"),
            dir.path().join("out/cdata"),
            Some(dir.path().join("cache")),
        );
        asset.set_buffer(buffer());
        assert_eq!(asset.commit(&ctx).unwrap(), AssetLocation::MEMORY);
        assert!(asset.asset_path().is_file());
        assert!(dir
            .path()
            .join("cache")
            .join(format!("{}.asset", handle().file_base()))
            .is_file());
        assert_eq!(asset.read_sections(false).unwrap(), buffer());
        // A second commit finds it in the output.
        assert_eq!(asset.commit(&ctx).unwrap(), AssetLocation::OUTPUT);
    }

    #[test]
    fn local_is_preferred_over_cache() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle();
        write_asset(&dir.path().join("other/assets"), &h);
        write_asset(&dir.path().join("cache"), &h);
        let mut last = BTreeMap::new();
        last.insert(
            h.file_base(),
            WrittenAsset {
                asset_dir: dir.path().join("other/assets"),
                cdata_dir: dir.path().join("other/cdata"),
            },
        );
        let cache = CountingCache {
            opens: AtomicU32::new(0),
            failures: 0,
        };
        let copy = Mutex::new(Vec::new());
        let ctx = context(&last, &cache, &copy);
        let mut asset = BinaryAsset::new(
            h.clone(),
            false,
            dir.path().join("out/assets"),
            dir.path().join("out/cdata"),
            Some(dir.path().join("cache")),
        );
        let all = asset.location(AssetLocation::ALL, false, true, &ctx);
        assert_eq!(all, AssetLocation::LOCAL | AssetLocation::CACHE);
        assert_eq!(asset.commit(&ctx).unwrap(), AssetLocation::LOCAL);
        assert_eq!(cache.opens.load(Ordering::SeqCst), 0);
        assert!(asset.header().unwrap().matches(&h));
        assert!(asset.asset_path().is_file());
    }

    #[test]
    fn cache_copy_retries_until_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle();
        write_asset(&dir.path().join("cache"), &h);
        let last = BTreeMap::new();
        let cache = CountingCache {
            opens: AtomicU32::new(0),
            failures: 3,
        };
        let copy = Mutex::new(Vec::new());
        let ctx = context(&last, &cache, &copy);
        let mut asset = BinaryAsset::new(
            h.clone(),
            false,
            dir.path().join("out/assets"),
            dir.path().join("out/cdata"),
            Some(dir.path().join("cache")),
        );
        assert_eq!(asset.commit(&ctx).unwrap(), AssetLocation::CACHE);
        assert_eq!(cache.opens.load(Ordering::SeqCst), 4);
        let header = AssetHeader::read_file(&asset.asset_path(), false).unwrap();
        assert!(header.matches(&h));
    }

    #[test]
    fn exhausted_retries_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle();
        write_asset(&dir.path().join("cache"), &h);
        let last = BTreeMap::new();
        let cache = CountingCache {
            opens: AtomicU32::new(0),
            failures: u32::MAX,
        };
        let copy = Mutex::new(Vec::new());
        let ctx = context(&last, &cache, &copy);
        let mut asset = BinaryAsset::new(
            h,
            false,
            dir.path().join("out/assets"),
            dir.path().join("out/cdata"),
            Some(dir.path().join("cache")),
        );
        let err = asset.commit(&ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.starts_with("Asset copy failed."));
        assert_eq!(cache.opens.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn mismatched_header_is_not_copied() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle();
        // Cached under the right name but with another instance's header.
        let other = InstanceHandle::with_hashes("Weapon", 0x11, "Other", 0x22);
        write_asset(&dir.path().join("scratch"), &other);
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        std::fs::copy(
            dir.path().join("scratch").join(format!("{}.asset", other.file_base())),
            dir.path().join("cache").join(format!("{}.asset", h.file_base())),
        )
        .unwrap();
        let last = BTreeMap::new();
        let copy = Mutex::new(Vec::new());
        let mut ctx = context(&last, &FsCacheAccess, &copy);
        ctx.retry.attempts = 2;
        let mut asset = BinaryAsset::new(
            h,
            false,
            dir.path().join("out/assets"),
            dir.path().join("out/cdata"),
            Some(dir.path().join("cache")),
        );
        assert!(asset.commit(&ctx).is_err());
        assert!(!asset.asset_path().exists());
    }

    fn write_oversized_asset(dir: &Path, handle: &InstanceHandle) -> PathBuf {
        write_asset(dir, handle);
        let path = dir.join(format!("{}.asset", handle.file_base()));
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"trailing");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn oversized_output_is_replaced_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle();
        let output = write_oversized_asset(&dir.path().join("out/assets"), &h);
        write_asset(&dir.path().join("cache"), &h);
        let last = BTreeMap::new();
        let copy = Mutex::new(Vec::new());
        let ctx = context(&last, &FsCacheAccess, &copy);
        let mut asset = BinaryAsset::new(
            h.clone(),
            false,
            dir.path().join("out/assets"),
            dir.path().join("out/cdata"),
            Some(dir.path().join("cache")),
        );
        assert_eq!(asset.commit(&ctx).unwrap(), AssetLocation::OUTPUT);
        let header = asset.header().copied().unwrap();
        assert!(header.matches(&h));
        assert_eq!(std::fs::metadata(&output).unwrap().len(), header.file_len());
    }

    #[test]
    fn oversized_output_without_cache_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle();
        let output = write_oversized_asset(&dir.path().join("out/assets"), &h);
        let last = BTreeMap::new();
        let copy = Mutex::new(Vec::new());
        let ctx = context(&last, &FsCacheAccess, &copy);
        let mut asset = BinaryAsset::new(h, false, dir.path().join("out/assets"), dir.path().join("out/cdata"), None);
        let err = asset.commit(&ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedSize);
        assert!(!output.exists());
        // Already gone: a second delete only logs.
        remove_stale(&output);
    }

    #[test]
    fn nothing_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        let last = BTreeMap::new();
        let copy = Mutex::new(Vec::new());
        let ctx = context(&last, &FsCacheAccess, &copy);
        let mut asset = BinaryAsset::new(handle(), false, dir.path().join("a"), dir.path().join("c"), None);
        assert!(asset.location(AssetLocation::ALL, false, false, &ctx).is_empty());
        let err = asset.commit(&ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::DependencyCacheFailure);
    }
}
