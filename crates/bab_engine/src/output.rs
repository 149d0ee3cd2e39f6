//! The output side of one stream.
//!
//! An [`OutputManager`] owns the [`BinaryAsset`]s of one stream, knows the
//! previous run's manifest and the optional base patch stream, and at the end of
//! the build commits every output asset, writes the manifest and the linked stream
//! files, and deletes stale assets.

use crate::asset::{AssetContext, AssetHeader, AssetLocation, BinaryAsset};
use crate::manifest::{Manifest, ManifestAsset};
use crate::resolver::PathResolver;
use bab_common::{BuildError, BuildResult, ErrorCode, InstanceHandle, TargetPlatform};
use bab_config::Settings;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

/// One asset of the stream, in final order.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// The instance, with content hashes.
    pub handle: InstanceHandle,
    /// Source document of the instance.
    pub source: String,
    /// Resolved strong references.
    pub references: Vec<InstanceHandle>,
    /// Whether the payload's strings are tokenized.
    pub tokenized: bool,
}

/// What committing a stream did.
#[derive(Debug, Clone, Default)]
pub struct StreamReport {
    /// The manifest written (or kept).
    pub manifest_path: PathBuf,
    /// Checksum of the stream.
    pub checksum: u32,
    /// File bases materialized in this stream's directories.
    pub written: Vec<String>,
    /// Number of assets taken from each tier.
    pub from_tier: BTreeMap<&'static str, usize>,
    /// Whether the previous manifest was kept unchanged.
    pub manifest_unchanged: bool,
    /// Stale files deleted.
    pub deleted: usize,
}

fn tier_name(location: AssetLocation) -> &'static str {
    if location == AssetLocation::BASE_PATCH_STREAM {
        "base"
    } else if location == AssetLocation::OUTPUT {
        "output"
    } else if location == AssetLocation::MEMORY {
        "memory"
    } else if location == AssetLocation::LOCAL {
        "local"
    } else {
        "cache"
    }
}

/// A previously built stream this one is patched on top of.
#[derive(Debug)]
struct BaseStream {
    name: String,
    manifest: Manifest,
    headers: HashMap<(u32, u32), AssetHeader>,
    order: Vec<InstanceHandle>,
}

impl BaseStream {
    fn load(path: &Path, big_endian: bool) -> BuildResult<Self> {
        let manifest = Manifest::load(path, big_endian)?;
        let headers = manifest
            .entries
            .iter()
            .map(|e| ((e.header.type_id, e.header.instance_id), e.header))
            .collect();
        let order = (0..manifest.entries.len())
            .filter_map(|i| manifest.entry_handle(i))
            .collect();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(
            base = %path.display(),
            assets = manifest.entries.len(),
            "loaded base patch stream"
        );
        Ok(Self {
            name,
            manifest,
            headers,
            order,
        })
    }

    fn resident(&self, handle: &InstanceHandle) -> Option<&AssetHeader> {
        self.headers
            .get(&(handle.type_id(), handle.instance_id()))
            .filter(|h| h.matches(handle))
    }
}

/// Owns the assets of one stream.
#[derive(Debug)]
pub struct OutputManager {
    stream: String,
    manifest_path: PathBuf,
    old_manifest_path: PathBuf,
    asset_dir: PathBuf,
    cdata_dir: PathBuf,
    build_cache_dir: Option<PathBuf>,
    platform: TargetPlatform,
    big_endian: bool,
    version_file: Option<String>,
    force_slow_cleanup: bool,
    old_manifest: Option<Manifest>,
    old_manifest_corrupt: bool,
    old_headers: HashMap<String, AssetHeader>,
    base: Option<BaseStream>,
    assets: BTreeMap<InstanceHandle, BinaryAsset>,
}

fn manifest_sibling(manifest: &Path, suffix: &str) -> PathBuf {
    let name = manifest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".manifest").unwrap_or(&name);
    manifest.with_file_name(format!("{stem}{suffix}"))
}

impl OutputManager {
    /// Prepares the stream generated by the document at `source`.
    ///
    /// An existing manifest is moved aside to `.old.manifest` until the new one is
    /// committed.
    pub fn new(source: &Path, settings: &Settings, resolver: &PathResolver) -> BuildResult<Self> {
        let name = Self::stream_name(source, settings, resolver);
        let output_dir = &settings.paths.output_directory;
        let manifest_path = output_dir.join(format!("{name}.manifest"));
        let old_manifest_path = manifest_sibling(&manifest_path, ".old.manifest");
        let big_endian = settings.build.is_big_endian();
        let build_cache_dir = settings
            .build
            .build_cache
            .then(|| settings.paths.build_cache_directory.clone())
            .flatten();

        if manifest_path.is_file() {
            if old_manifest_path.is_file() {
                std::fs::remove_file(&old_manifest_path).map_err(|e| locked(&old_manifest_path, e))?;
            }
            std::fs::rename(&manifest_path, &old_manifest_path).map_err(|e| locked(&manifest_path, e))?;
        }
        let (old_manifest, old_manifest_corrupt) = if old_manifest_path.is_file() {
            match Manifest::load(&old_manifest_path, big_endian) {
                Ok(m) => (Some(m), false),
                Err(e) => {
                    tracing::warn!("Ignoring previous manifest {}: {e}", old_manifest_path.display());
                    (None, true)
                }
            }
        } else {
            (None, false)
        };
        let old_headers = old_manifest
            .iter()
            .flat_map(|m| m.entries.iter())
            .map(|e| (e.header.file_base(), e.header))
            .collect();

        let base = match &settings.output.base_patch_stream {
            Some(base_name) => Some(Self::find_base(base_name, settings, big_endian)?),
            None => None,
        };

        let version_file = settings.build.version_files.then(|| {
            if settings.output.custom_postfix.is_empty() {
                "  ".to_string()
            } else {
                settings.output.custom_postfix.clone()
            }
        });

        tracing::debug!(
            stream = %name,
            manifest = %manifest_path.display(),
            previous = old_manifest.is_some(),
            "opened stream output"
        );
        Ok(Self {
            stream: name.to_lowercase(),
            manifest_path,
            old_manifest_path,
            asset_dir: settings.paths.intermediate_directory().join("assets"),
            cdata_dir: output_dir.join("cdata"),
            build_cache_dir,
            platform: settings.build.target_platform,
            big_endian,
            version_file,
            force_slow_cleanup: settings.build.force_slow_cleanup,
            old_manifest,
            old_manifest_corrupt,
            old_headers,
            base,
            assets: BTreeMap::new(),
        })
    }

    fn find_base(name: &str, settings: &Settings, big_endian: bool) -> BuildResult<BaseStream> {
        let file = if name.ends_with(".manifest") {
            name.to_string()
        } else {
            format!("{name}.manifest")
        };
        let found = settings
            .output
            .base_patch_search_paths
            .iter()
            .chain(std::iter::once(&settings.paths.output_directory))
            .map(|dir| dir.join(&file))
            .find(|p| p.is_file());
        match found {
            Some(path) => BaseStream::load(&path, big_endian),
            None => Err(BuildError::new(
                ErrorCode::FileNotFound,
                format!("Base patch stream {file} not found"),
            )),
        }
    }

    /// File name, without extension, of the stream rooted at `source`.
    pub fn stream_name(source: &Path, settings: &Settings, resolver: &PathResolver) -> String {
        format!(
            "{}{}{}",
            resolver.path_from_root(source),
            settings.output.stream_postfix,
            settings.output.custom_postfix
        )
    }

    /// Lowercased stream name, used for stream hints.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// The manifest this stream writes.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Directory `.asset` files are written to.
    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    /// Directory `.cdata` files are written to.
    pub fn cdata_dir(&self) -> &Path {
        &self.cdata_dir
    }

    /// Whether a base patch stream is linked in.
    pub fn has_base_stream(&self) -> bool {
        self.base.is_some()
    }

    /// Order of the base patch stream, empty without one.
    pub fn base_order(&self) -> &[InstanceHandle] {
        self.base.as_ref().map_or(&[], |b| b.order.as_slice())
    }

    fn cache_dir_for(&self, handle: &InstanceHandle, use_build_cache: bool) -> Option<PathBuf> {
        if !use_build_cache {
            return None;
        }
        let root = self.build_cache_dir.as_ref()?;
        Some(
            root.join(self.platform.name())
                .join(handle.type_name())
                .join(format!("{:08x}", handle.type_hash))
                .join(format!("{:02x}", handle.instance_hash >> 24)),
        )
    }

    /// The asset of `handle`, created on first use and pointed at its current hashes.
    pub fn asset(
        &mut self,
        handle: &InstanceHandle,
        has_custom_data: bool,
        use_build_cache: bool,
    ) -> &mut BinaryAsset {
        let cache_dir = self.cache_dir_for(handle, use_build_cache);
        let in_base = self
            .base
            .as_ref()
            .is_some_and(|b| b.resident(handle).is_some());
        let old_header = self.old_headers.get(&handle.file_base()).copied();
        let asset = match self.assets.entry(handle.clone()) {
            Entry::Occupied(e) => {
                let asset = e.into_mut();
                asset.update_instance(handle, has_custom_data, cache_dir);
                asset
            }
            Entry::Vacant(e) => e.insert(BinaryAsset::new(
                handle.clone(),
                has_custom_data,
                self.asset_dir.clone(),
                self.cdata_dir.clone(),
                cache_dir,
            )),
        };
        if asset.header().is_none() {
            if let Some(header) = old_header {
                asset.prefill_header(header);
            }
        }
        asset.set_in_base_stream(in_base);
        asset
    }

    /// The asset of `handle`, if one was created.
    pub fn existing_asset(&self, handle: &InstanceHandle) -> Option<&BinaryAsset> {
        self.assets.get(handle)
    }

    /// Commits every entry, then writes the manifest and linked files and cleans up.
    ///
    /// `keep` names file bases that must survive cleanup in addition to the
    /// stream's own output.
    pub fn commit_stream(
        &mut self,
        entries: &[StreamEntry],
        referenced_manifests: Vec<String>,
        all_types_hash: u32,
        linked: bool,
        keep: &HashSet<String>,
        ctx: &AssetContext<'_>,
    ) -> BuildResult<StreamReport> {
        let prefix = self.base_prefix(entries);
        if linked {
            // Base assets after the unbroken prefix must be linked from the output.
            for entry in &entries[prefix..] {
                if let Some(asset) = self.assets.get_mut(&entry.handle) {
                    asset.set_in_base_stream(false);
                }
            }
        }

        let mut report = StreamReport {
            manifest_path: self.manifest_path.clone(),
            ..StreamReport::default()
        };
        let mut assets = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(asset) = self.assets.get_mut(&entry.handle) else {
                return Err(BuildError::internal(format!(
                    "Asset {} was never prepared for output",
                    entry.handle.name()
                )));
            };
            asset.is_output = true;
            let from = asset.commit(ctx)?;
            *report.from_tier.entry(tier_name(from)).or_default() += 1;
            let header = if from == AssetLocation::BASE_PATCH_STREAM {
                self.base
                    .as_ref()
                    .and_then(|b| b.resident(&entry.handle))
                    .copied()
            } else {
                report.written.push(entry.handle.file_base());
                asset.header().copied()
            };
            let Some(header) = header else {
                return Err(BuildError::internal(format!(
                    "Asset {} has no header after commit",
                    entry.handle.name()
                )));
            };
            assets.push(ManifestAsset {
                header,
                name: entry.handle.name(),
                source: entry.source.clone(),
                references: entry.references.clone(),
                tokenized: entry.tokenized,
            });
        }

        let mut manifests = Vec::with_capacity(referenced_manifests.len() + 1);
        if let Some(base) = &self.base {
            manifests.push(base.name.clone());
        }
        manifests.extend(referenced_manifests);
        let manifest = Manifest::build(&assets, manifests, all_types_hash, linked);
        report.checksum = manifest.header.stream_checksum;
        report.manifest_unchanged = self.write_manifest(&manifest)?;

        if linked {
            self.link_stream(entries, report.checksum, prefix)?;
        }
        let mut keep_all: HashSet<String> = entries.iter().map(|e| e.handle.file_base()).collect();
        keep_all.extend(keep.iter().cloned());
        report.deleted = self.cleanup(&keep_all);
        if let Some(text) = &self.version_file {
            let path = manifest_sibling(&self.manifest_path, ".version");
            std::fs::write(&path, text).map_err(|e| BuildError::io(&path, e))?;
        }
        tracing::info!(
            stream = %self.stream,
            assets = entries.len(),
            checksum = format_args!("{:08x}", report.checksum),
            "committed stream"
        );
        Ok(report)
    }

    /// Length of the unbroken run of leading entries resident in the base stream.
    fn base_prefix(&self, entries: &[StreamEntry]) -> usize {
        let Some(base) = &self.base else {
            return 0;
        };
        entries
            .iter()
            .zip(base.manifest.entries.iter())
            .take_while(|(entry, base_entry)| base_entry.header.matches(&entry.handle))
            .count()
    }

    fn write_manifest(&mut self, manifest: &Manifest) -> BuildResult<bool> {
        let unchanged = self
            .old_manifest
            .as_ref()
            .is_some_and(|old| old.header == manifest.header);
        if unchanged && self.old_manifest_path.is_file() {
            tracing::info!("Old manifest is up to date");
            std::fs::rename(&self.old_manifest_path, &self.manifest_path)
                .map_err(|e| locked(&self.old_manifest_path, e))?;
            return Ok(true);
        }
        manifest.write(&self.manifest_path, self.big_endian)?;
        if self.old_manifest_path.is_file() {
            std::fs::remove_file(&self.old_manifest_path).map_err(|e| locked(&self.old_manifest_path, e))?;
        }
        Ok(false)
    }

    fn link_stream(&self, entries: &[StreamEntry], checksum: u32, prefix: usize) -> BuildResult<()> {
        let stamp = if self.big_endian {
            checksum.to_be_bytes()
        } else {
            checksum.to_le_bytes()
        };
        let targets: Vec<(usize, PathBuf)> = [".bin", ".imp", ".relo"]
            .into_iter()
            .enumerate()
            .map(|(i, ext)| (i, manifest_sibling(&self.manifest_path, ext)))
            .filter(|(_, path)| stored_checksum(path) != Some(stamp))
            .collect();
        if targets.is_empty() {
            tracing::debug!(stream = %self.stream, "linked stream files are up to date");
            return Ok(());
        }
        let mut buffers = [stamp.to_vec(), stamp.to_vec(), stamp.to_vec()];
        for entry in &entries[prefix..] {
            let Some(asset) = self.assets.get(&entry.handle) else {
                continue;
            };
            let sections = asset.read_sections(self.big_endian)?;
            buffers[0].extend_from_slice(&sections.instance_data);
            buffers[1].extend_from_slice(&sections.imports_data);
            buffers[2].extend_from_slice(&sections.relocation_data);
        }
        for (i, path) in targets {
            let tmp = manifest_sibling(&path, ".tmp");
            std::fs::write(&tmp, &buffers[i]).map_err(|e| BuildError::io(&tmp, e))?;
            std::fs::rename(&tmp, &path).map_err(|e| locked(&path, e))?;
        }
        Ok(())
    }

    fn cleanup(&self, keep: &HashSet<String>) -> usize {
        let mut deleted = 0;
        let mut remove = |path: PathBuf| {
            if path.is_file() {
                match std::fs::remove_file(&path) {
                    Ok(()) => deleted += 1,
                    Err(e) => tracing::warn!("Could not delete stale file {}: {e}", path.display()),
                }
            }
        };
        let slow = self.force_slow_cleanup || self.old_manifest_corrupt;
        if slow {
            tracing::debug!(stream = %self.stream, "scanning output directories for stale assets");
            for dir in [&self.asset_dir, &self.cdata_dir] {
                let Ok(read) = std::fs::read_dir(dir) else {
                    continue;
                };
                for entry in read.flatten() {
                    let path = entry.path();
                    let is_asset = matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("asset" | "cdata")
                    );
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if is_asset && !keep.contains(&stem) {
                        remove(path);
                    }
                }
            }
        } else if let Some(old) = &self.old_manifest {
            for entry in &old.entries {
                let base = entry.header.file_base();
                if keep.contains(&base) {
                    continue;
                }
                if self
                    .base
                    .as_ref()
                    .is_some_and(|b| b.headers.values().any(|h| *h == entry.header))
                {
                    continue;
                }
                remove(self.asset_dir.join(format!("{base}.asset")));
                remove(self.cdata_dir.join(format!("{base}.cdata")));
            }
        }
        deleted
    }
}

fn locked(path: &Path, err: std::io::Error) -> BuildError {
    BuildError::new(
        ErrorCode::LockedFile,
        format!("Could not replace {}: {err}", path.display()),
    )
}

fn stored_checksum(path: &Path) -> Option<[u8; 4]> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut stamp = [0u8; 4];
    file.read_exact(&mut stamp).ok()?;
    Some(stamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{FsCacheAccess, RetryPolicy, WrittenAsset};
    use crate::plugin::AssetBuffer;
    use bab_config::PathSettings;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.paths.output_directory = dir.join("out");
        settings
    }

    fn handle(name: &str, hash: u32) -> InstanceHandle {
        InstanceHandle::with_hashes("Weapon", 7, name, hash)
    }

    fn buffer(bytes: &[u8]) -> AssetBuffer {
        AssetBuffer {
            instance_data: bytes.to_vec(),
            relocation_data: vec![1, 2],
            imports_data: vec![3],
        }
    }

    fn entry(h: &InstanceHandle) -> StreamEntry {
        StreamEntry {
            handle: h.clone(),
            source: "/data/w.xml".to_string(),
            references: Vec::new(),
            tokenized: false,
        }
    }

    struct Env {
        written: BTreeMap<String, WrittenAsset>,
        copy: Mutex<Vec<u8>>,
    }

    impl Env {
        fn new() -> Self {
            Self {
                written: BTreeMap::new(),
                copy: Mutex::new(Vec::new()),
            }
        }

        fn ctx(&self) -> AssetContext<'_> {
            AssetContext {
                big_endian: false,
                last_written: &self.written,
                cache: &FsCacheAccess,
                copy_buffer: &self.copy,
                retry: RetryPolicy::default(),
                always_touch_cache: false,
            }
        }
    }

    fn manager(dir: &Path, settings: &Settings) -> OutputManager {
        let resolver = PathResolver::new(&PathSettings::default(), "");
        OutputManager::new(&dir.join("stream.xml"), settings, &resolver).unwrap()
    }

    #[test]
    fn commit_writes_manifest_and_assets() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let env = Env::new();
        let mut om = manager(dir.path(), &settings);
        assert_eq!(om.stream(), "stream");
        let gun = handle("Gun", 1);
        om.asset(&gun, false, false).set_buffer(buffer(b"gun"));
        let report = om
            .commit_stream(&[entry(&gun)], Vec::new(), 5, false, &HashSet::new(), &env.ctx())
            .unwrap();
        assert_eq!(report.from_tier.get("memory"), Some(&1));
        assert!(!report.manifest_unchanged);
        let manifest = Manifest::load(om.manifest_path(), false).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.header.all_types_hash, 5);
        assert!(om.existing_asset(&gun).unwrap().asset_path().is_file());
    }

    #[test]
    fn unchanged_stream_keeps_old_manifest() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let env = Env::new();
        let gun = handle("Gun", 1);
        {
            let mut om = manager(dir.path(), &settings);
            om.asset(&gun, false, false).set_buffer(buffer(b"gun"));
            om.commit_stream(&[entry(&gun)], Vec::new(), 0, false, &HashSet::new(), &env.ctx())
                .unwrap();
        }
        let mut om = manager(dir.path(), &settings);
        assert!(!om.manifest_path().is_file());
        om.asset(&gun, false, false);
        let report = om
            .commit_stream(&[entry(&gun)], Vec::new(), 0, false, &HashSet::new(), &env.ctx())
            .unwrap();
        assert!(report.manifest_unchanged);
        assert_eq!(report.from_tier.get("output"), Some(&1));
        assert!(om.manifest_path().is_file());
        assert!(!manifest_sibling(om.manifest_path(), ".old.manifest").is_file());
    }

    #[test]
    fn stale_assets_are_deleted() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let env = Env::new();
        let old = handle("Gun", 1);
        let new = handle("Gun", 2);
        let stale_path = {
            let mut om = manager(dir.path(), &settings);
            om.asset(&old, false, false).set_buffer(buffer(b"old"));
            om.commit_stream(&[entry(&old)], Vec::new(), 0, false, &HashSet::new(), &env.ctx())
                .unwrap();
            om.existing_asset(&old).unwrap().asset_path()
        };
        assert!(stale_path.is_file());
        let mut om = manager(dir.path(), &settings);
        om.asset(&new, false, false).set_buffer(buffer(b"new"));
        let report = om
            .commit_stream(&[entry(&new)], Vec::new(), 0, false, &HashSet::new(), &env.ctx())
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!stale_path.is_file());
    }

    #[test]
    fn linked_files_carry_checksum() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        settings.build.version_files = true;
        let env = Env::new();
        let mut om = manager(dir.path(), &settings);
        let a = handle("A", 1);
        let b = handle("B", 2);
        om.asset(&a, false, false).set_buffer(buffer(b"aa"));
        om.asset(&b, false, false).set_buffer(buffer(b"bbb"));
        let report = om
            .commit_stream(&[entry(&a), entry(&b)], Vec::new(), 0, true, &HashSet::new(), &env.ctx())
            .unwrap();
        let bin = std::fs::read(manifest_sibling(om.manifest_path(), ".bin")).unwrap();
        assert_eq!(&bin[..4], &report.checksum.to_le_bytes());
        assert_eq!(&bin[4..], b"aabbb");
        let relo = std::fs::read(manifest_sibling(om.manifest_path(), ".relo")).unwrap();
        assert_eq!(&relo[4..], &[1, 2, 1, 2]);
        let imp = std::fs::read(manifest_sibling(om.manifest_path(), ".imp")).unwrap();
        assert_eq!(&imp[4..], &[3, 3]);
        let version = std::fs::read_to_string(manifest_sibling(om.manifest_path(), ".version")).unwrap();
        assert_eq!(version, "  ");
    }

    #[test]
    fn build_cache_layout() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        settings.build.build_cache = true;
        settings.paths.build_cache_directory = Some(dir.path().join("bc"));
        let om = manager(dir.path(), &settings);
        let h = InstanceHandle::with_hashes("Weapon", 0xabc, "Gun", 0x12345678);
        let cache = om.cache_dir_for(&h, true).unwrap();
        assert_eq!(
            cache,
            dir.path()
                .join("bc")
                .join(settings.build.target_platform.name())
                .join("Weapon")
                .join("00000abc")
                .join("12")
        );
        assert!(om.cache_dir_for(&h, false).is_none());
    }

    #[test]
    fn missing_base_stream_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        settings.output.base_patch_stream = Some("base".to_string());
        let resolver = PathResolver::new(&PathSettings::default(), "");
        let err = OutputManager::new(&dir.path().join("s.xml"), &settings, &resolver).unwrap_err();
        assert_eq!(err.code, ErrorCode::FileNotFound);
    }
}
