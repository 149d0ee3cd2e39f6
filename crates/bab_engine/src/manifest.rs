//! Stream manifests.
//!
//! A manifest is the binary index of one stream: a fixed header, one entry per
//! output asset in stream order, then four variable-length buffers (reference ids,
//! referenced manifest names, asset names, source file names).

use crate::asset::AssetHeader;
use bab_common::{fast_hash, BuildError, BuildResult, ErrorCode, InstanceHandle};
use std::collections::HashMap;
use std::path::Path;

/// Format version written by this build.
pub const LATEST_VERSION: u32 = 5;

fn put(out: &mut Vec<u8>, value: u32, big_endian: bool) {
    if big_endian {
        out.extend_from_slice(&value.to_be_bytes());
    } else {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
    big_endian: bool,
}

impl Reader<'_> {
    fn u32(&mut self) -> Option<u32> {
        let raw: [u8; 4] = self.bytes.get(self.at..self.at + 4)?.try_into().ok()?;
        self.at += 4;
        Some(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    fn take(&mut self, len: usize) -> Option<&[u8]> {
        let slice = self.bytes.get(self.at..self.at.checked_add(len)?)?;
        self.at += len;
        Some(slice)
    }
}

/// Fixed manifest header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManifestHeader {
    /// Format version.
    pub version: u32,
    /// Whether linked stream files accompany the manifest.
    pub is_linked: bool,
    /// Hash over the ordered asset identities and reference counts.
    pub stream_checksum: u32,
    /// Aggregate type hash of the compilers.
    pub all_types_hash: u32,
    /// Number of entries.
    pub asset_count: u32,
    /// Sum of all instance sections.
    pub total_instance_size: u32,
    /// Largest instance section.
    pub max_instance_size: u32,
    /// Largest relocation section.
    pub max_relocation_size: u32,
    /// Largest imports section.
    pub max_imports_size: u32,
    /// Size of the reference buffer in bytes.
    pub reference_buffer_size: u32,
    /// Size of the referenced-manifest buffer in bytes.
    pub manifest_buffer_size: u32,
    /// Size of the asset-name buffer in bytes.
    pub name_buffer_size: u32,
    /// Size of the source-name buffer in bytes.
    pub source_buffer_size: u32,
}

impl ManifestHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 52;

    fn write(&self, out: &mut Vec<u8>, be: bool) {
        for v in [
            self.version,
            u32::from(self.is_linked),
            self.stream_checksum,
            self.all_types_hash,
            self.asset_count,
            self.total_instance_size,
            self.max_instance_size,
            self.max_relocation_size,
            self.max_imports_size,
            self.reference_buffer_size,
            self.manifest_buffer_size,
            self.name_buffer_size,
            self.source_buffer_size,
        ] {
            put(out, v, be);
        }
    }

    fn read(r: &mut Reader<'_>) -> Option<Self> {
        Some(Self {
            version: r.u32()?,
            is_linked: r.u32()? != 0,
            stream_checksum: r.u32()?,
            all_types_hash: r.u32()?,
            asset_count: r.u32()?,
            total_instance_size: r.u32()?,
            max_instance_size: r.u32()?,
            max_relocation_size: r.u32()?,
            max_imports_size: r.u32()?,
            reference_buffer_size: r.u32()?,
            manifest_buffer_size: r.u32()?,
            name_buffer_size: r.u32()?,
            source_buffer_size: r.u32()?,
        })
    }
}

/// One asset of the stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssetEntry {
    /// Identity and section sizes.
    pub header: AssetHeader,
    /// Index of the first reference in the reference buffer.
    pub reference_offset: u32,
    /// Number of references.
    pub reference_count: u32,
    /// Byte offset of the asset name.
    pub name_offset: u32,
    /// Byte offset of the source file name.
    pub source_offset: u32,
    /// Whether the payload's strings are tokenized.
    pub tokenized: bool,
}

impl AssetEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = 48;

    fn write(&self, out: &mut Vec<u8>, be: bool) {
        let h = &self.header;
        for v in [
            h.type_id,
            h.type_hash,
            h.instance_id,
            h.instance_hash,
            h.instance_size,
            h.relocation_size,
            h.imports_size,
            self.reference_offset,
            self.reference_count,
            self.name_offset,
            self.source_offset,
            u32::from(self.tokenized),
        ] {
            put(out, v, be);
        }
    }

    fn read(r: &mut Reader<'_>) -> Option<Self> {
        Some(Self {
            header: AssetHeader {
                type_id: r.u32()?,
                type_hash: r.u32()?,
                instance_id: r.u32()?,
                instance_hash: r.u32()?,
                instance_size: r.u32()?,
                relocation_size: r.u32()?,
                imports_size: r.u32()?,
            },
            reference_offset: r.u32()?,
            reference_count: r.u32()?,
            name_offset: r.u32()?,
            source_offset: r.u32()?,
            tokenized: r.u32()? != 0,
        })
    }
}

/// What the output manager knows about one asset when writing the manifest.
#[derive(Clone, Debug)]
pub struct ManifestAsset {
    /// Identity and sizes from the committed asset.
    pub header: AssetHeader,
    /// Display name, `Type:Instance`.
    pub name: String,
    /// Source document.
    pub source: String,
    /// Resolved strong references.
    pub references: Vec<InstanceHandle>,
    /// Whether the payload's strings are tokenized.
    pub tokenized: bool,
}

/// Checksum over the ordered `(type id, type hash, instance id, instance hash, reference count)` tuples.
pub fn stream_checksum(assets: &[ManifestAsset]) -> u32 {
    let mut bytes = Vec::with_capacity(assets.len() * 20);
    for a in assets {
        for v in [
            a.header.type_id,
            a.header.type_hash,
            a.header.instance_id,
            a.header.instance_hash,
            a.references.len() as u32,
        ] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    fast_hash(&bytes)
}

fn push_name(buffer: &mut Vec<u8>, offsets: &mut HashMap<String, u32>, name: &str) -> u32 {
    if let Some(&at) = offsets.get(name) {
        return at;
    }
    let at = buffer.len() as u32;
    buffer.extend_from_slice(name.as_bytes());
    buffer.push(0);
    offsets.insert(name.to_string(), at);
    at
}

fn read_name(buffer: &[u8], offset: u32) -> String {
    let start = (offset as usize).min(buffer.len());
    let end = buffer[start..]
        .iter()
        .position(|&b| b == 0)
        .map_or(buffer.len(), |p| start + p);
    String::from_utf8_lossy(&buffer[start..end]).into_owned()
}

/// A loaded or freshly built manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Header.
    pub header: ManifestHeader,
    /// Entries in stream order.
    pub entries: Vec<AssetEntry>,
    /// `(type id, instance id)` pairs.
    pub references: Vec<(u32, u32)>,
    /// Referenced manifests; the base patch stream comes first.
    pub referenced_manifests: Vec<String>,
    names: Vec<u8>,
    sources: Vec<u8>,
}

impl Manifest {
    /// Builds the manifest for `assets` in their stream order.
    pub fn build(
        assets: &[ManifestAsset],
        referenced_manifests: Vec<String>,
        all_types_hash: u32,
        is_linked: bool,
    ) -> Self {
        let mut header = ManifestHeader {
            version: LATEST_VERSION,
            is_linked,
            stream_checksum: stream_checksum(assets),
            all_types_hash,
            asset_count: assets.len() as u32,
            ..ManifestHeader::default()
        };
        let mut entries = Vec::with_capacity(assets.len());
        let mut references = Vec::new();
        let mut names = Vec::new();
        let mut sources = Vec::new();
        let mut name_offsets = HashMap::new();
        let mut source_offsets = HashMap::new();
        for asset in assets {
            let h = asset.header;
            header.total_instance_size = header.total_instance_size.wrapping_add(h.instance_size);
            header.max_instance_size = header.max_instance_size.max(h.instance_size);
            header.max_relocation_size = header.max_relocation_size.max(h.relocation_size);
            header.max_imports_size = header.max_imports_size.max(h.imports_size);
            let reference_offset = references.len() as u32;
            references.extend(
                asset
                    .references
                    .iter()
                    .map(|r| (r.type_id(), r.instance_id())),
            );
            entries.push(AssetEntry {
                header: h,
                reference_offset,
                reference_count: asset.references.len() as u32,
                name_offset: push_name(&mut names, &mut name_offsets, &asset.name),
                source_offset: push_name(&mut sources, &mut source_offsets, &asset.source),
                tokenized: asset.tokenized,
            });
        }
        let manifest_bytes: usize = referenced_manifests.iter().map(|m| m.len() + 1).sum();
        header.reference_buffer_size = (references.len() * 8) as u32;
        header.manifest_buffer_size = manifest_bytes as u32;
        header.name_buffer_size = names.len() as u32;
        header.source_buffer_size = sources.len() as u32;
        Self {
            header,
            entries,
            references,
            referenced_manifests,
            names,
            sources,
        }
    }

    /// Display name of entry `i`.
    pub fn entry_name(&self, i: usize) -> String {
        self.entries
            .get(i)
            .map(|e| read_name(&self.names, e.name_offset))
            .unwrap_or_default()
    }

    /// Source file of entry `i`.
    pub fn entry_source(&self, i: usize) -> String {
        self.entries
            .get(i)
            .map(|e| read_name(&self.sources, e.source_offset))
            .unwrap_or_default()
    }

    /// References of entry `i`.
    pub fn entry_references(&self, i: usize) -> &[(u32, u32)] {
        let Some(e) = self.entries.get(i) else {
            return &[];
        };
        let start = (e.reference_offset as usize).min(self.references.len());
        let end = (start + e.reference_count as usize).min(self.references.len());
        &self.references[start..end]
    }

    /// The handle of entry `i`, names and hashes included.
    pub fn entry_handle(&self, i: usize) -> Option<InstanceHandle> {
        let e = self.entries.get(i)?;
        let name = self.entry_name(i);
        let (type_name, instance_name) = name.split_once(':').unwrap_or(("", name.as_str()));
        let mut handle = InstanceHandle::with_hashes(
            type_name,
            e.header.type_hash,
            instance_name,
            e.header.instance_hash,
        );
        if handle.type_id() != e.header.type_id || handle.instance_id() != e.header.instance_id {
            // Names are informational; the ids are authoritative.
            handle = InstanceHandle::with_hashes(
                format!("{:08x}", e.header.type_id),
                e.header.type_hash,
                format!("{:08x}", e.header.instance_id),
                e.header.instance_hash,
            );
        }
        Some(handle)
    }

    /// Encodes the manifest.
    pub fn to_bytes(&self, big_endian: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            ManifestHeader::SIZE
                + self.entries.len() * AssetEntry::SIZE
                + self.header.reference_buffer_size as usize
                + self.header.manifest_buffer_size as usize
                + self.names.len()
                + self.sources.len(),
        );
        self.header.write(&mut out, big_endian);
        for e in &self.entries {
            e.write(&mut out, big_endian);
        }
        for &(t, i) in &self.references {
            put(&mut out, t, big_endian);
            put(&mut out, i, big_endian);
        }
        for m in &self.referenced_manifests {
            out.extend_from_slice(m.as_bytes());
            out.push(0);
        }
        out.extend_from_slice(&self.names);
        out.extend_from_slice(&self.sources);
        out
    }

    /// Decodes a manifest.
    pub fn from_bytes(bytes: &[u8], big_endian: bool) -> Option<Self> {
        let mut r = Reader {
            bytes,
            at: 0,
            big_endian,
        };
        let header = ManifestHeader::read(&mut r)?;
        let mut entries = Vec::with_capacity((header.asset_count as usize).min(bytes.len() / AssetEntry::SIZE));
        for _ in 0..header.asset_count {
            entries.push(AssetEntry::read(&mut r)?);
        }
        let mut references = Vec::with_capacity(header.reference_buffer_size as usize / 8);
        for _ in 0..header.reference_buffer_size / 8 {
            references.push((r.u32()?, r.u32()?));
        }
        let manifest_bytes = r.take(header.manifest_buffer_size as usize)?;
        let referenced_manifests = manifest_bytes
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        let names = r.take(header.name_buffer_size as usize)?.to_vec();
        let sources = r.take(header.source_buffer_size as usize)?.to_vec();
        if r.at != bytes.len() {
            return None;
        }
        Some(Self {
            header,
            entries,
            references,
            referenced_manifests,
            names,
            sources,
        })
    }

    /// Writes the manifest to `path`.
    pub fn write(&self, path: &Path, big_endian: bool) -> BuildResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
        }
        std::fs::write(path, self.to_bytes(big_endian)).map_err(|e| BuildError::io(path, e))
    }

    /// Reads the manifest at `path`.
    pub fn load(path: &Path, big_endian: bool) -> BuildResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| BuildError::io(path, e))?;
        Self::from_bytes(&bytes, big_endian).ok_or_else(|| {
            BuildError::new(
                ErrorCode::IncompatibleManifest,
                format!("Manifest file {} is corrupt or truncated.", path.display()),
            )
        })
    }

    /// Whether a precompiled manifest can stand in for a rebuild of its stream.
    pub fn check_compatible(&self, path: &Path, is_linked: bool, all_types_hash: u32) -> BuildResult<()> {
        let reason = if self.header.version != LATEST_VERSION {
            Some(format!(
                "version {} instead of {LATEST_VERSION}",
                self.header.version
            ))
        } else if self.header.is_linked != is_linked {
            Some("a different linking mode".to_string())
        } else if self.header.all_types_hash != all_types_hash {
            Some("a different type hash".to_string())
        } else {
            None
        };
        match reason {
            Some(reason) => Err(BuildError::new(
                ErrorCode::IncompatibleManifest,
                format!("Manifest {} has {reason}.", path.display()),
            )),
            None => Ok(()),
        }
    }

    /// Length of the unbroken prefix of this stream that lies in `base`.
    pub fn base_stream_position(&self, base: &Manifest) -> usize {
        self.entries
            .iter()
            .zip(&base.entries)
            .take_while(|(a, b)| a.header == b.header)
            .count()
    }
}
