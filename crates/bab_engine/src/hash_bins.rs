//! Named string-hash bins.
//!
//! Every hash the build turns into an identity is recorded together with the text
//! it came from, so ids found in binary output can be mapped back to names. A hash
//! that maps to two different texts within one bin is a fatal collision. Bins are
//! written to `StringHashes.xml` after a build and merged back in on the next one.

use bab_common::{hash_text, BuildError, BuildResult, ErrorCode, InstanceHandle};
use bab_config::HashBinDescriptor;
use bab_xml::{Element, ASSET_NS};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Bin of instance names, case-insensitive.
pub const INSTANCE_ID_BIN: &str = "INSTANCEID";
/// Bin of type names, case-sensitive.
pub const TYPE_ID_BIN: &str = "TYPEID";
/// File the bins are persisted to, inside the output directory.
pub const STRING_HASHES_FILE: &str = "StringHashes.xml";

const TABLE_ELEMENT: &str = "StringHashTable";
const ENTRY_ELEMENT: &str = "StringAndHash";
const BIN_ATTRIBUTE: &str = "StringHashBin";

/// Version stamp of the persisted tables. Tables with another stamp are ignored.
pub fn hash_provider_version() -> u32 {
    hash_text(TABLE_ELEMENT) ^ 2
}

#[derive(Debug, Default)]
struct HashBin {
    case_sensitive: bool,
    entries: BTreeMap<u32, String>,
}

impl HashBin {
    fn same_text(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    fn record(&mut self, name: &str, hash: u32, text: &str) -> BuildResult<()> {
        match self.entries.get(&hash) {
            Some(existing) if !self.same_text(existing, text) => Err(BuildError::new(
                ErrorCode::HashCollision,
                format!(
                    "Hash collision detected: '{text}' and '{existing}' share the same hash value 0x{hash:x} in bin {name}.  If you believe this collision to be an error, please delete the string hash files and rebuild"
                ),
            )),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(hash, text.to_string());
                Ok(())
            }
        }
    }
}

/// The hash bins of one build session.
#[derive(Debug)]
pub struct HashBins {
    bins: BTreeMap<String, HashBin>,
    by_type: HashMap<String, String>,
}

impl HashBins {
    /// Creates the two built-in bins plus one per descriptor.
    pub fn new(descriptors: &[HashBinDescriptor]) -> Self {
        let mut bins = BTreeMap::new();
        bins.insert(INSTANCE_ID_BIN.to_string(), HashBin::default());
        bins.insert(
            TYPE_ID_BIN.to_string(),
            HashBin {
                case_sensitive: true,
                entries: BTreeMap::new(),
            },
        );
        let mut by_type = HashMap::new();
        for descriptor in descriptors {
            bins.insert(
                descriptor.name.clone(),
                HashBin {
                    case_sensitive: descriptor.case_sensitive,
                    entries: BTreeMap::new(),
                },
            );
            for ty in &descriptor.types {
                by_type.insert(ty.clone(), descriptor.name.clone());
            }
        }
        Self { bins, by_type }
    }

    /// Whether values of schema type `type_name` are recorded.
    pub fn is_hashable_type(&self, type_name: &str) -> bool {
        self.by_type.contains_key(type_name)
    }

    /// Records `hash → text` in `bin`.
    pub fn record(&mut self, bin: &str, hash: u32, text: &str) -> BuildResult<()> {
        let Some(entries) = self.bins.get_mut(bin) else {
            return Err(BuildError::internal(format!("String hash bin {bin} does not exist")));
        };
        entries.record(bin, hash, text)
    }

    /// Hashes `text` the way `bin` does and records it. Returns the hash.
    pub fn record_text(&mut self, bin: &str, text: &str) -> BuildResult<u32> {
        let case_sensitive = self
            .bins
            .get(bin)
            .map(|b| b.case_sensitive)
            .ok_or_else(|| BuildError::internal(format!("String hash bin {bin} does not exist")))?;
        let hash = if case_sensitive {
            hash_text(text)
        } else {
            hash_text(&text.to_lowercase())
        };
        self.record(bin, hash, text)?;
        Ok(hash)
    }

    /// Records a handle's type and instance names.
    pub fn record_handle(&mut self, handle: &InstanceHandle) -> BuildResult<()> {
        self.record(INSTANCE_ID_BIN, handle.instance_id(), handle.instance_name())?;
        self.record(TYPE_ID_BIN, handle.type_id(), handle.type_name())
    }

    /// Records a value of schema type `type_name` in the bin configured for it.
    pub fn record_typed(&mut self, type_name: &str, value: &str) -> BuildResult<u32> {
        let Some(bin) = self.by_type.get(type_name).cloned() else {
            return Err(BuildError::internal(format!(
                "StringHashBin does not exist for Schema type {type_name} but hashing was requested"
            )));
        };
        self.record_text(&bin, value)
    }

    /// The text recorded for `hash` in `bin`.
    pub fn lookup(&self, bin: &str, hash: u32) -> Option<&str> {
        self.bins.get(bin)?.entries.get(&hash).map(String::as_str)
    }

    /// Number of entries in `bin`.
    pub fn len(&self, bin: &str) -> usize {
        self.bins.get(bin).map_or(0, |b| b.entries.len())
    }

    /// Merges the tables of a previous run. Problems with the file are only logged.
    pub fn load(&mut self, path: &Path) {
        if !path.is_file() {
            return;
        }
        tracing::info!("Loading previous string hash file from {}", path.display());
        if let Err(err) = self.try_load(path) {
            tracing::warn!("Did not successfully initialize previous string hashes: {err}");
        }
    }

    fn try_load(&mut self, path: &Path) -> BuildResult<()> {
        let root = bab_xml::parse_file(path).map_err(crate::error::from_xml)?;
        let version = hash_provider_version().to_string();
        for table in root.elements().filter(|e| e.name == TABLE_ELEMENT) {
            let Some(bin) = table.attr(BIN_ATTRIBUTE) else {
                continue;
            };
            if !self.bins.contains_key(bin) {
                continue;
            }
            if table.attr("Version") != Some(version.as_str()) {
                tracing::info!("Old string hash file is out of date. Ignoring bin {bin}");
                continue;
            }
            let bin = bin.to_string();
            for entry in table.elements().filter(|e| e.name == ENTRY_ELEMENT) {
                let (Some(hash), Some(text)) = (entry.attr("Hash"), entry.attr("Text")) else {
                    continue;
                };
                let hash: u32 = hash.parse().map_err(|_| {
                    BuildError::new(
                        ErrorCode::XmlFormattingError,
                        format!("Invalid hash '{hash}' in {}", path.display()),
                    )
                })?;
                self.record(&bin, hash, text)?;
            }
        }
        Ok(())
    }

    /// Writes all bins to `path`.
    pub fn save(&self, path: &Path) -> BuildResult<()> {
        let version = hash_provider_version().to_string();
        let mut root = Element::in_namespace("AssetDeclaration", ASSET_NS);
        for (name, bin) in &self.bins {
            let mut table = Element::in_namespace(TABLE_ELEMENT, ASSET_NS);
            table.set_attr("Version", version.as_str());
            table.set_attr("id", format!("StringHashBin_{name}"));
            table.set_attr(BIN_ATTRIBUTE, name.as_str());
            for (hash, text) in &bin.entries {
                let mut entry = Element::in_namespace(ENTRY_ELEMENT, ASSET_NS);
                entry.set_attr("Hash", hash.to_string());
                entry.set_attr("Text", text.as_str());
                table.push(entry);
            }
            root.push(table);
        }
        bab_xml::write_file(path, &root).map_err(crate::error::from_xml)
    }
}
