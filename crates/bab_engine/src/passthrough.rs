//! A compiler that ships the final instance XML as the payload.
//!
//! Useful for tools and tests that need real output without a game-specific
//! compiler. The type hash follows the schema declaration of the type, so editing
//! a type's schema invalidates every compiled instance of it.

use crate::plugin::{AssetBuffer, AssetPlugin, CompileInput, ExtendedTypeInfo, PluginContext};
use bab_common::{fast_hash, hash_text, hash_text_seeded, BuildResult, InstanceHandle};
use bab_schema::SchemaSet;
use std::collections::BTreeMap;

const VERSION: u32 = 1;

/// Serializes instances verbatim.
#[derive(Debug, Clone, Default)]
pub struct PassthroughPlugin {
    fingerprints: BTreeMap<String, u32>,
}

impl PassthroughPlugin {
    /// Captures the declaration fingerprint of every asset type in `schema`.
    pub fn new(schema: &SchemaSet) -> Self {
        let fingerprints = schema
            .asset_types()
            .map(|name| (name.to_string(), schema.fingerprint(name)))
            .collect();
        Self { fingerprints }
    }
}

fn write_ids(out: &mut Vec<u8>, handles: &[InstanceHandle], big_endian: bool) {
    for handle in handles {
        for value in [handle.type_id(), handle.instance_id()] {
            if big_endian {
                out.extend_from_slice(&value.to_be_bytes());
            } else {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
}

impl AssetPlugin for PassthroughPlugin {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn type_info(&self, type_name: &str, type_id: u32) -> ExtendedTypeInfo {
        let fingerprint = self.fingerprints.get(type_name).copied().unwrap_or(0);
        ExtendedTypeInfo {
            type_name: type_name.to_string(),
            type_id,
            type_hash: hash_text_seeded(fingerprint, "passthrough"),
            processing_hash: hash_text("PassthroughPlugin") ^ VERSION,
            has_custom_data: false,
            tokenized: false,
            use_build_cache: true,
        }
    }

    fn all_types_hash(&self) -> u32 {
        let bytes: Vec<u8> = self
            .fingerprints
            .values()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        fast_hash(&bytes)
    }

    fn version(&self) -> u32 {
        VERSION
    }

    fn process(&self, input: &CompileInput<'_>, ctx: &PluginContext<'_>) -> BuildResult<AssetBuffer> {
        let mut buffer = AssetBuffer {
            instance_data: bab_xml::to_xml_string(input.xml).into_bytes(),
            ..AssetBuffer::default()
        };
        write_ids(&mut buffer.relocation_data, input.referenced, ctx.big_endian);
        write_ids(&mut buffer.imports_data, input.weak_referenced, ctx.big_endian);
        Ok(buffer)
    }
}
