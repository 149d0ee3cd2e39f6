//! Content hashing of XML subtrees.

use crate::element::Element;
use crate::writer::to_xml_string;
use bab_common::hash_text_seeded;

/// Number of characters hashed per step.
pub const XML_HASH_CHUNK: usize = 512;

/// Hashes the canonical serialization of `element`, starting from `seed`.
///
/// The text is hashed in [`XML_HASH_CHUNK`]-character pieces, each piece seeded
/// with the running hash.
pub fn xml_hash(seed: u32, element: &Element) -> u32 {
    let text = to_xml_string(element);
    let chars: Vec<char> = text.chars().collect();
    let mut hash = seed;
    for chunk in chars.chunks(XML_HASH_CHUNK) {
        let piece: String = chunk.iter().collect();
        hash = hash_text_seeded(hash, &piece);
    }
    hash
}
