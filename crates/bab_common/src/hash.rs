//! Hashing primitives.
//!
//! [`fast_hash_seeded`] is the 32-bit hash every asset identity is built from: type
//! ids, instance ids, content hashes and stream checksums. Its output is persisted
//! in manifests and asset file names, so it must stay bit-exact across releases.
//! [`ContentHash`] is a wide XXH3 hash used only to guard persisted cache files.

use serde::{Deserialize, Serialize};
use std::fmt;

#[inline]
fn read_u16(data: &[u8], at: usize) -> u32 {
    u32::from(u16::from_le_bytes([data[at], data[at + 1]]))
}

/// Hashes `data` starting from `seed`.
///
/// An empty buffer always hashes to `0`, whatever the seed.
pub fn fast_hash_seeded(seed: u32, data: &[u8]) -> u32 {
    if data.is_empty() {
        return 0;
    }
    let mut hash = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        hash = hash.wrapping_add(read_u16(chunk, 0));
        hash ^= (read_u16(chunk, 2) ^ (hash << 5)) << 11;
        hash = (hash >> 11).wrapping_add(hash);
    }
    let rest = chunks.remainder();
    match rest.len() {
        3 => {
            hash = hash.wrapping_add(read_u16(rest, 0));
            // the trailing byte is read signed
            let tail = (i32::from(rest[2] as i8) << 2) as u32;
            hash ^= (tail ^ hash) << 16;
            hash = (hash >> 11).wrapping_add(hash);
        }
        2 => {
            hash = hash.wrapping_add(read_u16(rest, 0));
            hash ^= hash << 11;
            hash = (hash >> 17).wrapping_add(hash);
        }
        1 => {
            hash = hash.wrapping_add(i32::from(rest[0] as i8) as u32);
            hash ^= hash << 10;
            hash = (hash >> 1).wrapping_add(hash);
        }
        _ => {}
    }
    hash ^= hash << 3;
    hash = (hash >> 5).wrapping_add(hash);
    hash ^= hash << 2;
    hash = (hash >> 15).wrapping_add(hash);
    (hash << 10) ^ hash
}

/// Hashes `data` using its length as the seed.
pub fn fast_hash(data: &[u8]) -> u32 {
    fast_hash_seeded(data.len() as u32, data)
}

/// Narrows text to one byte per character, replacing anything outside Latin-1 with `?`.
fn narrow(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Hashes text case-sensitively, seeded with the character count.
pub fn hash_text(text: &str) -> u32 {
    let bytes = narrow(text);
    fast_hash_seeded(bytes.len() as u32, &bytes)
}

/// Hashes text case-sensitively starting from `seed`.
pub fn hash_text_seeded(seed: u32, text: &str) -> u32 {
    fast_hash_seeded(seed, &narrow(text))
}

/// Hashes text case-insensitively (the lowercase form is hashed).
pub fn hash_text_lower(text: &str) -> u32 {
    hash_text(&text.to_lowercase())
}

/// A 128-bit content hash computed using XXH3 for persisted-file integrity checks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(fast_hash(b""), 0);
        assert_eq!(fast_hash_seeded(1234, b""), 0);
        assert_eq!(hash_text(""), 0);
    }

    #[test]
    fn deterministic() {
        assert_eq!(fast_hash(b"GameObject"), fast_hash(b"GameObject"));
        assert_eq!(hash_text("GameObject"), fast_hash(b"GameObject"));
    }

    #[test]
    fn every_remainder_length_differs() {
        let hashes: Vec<u32> = (1..=8).map(|n| fast_hash(&b"abcdefgh"[..n])).collect();
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn seed_changes_result() {
        assert_ne!(fast_hash_seeded(0, b"abc"), fast_hash_seeded(1, b"abc"));
    }

    #[test]
    fn case_insensitive_text() {
        assert_eq!(hash_text_lower("FooBar"), hash_text_lower("foobar"));
        assert_ne!(hash_text("FooBar"), hash_text("foobar"));
        assert_eq!(hash_text_lower("FooBar"), hash_text("foobar"));
    }

    #[test]
    fn high_bytes_are_sign_extended() {
        // a lone byte >= 0x80 takes the signed path; it must still be stable
        assert_eq!(fast_hash(&[0xff]), fast_hash(&[0xff]));
        assert_ne!(fast_hash(&[0xff]), fast_hash(&[0x7f]));
    }

    #[test]
    fn text_outside_latin1_narrows() {
        assert_eq!(hash_text("a\u{4e16}"), hash_text("a?"));
    }

    #[test]
    fn content_hash_display_format() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 32, "Display should be 32 hex chars");
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_hash_serde_roundtrip() {
        let h = ContentHash::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
