//! `bab hash`: prints the hash the builder assigns to a string.

use bab_common::{hash_text, hash_text_lower};

use crate::HashArgs;

/// Hashes `text` the way instance and type names are hashed.
pub fn hash_value(text: &str, case_sensitive: bool) -> u32 {
    if case_sensitive {
        hash_text(text)
    } else {
        hash_text_lower(text)
    }
}

/// Runs the `bab hash` command.
pub fn run(args: &HashArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let value = hash_value(&args.text, args.case_sensitive);
    println!("{value:#010x} ({value})");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_by_default() {
        assert_eq!(hash_value("Weapon", false), hash_value("weapon", false));
        assert_eq!(hash_value("Weapon", false), hash_text("weapon"));
    }

    #[test]
    fn case_sensitive_keeps_case() {
        assert_eq!(hash_value("Weapon", true), hash_text("Weapon"));
        assert_ne!(hash_value("Weapon", true), hash_value("weapon", true));
    }
}
