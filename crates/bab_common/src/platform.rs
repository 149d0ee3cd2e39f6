//! Build target platforms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The runtime platform a stream is compiled for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    /// Platform-neutral output.
    #[default]
    All,
    /// Little-endian desktop target.
    Win32,
    /// Big-endian console target.
    Xenon,
    /// Big-endian console target.
    Ps3,
}

impl TargetPlatform {
    /// The small integer used in session-cache keys (`0` for [`TargetPlatform::All`]).
    pub fn index(self) -> u32 {
        match self {
            TargetPlatform::All => 0,
            TargetPlatform::Win32 => 1,
            TargetPlatform::Xenon => 2,
            TargetPlatform::Ps3 => 3,
        }
    }

    /// Whether binary output for this platform is big-endian.
    pub fn is_big_endian(self) -> bool {
        matches!(self, TargetPlatform::Xenon | TargetPlatform::Ps3)
    }

    /// The lowercase platform name.
    pub fn name(self) -> &'static str {
        match self {
            TargetPlatform::All => "all",
            TargetPlatform::Win32 => "win32",
            TargetPlatform::Xenon => "xenon",
            TargetPlatform::Ps3 => "ps3",
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown platform name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target platform '{0}'")]
pub struct ParsePlatformError(pub String);

impl FromStr for TargetPlatform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TargetPlatform::All),
            "win32" | "pc" => Ok(TargetPlatform::Win32),
            "xenon" | "xbox360" => Ok(TargetPlatform::Xenon),
            "ps3" => Ok(TargetPlatform::Ps3),
            _ => Err(ParsePlatformError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("Win32".parse::<TargetPlatform>().unwrap(), TargetPlatform::Win32);
        assert_eq!("xenon".parse::<TargetPlatform>().unwrap(), TargetPlatform::Xenon);
        assert!("amiga".parse::<TargetPlatform>().is_err());
    }

    #[test]
    fn endianness() {
        assert!(!TargetPlatform::Win32.is_big_endian());
        assert!(TargetPlatform::Ps3.is_big_endian());
    }

    #[test]
    fn display_roundtrip() {
        for p in [
            TargetPlatform::All,
            TargetPlatform::Win32,
            TargetPlatform::Xenon,
            TargetPlatform::Ps3,
        ] {
            assert_eq!(p.to_string().parse::<TargetPlatform>().unwrap(), p);
        }
    }
}
