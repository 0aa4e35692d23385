//! Identifier and enum value types shared by the installer crates.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Catalog package identifier (e.g. `MBServer`).
///
/// Unlike display names this is matched exactly by the catalog service, so
/// the original casing is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a package name from the given string.
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Errors produced when parsing enum-like values from user input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The value did not name a known release channel.
    #[error("Unknown release channel '{0}' (expected stable, beta or dev)")]
    UnknownChannel(String),

    /// The value did not name a known install operation.
    #[error("Unknown operation '{0}' (expected install or update)")]
    UnknownOperation(String),
}

/// Stability tier of a published package version.
///
/// Channels are ordered from most to least stable. A requested channel
/// admits every channel that is at least as stable as itself, so a `Beta`
/// request accepts `Stable` and `Beta` releases but never `Dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ReleaseChannel {
    /// Production releases (the catalog calls these `Release`).
    #[default]
    Stable,
    /// Pre-release builds.
    Beta,
    /// Nightly/development builds.
    Dev,
}

impl ReleaseChannel {
    /// Returns `true` if a version published on `candidate` may be installed
    /// when `self` was requested.
    pub fn admits(self, candidate: ReleaseChannel) -> bool {
        candidate <= self
    }

    /// Channel for a numeric catalog code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Stable),
            1 => Some(Self::Beta),
            2 => Some(Self::Dev),
            _ => None,
        }
    }

    /// Name used on the catalog wire format.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Stable => "Release",
            Self::Beta => "Beta",
            Self::Dev => "Dev",
        }
    }
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
            Self::Dev => "dev",
        };
        f.write_str(name)
    }
}

impl FromStr for ReleaseChannel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" | "release" | "0" => Ok(Self::Stable),
            "beta" | "1" => Ok(Self::Beta),
            "dev" | "2" => Ok(Self::Dev),
            _ => Err(ParseError::UnknownChannel(s.to_string())),
        }
    }
}

impl Serialize for ReleaseChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> Deserialize<'de> for ReleaseChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChannelVisitor;

        impl Visitor<'_> for ChannelVisitor {
            type Value = ReleaseChannel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a release channel name or numeric code")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                ReleaseChannel::from_code(v)
                    .ok_or_else(|| E::custom(format!("unknown channel code {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                let code = u64::try_from(v).map_err(E::custom)?;
                self.visit_u64(code)
            }
        }

        deserializer.deserialize_any(ChannelVisitor)
    }
}

/// Which pipeline a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstallOperation {
    /// First-time install (or reinstall) initiated by a user.
    #[default]
    Install,
    /// In-place update handed over by a running instance of the product.
    Update,
}

impl fmt::Display for InstallOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("Install"),
            Self::Update => f.write_str("Update"),
        }
    }
}

impl FromStr for InstallOperation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "install" => Ok(Self::Install),
            "update" => Ok(Self::Update),
            _ => Err(ParseError::UnknownOperation(s.to_string())),
        }
    }
}
