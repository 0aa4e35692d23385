//! Four-part package versions (`major.minor.build.revision`).
//!
//! Catalog entries and requested ceilings use the same precedence: each
//! component is compared numerically, left to right. Missing trailing
//! components are treated as zero, so `4.1` and `4.1.0.0` are equal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing a [`PackageVersion`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input was empty (after trimming whitespace and a leading `v`).
    #[error("Empty version string")]
    Empty,

    /// The input had more than four dot-separated components.
    #[error("Too many version components in '{0}' (at most 4)")]
    TooManyComponents(String),

    /// A component was not a non-negative integer.
    #[error("Invalid version component '{component}' in '{input}'")]
    InvalidComponent {
        /// The offending component.
        component: String,
        /// The full input string.
        input: String,
    },
}

/// A `major.minor.build.revision` version number.
///
/// Ordering is the standard component-wise precedence, which the derived
/// `Ord` gives us because the fields are declared most-significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PackageVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Build component.
    pub build: u32,
    /// Revision component.
    pub revision: u32,
}

impl PackageVersion {
    /// Create a version from its four components.
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a version string such as `4`, `4.1`, `4.1.2` or `v4.1.2.3`.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionError`] for empty input, more than four components,
    /// or a component that is not a non-negative integer.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim().trim_start_matches(['v', 'V']);
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for component in trimmed.split('.') {
            if count == parts.len() {
                return Err(VersionError::TooManyComponents(input.to_string()));
            }
            parts[count] = component
                .parse::<u32>()
                .map_err(|_| VersionError::InvalidComponent {
                    component: component.to_string(),
                    input: input.to_string(),
                })?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }

    /// Two-component form (`major.minor`), used for display versions in
    /// uninstall registrations.
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_versions() {
        assert_eq!(
            PackageVersion::parse("4").unwrap(),
            PackageVersion::new(4, 0, 0, 0)
        );
        assert_eq!(
            PackageVersion::parse("4.1").unwrap(),
            PackageVersion::new(4, 1, 0, 0)
        );
        assert_eq!(
            PackageVersion::parse("v3.0.5211.17").unwrap(),
            PackageVersion::new(3, 0, 5211, 17)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(PackageVersion::parse("  "), Err(VersionError::Empty));
        assert!(matches!(
            PackageVersion::parse("1.2.3.4.5"),
            Err(VersionError::TooManyComponents(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.x"),
            Err(VersionError::InvalidComponent { .. })
        ));
        assert!(PackageVersion::parse("1..2").is_err());
    }

    #[test]
    fn test_ordering_is_numeric_per_component() {
        let a = PackageVersion::parse("3.0.5211").unwrap();
        let b = PackageVersion::parse("3.0.999.9").unwrap();
        let c = PackageVersion::parse("3.10").unwrap();
        assert!(a > b);
        assert!(c > a);
        assert_eq!(
            PackageVersion::parse("4.1").unwrap(),
            PackageVersion::parse("4.1.0.0").unwrap()
        );
    }

    #[test]
    fn test_display_and_short() {
        let v = PackageVersion::new(3, 5, 2, 0);
        assert_eq!(v.to_string(), "3.5.2.0");
        assert_eq!(v.short(), "3.5");
    }

    #[test]
    fn test_serde_as_string() {
        let v: PackageVersion = serde_json::from_str("\"3.0.5211.0\"").unwrap();
        assert_eq!(v, PackageVersion::new(3, 0, 5211, 0));
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"3.0.5211.0\"");
    }
}
