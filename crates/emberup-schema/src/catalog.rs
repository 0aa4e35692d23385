//! Catalog service wire format.
//!
//! The catalog answers `GET ?name=<package>` with a JSON list of package
//! records. The service is treated as untrusted: every field of a version
//! record is optional on the wire, and [`CatalogVersion::into_info`] decides
//! whether a record is usable. Unusable records are dropped by callers rather
//! than failing the whole response.

use serde::{Deserialize, Serialize};

use crate::types::ReleaseChannel;
use crate::version::PackageVersion;

/// Reasons a catalog version record cannot be used.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Neither `versionStr` nor `version` held a parseable version.
    #[error("Catalog entry has no usable version")]
    MissingVersion,

    /// The record has no download URL.
    #[error("Catalog entry {0} has no source URL")]
    MissingSourceUrl(PackageVersion),

    /// The record's classification names no channel we know.
    #[error("Catalog entry {version} has unknown classification '{classification}'")]
    UnknownChannel {
        /// Version of the rejected record.
        version: PackageVersion,
        /// Classification as it appeared on the wire.
        classification: String,
    },
}

/// A package record as returned by the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPackage {
    /// Package name as published.
    #[serde(default)]
    pub name: String,

    /// Every published version of the package, in no particular order.
    #[serde(default)]
    pub versions: Vec<CatalogVersion>,
}

/// A `version` field may arrive as a dotted string or as an object of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawVersion {
    /// `"3.0.5211.0"`
    Text(String),
    /// `{"major":3,"minor":0,"build":5211,"revision":0}`
    Parts {
        /// Major component.
        #[serde(alias = "Major")]
        major: u32,
        /// Minor component.
        #[serde(alias = "Minor", default)]
        minor: u32,
        /// Build component (negative on the wire means "unset").
        #[serde(alias = "Build", default)]
        build: i64,
        /// Revision component (negative on the wire means "unset").
        #[serde(alias = "Revision", default)]
        revision: i64,
    },
}

impl RawVersion {
    fn to_version(&self) -> Option<PackageVersion> {
        match self {
            Self::Text(s) => PackageVersion::parse(s).ok(),
            Self::Parts {
                major,
                minor,
                build,
                revision,
            } => Some(PackageVersion::new(
                *major,
                *minor,
                u32::try_from(*build).unwrap_or(0),
                u32::try_from(*revision).unwrap_or(0),
            )),
        }
    }
}

/// A `classification` field: a known channel, or whatever else the service sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawChannel {
    /// `"Release"`, `"Beta"`, `"Dev"` or their numeric codes.
    Known(ReleaseChannel),
    /// An unrecognised numeric code.
    Code(i64),
    /// An unrecognised name.
    Name(String),
}

/// One published version, exactly as it came off the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVersion {
    /// Dotted version string.
    #[serde(default)]
    pub version_str: Option<String>,

    /// Structured or dotted version.
    #[serde(default)]
    pub version: Option<RawVersion>,

    /// Release channel; the catalog omits it for production releases.
    #[serde(default)]
    pub classification: Option<RawChannel>,

    /// Download URL of the package archive.
    #[serde(default)]
    pub source_url: Option<String>,

    /// File name the archive should be saved under.
    #[serde(default)]
    pub target_filename: Option<String>,

    /// Published checksum, if any. Informational only.
    #[serde(default)]
    pub checksum: Option<String>,

    /// Published archive size in bytes, if any.
    #[serde(default)]
    pub size: Option<u64>,
}

impl CatalogVersion {
    /// Validate the record and convert it into a [`PackageVersionInfo`].
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the version or source URL is missing, or
    /// the classification is not a known channel.
    pub fn into_info(self) -> Result<PackageVersionInfo, CatalogError> {
        let version = self
            .version_str
            .as_deref()
            .and_then(|s| PackageVersion::parse(s).ok())
            .or_else(|| self.version.as_ref().and_then(RawVersion::to_version))
            .ok_or(CatalogError::MissingVersion)?;

        let channel = match self.classification {
            None => ReleaseChannel::default(),
            Some(RawChannel::Known(channel)) => channel,
            Some(RawChannel::Code(code)) => {
                return Err(CatalogError::UnknownChannel {
                    version,
                    classification: code.to_string(),
                });
            }
            Some(RawChannel::Name(classification)) => {
                return Err(CatalogError::UnknownChannel {
                    version,
                    classification,
                });
            }
        };

        let source_url = self
            .source_url
            .filter(|u| !u.trim().is_empty())
            .ok_or(CatalogError::MissingSourceUrl(version))?;

        let target_filename = self
            .target_filename
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| filename_from_url(&source_url).to_string());

        Ok(PackageVersionInfo {
            version,
            channel,
            source_url,
            target_filename,
            checksum: self.checksum.filter(|c| !c.is_empty()),
            size: self.size,
        })
    }
}

/// A resolved, usable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersionInfo {
    /// Version number.
    pub version: PackageVersion,
    /// Release channel classification.
    pub channel: ReleaseChannel,
    /// Where to download the archive from.
    pub source_url: String,
    /// File name to store the archive under.
    pub target_filename: String,
    /// Published checksum, if any.
    pub checksum: Option<String>,
    /// Published size in bytes, if any.
    pub size: Option<u64>,
}

/// Extract the filename from a URL, ignoring any query string.
///
/// ```
/// use emberup_schema::catalog::filename_from_url;
///
/// assert_eq!(filename_from_url("https://example.com/a/pkg.zip?x=1"), "pkg.zip");
/// assert_eq!(filename_from_url(""), "");
/// ```
pub fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or("");
    path.split('/').next_back().unwrap_or("")
}
