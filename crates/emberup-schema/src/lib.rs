//! Shared types and wire format for emberup.
//!
//! Everything here is plain data: versions, release channels, operation
//! kinds and the catalog records the version resolver consumes. No I/O.

pub mod catalog;
pub mod types;
pub mod version;

// Re-exports
pub use catalog::{CatalogPackage, CatalogVersion, PackageVersionInfo, filename_from_url};
pub use types::*;
pub use version::{PackageVersion, VersionError};
