//! Install and update engine for emberup.
//!
//! [`Installer`] drives one run: stop the running instance, fetch or take a
//! package, swap it into place with rollback, register and relaunch.

pub mod config;
pub mod error;
pub mod installer;
pub mod io;
pub mod paths;
pub mod platform;
pub mod process;
pub mod product;
pub mod resolver;
pub mod retry;
pub mod swap;
pub mod usage;

pub mod reporter;

pub use config::{Endpoints, InstallConfig, InstallRequest};
pub use error::{ErrorKind, InstallError, InstallationResult, RunStatus};
pub use installer::Installer;
pub use platform::{Platform, SystemPlatform};
pub use product::ProductKind;
pub use reporter::{NullReporter, Phase, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("emberup/", env!("CARGO_PKG_VERSION"));
