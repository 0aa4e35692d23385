//! Run requests and the per-run configuration derived from them.

use std::path::PathBuf;
use std::sync::Arc;

use emberup_schema::{InstallOperation, PackageName, PackageVersion, ReleaseChannel};
use tokio_util::sync::CancellationToken;

use crate::error::InstallError;
use crate::paths;
use crate::product::{ExecutableLocation, ProductKind, ProductProfile};
use crate::reporter::{NullReporter, Reporter};

pub const DEFAULT_CATALOG_URL: &str = "http://www.mb3admin.com/admin/service/package/retrieveAll";
pub const DEFAULT_USAGE_URL: &str = "http://www.mb3admin.com/admin/service/package/installed";
pub const DEFAULT_SHUTDOWN_URL: &str = "http://localhost:8096/mediabrowser/System/Shutdown";

/// Remote services a run talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub catalog_url: String,
    /// None disables usage reporting.
    pub usage_url: Option<String>,
    pub shutdown_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            usage_url: Some(DEFAULT_USAGE_URL.to_string()),
            shutdown_url: DEFAULT_SHUTDOWN_URL.to_string(),
        }
    }
}

/// Everything needed to perform one install or update.
pub struct InstallRequest {
    pub operation: InstallOperation,
    pub product: ProductKind,
    /// Upper bound for resolution; None means latest.
    pub version: Option<PackageVersion>,
    pub channel: ReleaseChannel,
    /// A pre-supplied archive; skips resolution and download.
    pub archive: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub system_dir: Option<PathBuf>,
    /// Start this service after installing instead of the executable.
    pub service: Option<String>,
    pub endpoints: Endpoints,
    pub scratch_dir: Option<PathBuf>,
    pub reporter: Arc<dyn Reporter>,
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for InstallRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallRequest")
            .field("operation", &self.operation)
            .field("product", &self.product)
            .field("version", &self.version)
            .field("channel", &self.channel)
            .field("archive", &self.archive)
            .field("install_root", &self.install_root)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl InstallRequest {
    pub fn new(operation: InstallOperation, product: ProductKind) -> Self {
        Self {
            operation,
            product,
            version: None,
            channel: ReleaseChannel::default(),
            archive: None,
            install_root: None,
            executable: None,
            system_dir: None,
            service: None,
            endpoints: Endpoints::default(),
            scratch_dir: None,
            reporter: Arc::new(NullReporter),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_version(mut self, version: PackageVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_channel(mut self, channel: ReleaseChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_archive(mut self, archive: impl Into<PathBuf>) -> Self {
        self.archive = Some(archive.into());
        self
    }

    pub fn with_install_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.install_root = Some(root.into());
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Immutable configuration for one run, derived from an [`InstallRequest`]
/// and the product's profile.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub profile: &'static ProductProfile,
    pub operation: InstallOperation,
    pub package_name: PackageName,
    pub requested_version: Option<PackageVersion>,
    pub channel: ReleaseChannel,
    pub archive: Option<PathBuf>,
    pub install_root: PathBuf,
    pub system_dir: PathBuf,
    /// Sibling of the system directory that holds the previous install during a swap.
    pub backup_dir: PathBuf,
    /// Staging directory a running server leaves behind for updates.
    pub updates_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Directories from older releases removed after an install.
    pub legacy_dirs: Vec<PathBuf>,
    pub scratch_dir: PathBuf,
    pub executable: PathBuf,
    pub launch_args: Vec<String>,
    pub service: Option<String>,
    pub endpoints: Endpoints,
}

impl InstallConfig {
    /// Derive the run configuration.
    ///
    /// # Errors
    ///
    /// [`InstallError::Configuration`] when no installation root can be
    /// determined, when an update has no archive, or when a supplied archive
    /// does not exist.
    pub fn from_request(request: &InstallRequest) -> Result<Self, InstallError> {
        let profile = request.product.profile();

        if request.operation == InstallOperation::Update && request.archive.is_none() {
            return Err(InstallError::config(
                "An update requires the path of the package archive.",
            ));
        }
        if let Some(archive) = &request.archive {
            if !archive.is_file() {
                return Err(InstallError::config(format!(
                    "Package archive {} does not exist.",
                    archive.display()
                )));
            }
        }

        let install_root = request
            .install_root
            .clone()
            .or_else(|| paths::default_install_root(profile))
            .ok_or_else(|| InstallError::config("Could not determine the installation directory."))?;

        let system_dir = request
            .system_dir
            .clone()
            .unwrap_or_else(|| install_root.join(profile.system_dir_name));
        let backup_dir = system_dir
            .parent()
            .unwrap_or(&install_root)
            .join("System.old");

        let executable = request
            .executable
            .clone()
            .unwrap_or_else(|| match profile.executable {
                ExecutableLocation::InSystemDir(name) => system_dir.join(name),
                ExecutableLocation::InWindowsDir(parts) => {
                    parts.iter().fold(paths::windows_dir(), |p, part| p.join(part))
                }
            });

        Ok(Self {
            profile,
            operation: request.operation,
            package_name: PackageName::new(profile.package_name),
            requested_version: request.version,
            channel: request.channel,
            archive: request.archive.clone(),
            updates_dir: install_root.join("Updates"),
            logs_dir: install_root.join("logs"),
            legacy_dirs: vec![install_root.join("Pismo")],
            scratch_dir: request
                .scratch_dir
                .clone()
                .unwrap_or_else(paths::scratch_dir),
            launch_args: profile.launch_args.iter().map(|a| (*a).to_string()).collect(),
            service: request.service.clone().filter(|s| !s.trim().is_empty()),
            endpoints: request.endpoints.clone(),
            install_root,
            system_dir,
            backup_dir,
            executable,
        })
    }

    pub fn friendly_name(&self) -> &'static str {
        self.profile.friendly_name
    }
}
