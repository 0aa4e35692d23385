//! Install/update orchestration.
//!
//! A run is a linear pipeline of stages that short-circuits on the first
//! failure:
//!
//! ```text
//! Install: resolve → stop → download → ensure root → swap+extract | native installer
//!          → register → legacy cleanup → usage report → launch
//! Update:  stop → ensure root → swap+extract | native installer → usage report → launch
//! ```
//!
//! Resolution and download only happen when no archive was supplied.
//! Registration follows the swap path only. Legacy cleanup and usage
//! reporting never fail a run. Only the download honours cancellation; once
//! the swap begins the run finishes or rolls back.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use emberup_schema::{InstallOperation, PackageVersion, PackageVersionInfo};
use reqwest::Client;

use crate::config::{InstallConfig, InstallRequest};
use crate::error::{InstallError, InstallationResult};
use crate::io::download::{FetchOutcome, PackageFetcher};
use crate::io::extract::{ArchiveFormat, detect_format};
use crate::platform::{Platform, Shortcut, ShortcutTarget, UninstallEntry};
use crate::process::{ProcessCoordinator, ShutdownTimeouts};
use crate::reporter::{Phase, Reporter};
use crate::resolver::VersionResolver;
use crate::retry::RetryPolicy;
use crate::swap::{DirectorySwap, SwapPolicy, remove_dir_if_exists, remove_file_if_exists};
use crate::usage::{UsageReport, machine_id, report_usage};

const PUBLISHER: &str = "Media Browser Team";
const ABOUT_URL: &str = "http://www.mediabrowser3.com";
const CONTACT_URL: &str = "http://community.mediabrowser.tv";
const UNINSTALLER_EXE: &str = "MediaBrowser.Uninstaller.exe";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Pipeline stages, in the order an install visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StopRunningInstance,
    ResolveVersion,
    Download,
    EnsureRoot,
    SwapAndExtract,
    NativeInstaller,
    Registration,
    CleanupLegacy,
    ReportUsage,
    Launch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StopRunningInstance => "stop-running-instance",
            Self::ResolveVersion => "resolve-version",
            Self::Download => "download",
            Self::EnsureRoot => "ensure-root",
            Self::SwapAndExtract => "swap-and-extract",
            Self::NativeInstaller => "native-installer",
            Self::Registration => "registration",
            Self::CleanupLegacy => "cleanup-legacy",
            Self::ReportUsage => "report-usage",
            Self::Launch => "launch",
        };
        f.write_str(s)
    }
}

/// Client shared by every stage of a run. A peer that accepts the connection
/// but stops answering surfaces as a timeout instead of hanging the run.
fn default_client() -> Client {
    Client::builder()
        .user_agent(crate::USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Could not configure HTTP client, using defaults: {e}");
            Client::new()
        })
}

enum Completion {
    Done,
    Canceled,
}

enum PackageSource {
    Supplied(PathBuf),
    Catalog(PackageVersionInfo),
}

/// Runs one install or update request to completion.
pub struct Installer {
    request: InstallRequest,
    platform: Arc<dyn Platform>,
    client: Client,
    download_policy: RetryPolicy,
    swap_policy: SwapPolicy,
    shutdown_timeouts: ShutdownTimeouts,
}

impl fmt::Debug for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("request", &self.request)
            .field("download_policy", &self.download_policy)
            .field("swap_policy", &self.swap_policy)
            .finish_non_exhaustive()
    }
}

impl Installer {
    pub fn new(request: InstallRequest, platform: Arc<dyn Platform>) -> Self {
        Self {
            request,
            platform,
            client: default_client(),
            download_policy: RetryPolicy::download(),
            swap_policy: SwapPolicy::default(),
            shutdown_timeouts: ShutdownTimeouts::default(),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_download_policy(mut self, policy: RetryPolicy) -> Self {
        self.download_policy = policy;
        self
    }

    pub fn with_swap_policy(mut self, policy: SwapPolicy) -> Self {
        self.swap_policy = policy;
        self
    }

    pub fn with_shutdown_timeouts(mut self, timeouts: ShutdownTimeouts) -> Self {
        self.shutdown_timeouts = timeouts;
        self
    }

    /// Execute the run. Never panics and never returns early without a result.
    pub async fn run(&self) -> InstallationResult {
        let config = match InstallConfig::from_request(&self.request) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{e}");
                return InstallationResult::failed(e);
            }
        };
        tracing::info!(
            operation = %config.operation,
            product = %config.package_name,
            root = %config.install_root.display(),
            "Starting run"
        );

        let run = Run {
            installer: self,
            config: &config,
            reporter: self.request.reporter.as_ref(),
        };
        let outcome = match config.operation {
            InstallOperation::Install => run.install().await,
            InstallOperation::Update => run.update().await,
        };

        match outcome {
            Ok(Completion::Done) => {
                let message = format!("{} installed successfully.", config.friendly_name());
                tracing::info!("{message}");
                run.reporter.status(&message);
                InstallationResult::succeeded(message)
            }
            Ok(Completion::Canceled) => {
                tracing::info!("Run canceled");
                InstallationResult::canceled()
            }
            Err(e) => {
                tracing::error!(kind = %e.kind(), "{e}");
                InstallationResult::failed(e)
            }
        }
    }
}

struct Run<'a> {
    installer: &'a Installer,
    config: &'a InstallConfig,
    reporter: &'a dyn Reporter,
}

impl Run<'_> {
    fn enter(&self, stage: Stage) {
        tracing::info!(%stage, "Entering stage");
    }

    /// A problem that does not fail the run.
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
        self.reporter.warning(message);
    }

    async fn install(&self) -> Result<Completion, InstallError> {
        // Resolve before stopping so a catalog with nothing eligible leaves
        // the running instance alone.
        let source = match &self.config.archive {
            Some(archive) => PackageSource::Supplied(archive.clone()),
            None => PackageSource::Catalog(self.resolve_version().await?),
        };
        self.stop_running_instance().await?;

        let (archive, version) = match source {
            PackageSource::Supplied(archive) => {
                tracing::info!("Using supplied archive {}", archive.display());
                (archive, self.config.requested_version)
            }
            PackageSource::Catalog(info) => match self.download(&info).await? {
                FetchOutcome::Downloaded(path) => (path, Some(info.version)),
                FetchOutcome::Canceled => return Ok(Completion::Canceled),
            },
        };

        self.ensure_root().await?;
        if detect_format(&archive) == ArchiveFormat::NativeInstaller {
            self.run_native_installer(&archive).await?;
        } else {
            self.swap_and_extract(&archive).await?;
            self.register(version).await?;
        }
        self.cleanup_legacy().await;
        self.report_usage(version).await;
        self.launch().await?;
        Ok(Completion::Done)
    }

    async fn update(&self) -> Result<Completion, InstallError> {
        let archive = self
            .config
            .archive
            .as_deref()
            .ok_or_else(|| InstallError::config("An update requires the path of the package archive."))?;

        self.stop_running_instance().await?;
        self.ensure_root().await?;
        if detect_format(archive) == ArchiveFormat::NativeInstaller {
            self.run_native_installer(archive).await?;
        } else {
            self.swap_and_extract(archive).await?;
        }
        self.report_usage(self.config.requested_version).await;
        self.launch().await?;
        Ok(Completion::Done)
    }

    async fn stop_running_instance(&self) -> Result<(), InstallError> {
        self.enter(Stage::StopRunningInstance);
        self.reporter.phase(Phase::Stopping);
        let profile = self.config.profile;
        let coordinator = ProcessCoordinator::new(
            self.installer.platform.as_ref(),
            &self.installer.client,
            &self.config.endpoints.shutdown_url,
        )
        .with_timeouts(self.installer.shutdown_timeouts);

        let outcome = coordinator
            .stop(profile.process_name, profile.shutdown)
            .await
            .map_err(|source| InstallError::Shutdown {
                product: profile.friendly_name.to_string(),
                source,
            })?;
        tracing::debug!(?outcome, "Running instance handled");
        Ok(())
    }

    async fn resolve_version(&self) -> Result<PackageVersionInfo, InstallError> {
        self.enter(Stage::ResolveVersion);
        self.reporter.phase(Phase::Resolving);
        self.reporter.status("Checking available versions...");
        VersionResolver::new(&self.installer.client, &self.config.endpoints.catalog_url)
            .resolve(
                &self.config.package_name,
                self.config.channel,
                self.config.requested_version,
            )
            .await
            .ok_or_else(|| InstallError::NoVersion {
                package: self.config.package_name.clone(),
                channel: self.config.channel,
            })
    }

    async fn download(&self, info: &PackageVersionInfo) -> Result<FetchOutcome, InstallError> {
        self.enter(Stage::Download);
        self.reporter.phase(Phase::Downloading);
        self.reporter.status(&format!(
            "Downloading {} (version {})...",
            self.config.friendly_name(),
            info.version
        ));
        PackageFetcher::new(&self.installer.client, &self.config.scratch_dir)
            .with_policy(self.installer.download_policy)
            .fetch(info, self.reporter, &self.installer.request.cancel)
            .await
            .map_err(InstallError::Download)
    }

    async fn ensure_root(&self) -> Result<(), InstallError> {
        self.enter(Stage::EnsureRoot);
        let root = &self.config.install_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| InstallError::CreateRoot {
                path: root.clone(),
                source,
            })
    }

    async fn swap_and_extract(&self, archive: &Path) -> Result<(), InstallError> {
        self.enter(Stage::SwapAndExtract);
        self.reporter.phase(Phase::Extracting);
        self.reporter.status("Extracting package...");
        let swap = DirectorySwap::new(
            self.config.install_root.clone(),
            self.config.system_dir.clone(),
            self.config.backup_dir.clone(),
        )
        .with_policy(self.installer.swap_policy);

        let result = swap.swap_and_extract(archive).await;

        // The archive is consumed either way so a broken payload is not retried.
        if let Err(e) = remove_file_if_exists(archive).await {
            self.warn(&format!("Could not delete archive {}: {e}", archive.display()));
        }

        let report = result?;
        tracing::debug!(?report, "Swap finished");
        if report.backup_kept {
            self.warn(&format!(
                "Could not delete backup {}",
                self.config.backup_dir.display()
            ));
        }
        if let Err(e) = remove_dir_if_exists(&self.config.updates_dir).await {
            self.warn(&format!(
                "Could not delete {}: {e}",
                self.config.updates_dir.display()
            ));
        }
        Ok(())
    }

    async fn run_native_installer(&self, package: &Path) -> Result<(), InstallError> {
        self.enter(Stage::NativeInstaller);
        self.reporter.phase(Phase::Extracting);
        self.reporter.status("Running installer package...");
        let product = self.config.friendly_name().to_string();
        let logs_dir = &self.config.logs_dir;
        tokio::fs::create_dir_all(logs_dir).await?;
        let log_file = logs_dir.join(format!("{}-Msi.log", self.config.package_name));

        self.installer
            .platform
            .run_native_installer(package, &log_file)
            .await
            .map_err(|source| InstallError::NativeInstaller { product, source })
    }

    async fn register(&self, version: Option<PackageVersion>) -> Result<(), InstallError> {
        self.enter(Stage::Registration);
        self.reporter.phase(Phase::Registering);
        self.reporter.status("Configuring...");
        let profile = self.config.profile;
        let product = profile.friendly_name.to_string();

        let mut shortcuts = vec![Shortcut {
            name: profile.friendly_name.to_string(),
            target: ShortcutTarget::Program {
                path: self.config.executable.clone(),
                args: self.config.launch_args.clone(),
            },
            description: format!("Run {}", profile.friendly_name),
        }];
        shortcuts.extend(profile.extra_shortcuts.iter().map(|s| Shortcut {
            name: s.name.to_string(),
            target: ShortcutTarget::Url(s.url.to_string()),
            description: s.description.to_string(),
        }));

        let platform = &self.installer.platform;
        platform
            .create_shortcuts(&shortcuts)
            .await
            .map_err(|source| InstallError::Registration {
                product: product.clone(),
                source,
            })?;
        platform
            .register_uninstaller(&self.uninstall_entry(version))
            .await
            .map_err(|source| InstallError::Registration { product, source })
    }

    fn uninstall_entry(&self, version: Option<PackageVersion>) -> UninstallEntry {
        let exe = &self.config.executable;
        let exe_dir = exe.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        UninstallEntry {
            display_name: self.config.friendly_name().to_string(),
            application_version: version,
            display_version: version.map(|v| v.short()).unwrap_or_default(),
            publisher: PUBLISHER.to_string(),
            display_icon: exe.clone(),
            url_info_about: ABOUT_URL.to_string(),
            contact: CONTACT_URL.to_string(),
            install_date: chrono::Local::now().format("%Y%m%d").to_string(),
            uninstall_string: format!(
                "{} {}",
                exe_dir.join(UNINSTALLER_EXE).display(),
                self.config.profile.uninstaller_arg
            ),
        }
    }

    async fn cleanup_legacy(&self) {
        self.enter(Stage::CleanupLegacy);
        for dir in &self.config.legacy_dirs {
            match remove_dir_if_exists(dir).await {
                Ok(true) => tracing::info!("Removed legacy directory {}", dir.display()),
                Ok(false) => {}
                Err(e) => self.warn(&format!("Could not remove {}: {e}", dir.display())),
            }
        }
    }

    async fn report_usage(&self, version: Option<PackageVersion>) {
        let Some(url) = &self.config.endpoints.usage_url else {
            return;
        };
        self.enter(Stage::ReportUsage);
        let report = UsageReport {
            machine_id: machine_id(),
            product: &self.config.package_name,
            operation: self.config.operation,
            version,
        };
        if let Err(e) = report_usage(&self.installer.client, url, &report).await {
            self.warn(&format!("Usage report failed: {e}"));
        }
    }

    async fn launch(&self) -> Result<(), InstallError> {
        self.enter(Stage::Launch);
        self.reporter.phase(Phase::Launching);
        let platform = &self.installer.platform;

        if let Some(service) = &self.config.service {
            self.reporter.status(&format!("Starting service {service}..."));
            return platform
                .start_service(service)
                .await
                .map_err(|source| InstallError::StartService {
                    service: service.clone(),
                    source,
                });
        }

        let exe = &self.config.executable;
        self.reporter
            .status(&format!("Starting {}...", self.config.friendly_name()));
        platform
            .launch(exe, &self.config.launch_args)
            .await
            .map_err(|source| {
                let mut command = exe.display().to_string();
                for arg in &self.config.launch_args {
                    command.push(' ');
                    command.push_str(arg);
                }
                InstallError::Launch { command, source }
            })
    }
}
