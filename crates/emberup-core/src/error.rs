//! Domain-specific errors for install and update runs

use std::fmt;
use std::path::PathBuf;

use emberup_schema::{PackageName, ReleaseChannel};
use thiserror::Error;

use crate::io::download::DownloadError;
use crate::platform::PlatformError;
use crate::process::ShutdownError;
use crate::retry::RetryError;
use crate::swap::SwapError;

/// Coarse classification of why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A retryable network failure that exhausted its retry budget.
    TransientNetwork,
    /// A network failure that is not worth retrying.
    Network,
    UserCanceled,
    /// A file or directory stayed in use past the retry budget.
    FileLocked,
    CorruptArchive,
    ConfigurationInvalid,
    /// An OS tool or service (installer, shortcut, launcher) failed.
    ExternalToolFailure,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TransientNetwork => "transient network failure",
            Self::Network => "network failure",
            Self::UserCanceled => "canceled",
            Self::FileLocked => "file locked",
            Self::CorruptArchive => "corrupt archive",
            Self::ConfigurationInvalid => "invalid configuration",
            Self::ExternalToolFailure => "external tool failure",
            Self::Io => "I/O error",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("{0}")]
    Configuration(String),

    #[error("Could not find a {channel} version of {package} to install.")]
    NoVersion {
        package: PackageName,
        channel: ReleaseChannel,
    },

    #[error("Error shutting down {product}. Please be sure it is not running and try again.")]
    Shutdown {
        product: String,
        #[source]
        source: ShutdownError,
    },

    #[error(
        "Error downloading package. There may be a problem communicating with the update server."
    )]
    Download(#[source] RetryError<DownloadError>),

    #[error("Could not create installation directory {}", path.display())]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error("Error running the installer package for {product}")]
    NativeInstaller {
        product: String,
        #[source]
        source: PlatformError,
    },

    #[error("Error creating shortcuts or uninstall entry. {product} is installed.")]
    Registration {
        product: String,
        #[source]
        source: PlatformError,
    },

    #[error("Error starting service {service}")]
    StartService {
        service: String,
        #[source]
        source: PlatformError,
    },

    #[error("Error executing - {command}")]
    Launch {
        command: String,
        #[source]
        source: PlatformError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    /// Create a configuration error from any message.
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::NoVersion { .. } => ErrorKind::ConfigurationInvalid,
            Self::Shutdown { source, .. } => match source {
                ShutdownError::Request(_) => ErrorKind::Network,
                ShutdownError::Terminate { .. } => ErrorKind::ExternalToolFailure,
            },
            Self::Download(RetryError::Exhausted { .. }) => ErrorKind::TransientNetwork,
            Self::Download(RetryError::Fatal(e)) => match e {
                DownloadError::Io(_) => ErrorKind::Io,
                DownloadError::Transient(_) | DownloadError::Http(_) => ErrorKind::Network,
            },
            Self::Swap(e) => match e {
                SwapError::StaleBackup { .. } | SwapError::BackupMove { .. } => {
                    ErrorKind::FileLocked
                }
                SwapError::Extract { source, .. } if source.inner().is_corrupt() => {
                    ErrorKind::CorruptArchive
                }
                SwapError::Extract { .. } => ErrorKind::Io,
            },
            Self::NativeInstaller { .. }
            | Self::Registration { .. }
            | Self::StartService { .. }
            | Self::Launch { .. } => ErrorKind::ExternalToolFailure,
            Self::CreateRoot { .. } | Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Canceled,
}

/// Final outcome of an install or update run.
#[derive(Debug)]
pub struct InstallationResult {
    pub status: RunStatus,
    /// One human-readable line for the user.
    pub message: String,
    /// The originating error of a failed run.
    pub cause: Option<InstallError>,
}

impl InstallationResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Succeeded,
            message: message.into(),
            cause: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: RunStatus::Canceled,
            message: "Installation canceled.".to_string(),
            cause: None,
        }
    }

    pub fn failed(cause: InstallError) -> Self {
        Self {
            status: RunStatus::Failed,
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Failure classification; `UserCanceled` for a canceled run.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self.status {
            RunStatus::Succeeded => None,
            RunStatus::Canceled => Some(ErrorKind::UserCanceled),
            RunStatus::Failed => self.cause.as_ref().map(InstallError::kind),
        }
    }

    /// The message followed by the chain of underlying causes.
    pub fn detail(&self) -> String {
        let mut out = self.message.clone();
        let mut source = self
            .cause
            .as_ref()
            .and_then(|c| std::error::Error::source(c));
        while let Some(err) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&err.to_string());
            source = std::error::Error::source(err);
        }
        out
    }
}
