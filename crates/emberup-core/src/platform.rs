//! OS integration points.
//!
//! Everything the installer needs from the host besides plain file I/O goes
//! through [`Platform`]: finding and stopping processes, shortcuts, the
//! uninstall registry, the native installer and launching programs. Tests
//! substitute a fake; [`SystemPlatform`] is the real adapter.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use emberup_schema::PackageVersion;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed: {status}")]
    ToolFailed { tool: String, status: String },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("Could not terminate process {0}")]
    KillRefused(u32),
}

/// Result of looking up a running process by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLookup {
    Found(u32),
    NotFound,
}

/// Result of waiting for a process to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitWait {
    Exited,
    /// The process was already gone when the wait began.
    AlreadyExited,
    TimedOut,
}

/// Result of a forced termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Terminated,
    AlreadyExited,
}

/// A launcher entry pointing at a program or a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub name: String,
    pub target: ShortcutTarget,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutTarget {
    Program { path: PathBuf, args: Vec<String> },
    Url(String),
}

/// An entry in the OS list of installed programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UninstallEntry {
    pub display_name: String,
    pub application_version: Option<PackageVersion>,
    pub display_version: String,
    pub publisher: String,
    pub display_icon: PathBuf,
    #[serde(rename = "URLInfoAbout")]
    pub url_info_about: String,
    pub contact: String,
    /// `yyyyMMdd`
    pub install_date: String,
    pub uninstall_string: String,
}

/// Host services used by the installer.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Find a running process by name, ignoring case and a `.exe` suffix.
    async fn find_process(&self, name: &str) -> ProcessLookup;

    /// Wait up to `timeout` for `pid` to exit.
    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> ExitWait;

    async fn terminate(&self, pid: u32) -> Result<Termination, PlatformError>;

    async fn create_shortcuts(&self, shortcuts: &[Shortcut]) -> Result<(), PlatformError>;

    async fn register_uninstaller(&self, entry: &UninstallEntry) -> Result<(), PlatformError>;

    /// Run the OS package installer quietly, logging to `log_file`.
    async fn run_native_installer(&self, package: &Path, log_file: &Path)
    -> Result<(), PlatformError>;

    /// Start a program without waiting for it.
    async fn launch(&self, executable: &Path, args: &[String]) -> Result<(), PlatformError>;

    async fn start_service(&self, name: &str) -> Result<(), PlatformError>;
}

/// The real host adapter.
///
/// Shortcuts are written as `.url` files on Windows and freedesktop
/// `.desktop` files elsewhere. Uninstall entries are JSON documents in
/// `registry_dir`.
#[derive(Debug, Clone)]
pub struct SystemPlatform {
    shortcut_dir: Option<PathBuf>,
    registry_dir: Option<PathBuf>,
    poll_interval: Duration,
}

impl SystemPlatform {
    pub fn new(shortcut_dir: Option<PathBuf>, registry_dir: Option<PathBuf>) -> Self {
        Self {
            shortcut_dir,
            registry_dir,
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Adapter with the default shortcut and registry locations for `folder`.
    pub fn for_folder(folder: &str) -> Self {
        Self::new(
            crate::paths::shortcut_dir(folder),
            crate::paths::uninstall_registry_dir(),
        )
    }
}

fn process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_process(Pid::from_u32(pid))
}

fn same_process_name(actual: &str, wanted: &str) -> bool {
    let strip = |s: &str| {
        let lower = s.to_ascii_lowercase();
        lower.strip_suffix(".exe").map_or(lower.clone(), str::to_string)
    };
    strip(actual) == strip(wanted)
}

async fn run_tool(tool: &str, args: &[&OsStr]) -> Result<(), PlatformError> {
    let status = tokio::process::Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(PlatformError::ToolFailed {
            tool: tool.to_string(),
            status: status.to_string(),
        })
    }
}

fn shortcut_file(shortcut: &Shortcut) -> (String, String) {
    if cfg!(windows) {
        let url = match &shortcut.target {
            ShortcutTarget::Url(url) => url.clone(),
            ShortcutTarget::Program { path, .. } => {
                format!("file:///{}", path.display().to_string().replace('\\', "/"))
            }
        };
        (
            format!("{}.url", shortcut.name),
            format!("[InternetShortcut]\r\nURL={url}\r\n"),
        )
    } else {
        let body = match &shortcut.target {
            ShortcutTarget::Url(url) => format!(
                "[Desktop Entry]\nType=Link\nName={}\nComment={}\nURL={url}\n",
                shortcut.name, shortcut.description
            ),
            ShortcutTarget::Program { path, args } => {
                let mut exec = format!("\"{}\"", path.display());
                for arg in args {
                    exec.push(' ');
                    exec.push_str(arg);
                }
                format!(
                    "[Desktop Entry]\nType=Application\nName={}\nComment={}\nExec={exec}\n",
                    shortcut.name, shortcut.description
                )
            }
        };
        (format!("{}.desktop", shortcut.name.replace(' ', "-")), body)
    }
}

#[async_trait]
impl Platform for SystemPlatform {
    async fn find_process(&self, name: &str) -> ProcessLookup {
        let name = name.to_string();
        let found = tokio::task::spawn_blocking(move || {
            let mut sys = System::new();
            sys.refresh_processes();
            sys.processes()
                .iter()
                .find(|(_, p)| same_process_name(p.name(), &name))
                .map(|(pid, _)| pid.as_u32())
        })
        .await
        .ok()
        .flatten();

        match found {
            Some(pid) => ProcessLookup::Found(pid),
            None => ProcessLookup::NotFound,
        }
    }

    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> ExitWait {
        let alive = |pid| async move {
            tokio::task::spawn_blocking(move || process_alive(pid))
                .await
                .unwrap_or(false)
        };

        if !alive(pid).await {
            return ExitWait::AlreadyExited;
        }
        // A deadline beyond what Instant can represent means wait forever.
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if !alive(pid).await {
                return ExitWait::Exited;
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return ExitWait::TimedOut;
            }
        }
    }

    async fn terminate(&self, pid: u32) -> Result<Termination, PlatformError> {
        tokio::task::spawn_blocking(move || {
            let target = Pid::from_u32(pid);
            let mut sys = System::new();
            if !sys.refresh_process(target) {
                return Ok(Termination::AlreadyExited);
            }
            match sys.process(target) {
                None => Ok(Termination::AlreadyExited),
                Some(process) if process.kill() => Ok(Termination::Terminated),
                Some(_) => Err(PlatformError::KillRefused(pid)),
            }
        })
        .await
        .map_err(|e| PlatformError::Io(std::io::Error::other(e)))?
    }

    async fn create_shortcuts(&self, shortcuts: &[Shortcut]) -> Result<(), PlatformError> {
        let dir = self
            .shortcut_dir
            .as_deref()
            .ok_or(PlatformError::Unsupported("Shortcut creation"))?;
        tokio::fs::create_dir_all(dir).await?;
        for shortcut in shortcuts {
            let (file_name, body) = shortcut_file(shortcut);
            let path = dir.join(file_name);
            tokio::fs::write(&path, body).await?;
            tracing::debug!("Created shortcut {}", path.display());
        }
        Ok(())
    }

    async fn register_uninstaller(&self, entry: &UninstallEntry) -> Result<(), PlatformError> {
        let dir = self
            .registry_dir
            .as_deref()
            .ok_or(PlatformError::Unsupported("Uninstall registration"))?;
        tokio::fs::create_dir_all(dir).await?;
        let json = serde_json::to_vec_pretty(entry).map_err(std::io::Error::other)?;
        let path = dir.join(format!("{}.json", entry.display_name));
        tokio::fs::write(&path, json).await?;
        tracing::debug!("Wrote uninstall entry {}", path.display());
        Ok(())
    }

    async fn run_native_installer(
        &self,
        package: &Path,
        log_file: &Path,
    ) -> Result<(), PlatformError> {
        if !cfg!(windows) {
            return Err(PlatformError::Unsupported("Windows Installer packages"));
        }
        if let Some(parent) = log_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        run_tool(
            "msiexec",
            &[
                OsStr::new("/i"),
                package.as_os_str(),
                OsStr::new("/quiet"),
                OsStr::new("/l"),
                log_file.as_os_str(),
            ],
        )
        .await
    }

    async fn launch(&self, executable: &Path, args: &[String]) -> Result<(), PlatformError> {
        let child = tokio::process::Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        tracing::info!(pid = ?child.id(), "Started {}", executable.display());
        Ok(())
    }

    async fn start_service(&self, name: &str) -> Result<(), PlatformError> {
        if cfg!(windows) {
            run_tool("net", &[OsStr::new("start"), OsStr::new(name)]).await
        } else {
            run_tool("systemctl", &[OsStr::new("start"), OsStr::new(name)]).await
        }
    }
}
