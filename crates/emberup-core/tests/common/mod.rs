#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use emberup_core::platform::{
    ExitWait, Platform, PlatformError, ProcessLookup, Shortcut, Termination, UninstallEntry,
};
use emberup_core::reporter::{Phase, Reporter};
use emberup_core::retry::RetryPolicy;
use emberup_core::swap::SwapPolicy;
use zip::write::SimpleFileOptions;

/// In-memory stand-in for the host OS.
#[derive(Debug)]
pub struct FakePlatform {
    pub running_pid: Option<u32>,
    pub exit_wait: ExitWait,
    pub kill_fails: bool,
    pub launch_fails: bool,
    pub registration_fails: bool,
    pub terminated: Mutex<Vec<u32>>,
    pub shortcuts: Mutex<Vec<Shortcut>>,
    pub uninstall_entries: Mutex<Vec<UninstallEntry>>,
    pub native_installs: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub launched: Mutex<Vec<(PathBuf, Vec<String>)>>,
    pub services: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn idle() -> Self {
        Self {
            running_pid: None,
            exit_wait: ExitWait::Exited,
            kill_fails: false,
            launch_fails: false,
            registration_fails: false,
            terminated: Mutex::default(),
            shortcuts: Mutex::default(),
            uninstall_entries: Mutex::default(),
            native_installs: Mutex::default(),
            launched: Mutex::default(),
            services: Mutex::default(),
        }
    }

    pub fn running(pid: u32) -> Self {
        Self {
            running_pid: Some(pid),
            ..Self::idle()
        }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn find_process(&self, _name: &str) -> ProcessLookup {
        match self.running_pid {
            Some(pid) => ProcessLookup::Found(pid),
            None => ProcessLookup::NotFound,
        }
    }

    async fn wait_for_exit(&self, _pid: u32, _timeout: Duration) -> ExitWait {
        self.exit_wait
    }

    async fn terminate(&self, pid: u32) -> Result<Termination, PlatformError> {
        if self.kill_fails {
            return Err(PlatformError::KillRefused(pid));
        }
        self.terminated.lock().unwrap().push(pid);
        Ok(Termination::Terminated)
    }

    async fn create_shortcuts(&self, shortcuts: &[Shortcut]) -> Result<(), PlatformError> {
        if self.registration_fails {
            return Err(PlatformError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "start menu is read-only",
            )));
        }
        self.shortcuts.lock().unwrap().extend_from_slice(shortcuts);
        Ok(())
    }

    async fn register_uninstaller(&self, entry: &UninstallEntry) -> Result<(), PlatformError> {
        self.uninstall_entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn run_native_installer(
        &self,
        package: &Path,
        log_file: &Path,
    ) -> Result<(), PlatformError> {
        self.native_installs
            .lock()
            .unwrap()
            .push((package.to_path_buf(), log_file.to_path_buf()));
        Ok(())
    }

    async fn launch(&self, executable: &Path, args: &[String]) -> Result<(), PlatformError> {
        if self.launch_fails {
            return Err(PlatformError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )));
        }
        self.launched
            .lock()
            .unwrap()
            .push((executable.to_path_buf(), args.to_vec()));
        Ok(())
    }

    async fn start_service(&self, name: &str) -> Result<(), PlatformError> {
        self.services.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Keeps the warnings a run reports.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub warnings: Mutex<Vec<String>>,
}

impl Reporter for RecordingReporter {
    fn status(&self, _: &str) {}
    fn phase(&self, _: Phase) {}
    fn progress(&self, _: f64) {}
    fn warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

pub fn quick_swap() -> SwapPolicy {
    SwapPolicy {
        backup_move: RetryPolicy::new(3, Duration::from_millis(1)),
        extract: RetryPolicy::new(4, Duration::from_millis(1)),
    }
}

pub fn quick_download() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

/// Write a zip package with the given files.
pub fn write_package(path: &Path, files: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

pub fn package_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    write_package(tmp.path(), files);
    fs::read(tmp.path()).unwrap()
}

/// Relative path → contents for every file below `dir`.
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .map(Result::unwrap)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}
