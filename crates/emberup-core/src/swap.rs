//! Backup, extract and rollback of the product's system directory.
//!
//! The system directory is moved aside before extraction and restored if
//! extraction ultimately fails, so a run leaves either the complete old
//! install or the complete new one. The backup never outlives a run that
//! finished normally.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::io::extract::{ExtractError, ExtractedFile, extract_auto};
use crate::retry::{RetryError, RetryPolicy, retry};

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Could not delete previous backup directory {}", path.display())]
    StaleBackup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not move {} to {}. A file may still be in use.", from.display(), to.display())]
    BackupMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: RetryError<io::Error>,
    },

    #[error(
        "Could not extract {} into {}{}",
        archive.display(),
        root.display(),
        rollback_note(rollback.as_ref(), backup)
    )]
    Extract {
        archive: PathBuf,
        root: PathBuf,
        /// Where the previous install was moved before extraction.
        backup: PathBuf,
        #[source]
        source: RetryError<ExtractError>,
        /// Set when restoring the previous install also failed.
        rollback: Option<io::Error>,
    },
}

fn rollback_note(rollback: Option<&io::Error>, backup: &Path) -> String {
    rollback.map_or_else(String::new, |e| {
        format!(
            ". Restoring the previous install also failed ({e}); it remains at {}",
            backup.display()
        )
    })
}

/// Retry budgets for the two steps that contend with other processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPolicy {
    pub backup_move: RetryPolicy,
    pub extract: RetryPolicy,
}

impl Default for SwapPolicy {
    fn default() -> Self {
        Self {
            backup_move: RetryPolicy::backup_move(),
            extract: RetryPolicy::extract(),
        }
    }
}

/// What a successful swap did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    /// Entries written by the extraction.
    pub entries: usize,
    /// Whether a previous install was moved aside (and then discarded).
    pub replaced_existing: bool,
    /// The backup could not be deleted and is still on disk.
    pub backup_kept: bool,
}

/// Replaces the system directory under an install root with an archive's contents.
#[derive(Debug, Clone)]
pub struct DirectorySwap {
    root: PathBuf,
    system_dir: PathBuf,
    backup_dir: PathBuf,
    policy: SwapPolicy,
}

impl DirectorySwap {
    pub fn new(root: PathBuf, system_dir: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            root,
            system_dir,
            backup_dir,
            policy: SwapPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SwapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Back up, extract `archive` into the root, and discard the backup.
    ///
    /// On extraction failure the partially written system directory is
    /// removed and the backup is moved back before the error is returned.
    pub async fn swap_and_extract(&self, archive: &Path) -> Result<SwapReport, SwapError> {
        let replaced_existing = self.back_up().await?;

        match self.extract(archive).await {
            Ok(files) => {
                tracing::info!(
                    entries = files.len(),
                    root = %self.root.display(),
                    "Extraction complete"
                );
                let backup_kept = match remove_dir_if_exists(&self.backup_dir).await {
                    Ok(_) => false,
                    Err(e) => {
                        tracing::warn!("Could not delete backup {}: {e}", self.backup_dir.display());
                        true
                    }
                };
                Ok(SwapReport {
                    entries: files.len(),
                    replaced_existing,
                    backup_kept,
                })
            }
            Err(source) => {
                tracing::error!("Extraction failed, rolling back: {source}");
                let rollback = self.roll_back(replaced_existing).await.err();
                if let Some(e) = &rollback {
                    tracing::error!(
                        "Rollback failed, previous install remains at {}: {e}",
                        self.backup_dir.display()
                    );
                }
                Err(SwapError::Extract {
                    archive: archive.to_path_buf(),
                    root: self.root.clone(),
                    backup: self.backup_dir.clone(),
                    source,
                    rollback,
                })
            }
        }
    }

    /// Move the system directory to the backup path.
    ///
    /// Returns false when there is nothing to back up (fresh install).
    pub async fn back_up(&self) -> Result<bool, SwapError> {
        remove_dir_if_exists(&self.backup_dir)
            .await
            .map_err(|source| SwapError::StaleBackup {
                path: self.backup_dir.clone(),
                source,
            })?;

        if !tokio::fs::try_exists(&self.system_dir).await.unwrap_or(false) {
            tracing::debug!("No existing system directory at {}", self.system_dir.display());
            return Ok(false);
        }

        let from = self.system_dir.clone();
        let to = self.backup_dir.clone();
        retry(
            self.policy.backup_move,
            "Backup of system directory",
            |_: &io::Error| true,
            |_| {
                let from = from.clone();
                let to = to.clone();
                async move { tokio::fs::rename(&from, &to).await }
            },
        )
        .await
        .map_err(|source| SwapError::BackupMove {
            from: self.system_dir.clone(),
            to: self.backup_dir.clone(),
            source,
        })?;

        tracing::info!(
            "Moved {} to {}",
            self.system_dir.display(),
            self.backup_dir.display()
        );
        Ok(true)
    }

    async fn extract(&self, archive: &Path) -> Result<Vec<ExtractedFile>, RetryError<ExtractError>> {
        retry(
            self.policy.extract,
            "Extraction",
            |_: &ExtractError| true,
            |_| {
                let archive = archive.to_path_buf();
                let root = self.root.clone();
                async move {
                    tokio::task::spawn_blocking(move || extract_auto(&archive, &root))
                        .await
                        .map_err(|e| ExtractError::Io(io::Error::other(e)))?
                }
            },
        )
        .await
    }

    /// Remove whatever extraction left behind and restore the backup.
    pub async fn roll_back(&self, restore_backup: bool) -> io::Result<()> {
        remove_dir_if_exists(&self.system_dir).await?;
        if restore_backup {
            tokio::fs::rename(&self.backup_dir, &self.system_dir).await?;
            tracing::info!("Restored previous install to {}", self.system_dir.display());
        }
        Ok(())
    }
}

/// Recursively delete `path` if it exists. Returns whether anything was removed.
pub async fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete a file if it exists. Returns whether anything was removed.
pub async fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
