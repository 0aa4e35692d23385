//! Archive extraction module
//!
//! Handles zip, tar, tar.gz and tar.zst. Files already present at the
//! destination are overwritten; entries that would land outside it are
//! rejected.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;
use zstd::stream::Decoder as ZstdDecoder;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl ExtractError {
    /// True when the archive itself is unreadable, as opposed to the
    /// destination being unwritable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Archive(_) | Self::UnsupportedFormat(_))
    }
}

/// Package formats the installer can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarZst,
    /// A Windows Installer package, run with the OS installer instead of unpacked.
    NativeInstaller,
    Unknown,
}

/// Information about an extracted entry
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    pub is_dir: bool,
}

/// Extract a tar.zst archive to a destination directory
pub fn extract_tar_zst(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let zstd_decoder = ZstdDecoder::new(reader)?;

    extract_tar(zstd_decoder, dest_dir)
}

/// Extract a tar.gz archive to a destination directory
pub fn extract_tar_gz(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let gz_decoder = flate2::read::GzDecoder::new(reader);

    extract_tar(gz_decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    let mut extracted_files = Vec::new();

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let entry_path = entry.path().map_err(archive_error)?.into_owned();
        let relative_path = enclosed(&entry_path)?;
        if relative_path.as_os_str().is_empty() {
            continue;
        }
        let absolute_path = dest_dir.join(&relative_path);
        let is_dir = entry.header().entry_type().is_dir();

        if is_dir {
            fs::create_dir_all(&absolute_path)?;
        } else {
            if let Some(parent) = absolute_path.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&absolute_path)?;
        }

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_dir,
        });
    }

    Ok(extracted_files)
}

/// Extract a zip archive
pub fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative_path) = file.enclosed_name() else {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                file.name()
            )));
        };
        let absolute_path = dest_dir.join(&relative_path);

        if file.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            extracted_files.push(ExtractedFile {
                relative_path,
                absolute_path,
                is_dir: true,
            });
            continue;
        }

        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_dir: false,
        });
    }

    Ok(extracted_files)
}

/// Detect the package format from its extension, falling back to the
/// file's leading bytes.
pub fn detect_format(path: &Path) -> ArchiveFormat {
    let path_str = path.to_string_lossy().to_lowercase();

    if path_str.ends_with(".tar.zst") || path_str.ends_with(".tzst") {
        ArchiveFormat::TarZst
    } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
        ArchiveFormat::TarGz
    } else if path_str.ends_with(".tar") {
        ArchiveFormat::Tar
    } else if path_str.ends_with(".zip") {
        ArchiveFormat::Zip
    } else if path_str.ends_with(".msi") {
        ArchiveFormat::NativeInstaller
    } else {
        sniff_format(path).unwrap_or(ArchiveFormat::Unknown)
    }
}

fn sniff_format(path: &Path) -> io::Result<ArchiveFormat> {
    let mut head = [0u8; 512];
    let mut file = File::open(path)?;
    let mut len = 0;
    while len < head.len() {
        let n = file.read(&mut head[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    let head = &head[..len];

    let format = if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        ArchiveFormat::Zip
    } else if head.starts_with(&[0x1f, 0x8b]) {
        ArchiveFormat::TarGz
    } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        ArchiveFormat::TarZst
    } else if head.starts_with(&[0xd0, 0xcf, 0x11, 0xe0]) {
        ArchiveFormat::NativeInstaller
    } else if head.len() >= 262 && &head[257..262] == b"ustar" {
        ArchiveFormat::Tar
    } else {
        ArchiveFormat::Unknown
    };
    Ok(format)
}

/// Extract an archive, auto-detecting format
pub fn extract_auto(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    match detect_format(archive_path) {
        ArchiveFormat::TarZst => extract_tar_zst(archive_path, dest_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
        ArchiveFormat::Tar => {
            let file = File::open(archive_path)?;
            extract_tar(BufReader::new(file), dest_dir)
        }
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::NativeInstaller | ArchiveFormat::Unknown => Err(
            ExtractError::UnsupportedFormat(archive_path.display().to_string()),
        ),
    }
}

/// Reject absolute paths and `..` so an entry cannot escape the destination.
fn enclosed(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::Archive(format!(
                    "Invalid path in archive: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(out)
}

fn archive_error(e: io::Error) -> ExtractError {
    ExtractError::Archive(e.to_string())
}
