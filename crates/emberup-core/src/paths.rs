//! Filesystem locations: product data roots, scratch space, shortcut and
//! uninstall registry directories.

use std::path::{Path, PathBuf};

use crate::product::{DataBase, ProductProfile};

/// Base directory for product data, honouring `EMBERUP_DATA_DIR`.
pub fn data_base_dir(base: DataBase) -> Option<PathBuf> {
    if let Ok(val) = std::env::var("EMBERUP_DATA_DIR") {
        return Some(PathBuf::from(val));
    }
    match base {
        DataBase::User => dirs::data_dir(),
        DataBase::Shared => std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .or_else(dirs::data_local_dir),
    }
}

/// Choose the data root for a product under `base`.
///
/// An existing directory under the current name wins, then an existing
/// directory under a legacy name, otherwise the current name is used.
pub fn choose_install_root(base: &Path, names: &[&str]) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = names.iter().map(|n| base.join(n)).collect();
    candidates
        .iter()
        .find(|p| p.is_dir())
        .or_else(|| candidates.first())
        .cloned()
}

/// Default data root for a product, or None if no base directory is known.
pub fn default_install_root(profile: &ProductProfile) -> Option<PathBuf> {
    let base = data_base_dir(profile.data_base)?;
    choose_install_root(&base, profile.data_dir_names)
}

/// The Windows directory (`%windir%`), falling back to `C:\Windows`.
pub fn windows_dir() -> PathBuf {
    std::env::var_os("SystemRoot")
        .or_else(|| std::env::var_os("windir"))
        .map_or_else(|| PathBuf::from(r"C:\Windows"), PathBuf::from)
}

/// Scratch directory for downloads: `<tmp>/emberup`.
pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join("emberup")
}

/// Directory holding uninstall registrations written by the default platform adapter.
pub fn uninstall_registry_dir() -> Option<PathBuf> {
    data_base_dir(DataBase::User).map(|d| d.join("emberup").join("uninstall"))
}

/// Directory launch shortcuts are written to.
///
/// Windows groups shortcuts in a start-menu folder; elsewhere they go into the
/// freedesktop applications directory.
pub fn shortcut_dir(folder: &str) -> Option<PathBuf> {
    let data = dirs::data_dir()?;
    if cfg!(windows) {
        Some(
            data.join("Microsoft")
                .join("Windows")
                .join("Start Menu")
                .join("Programs")
                .join(folder),
        )
    } else {
        Some(data.join("applications"))
    }
}
