//! Installable products and their defaults.
//!
//! Each product is a tagged variant carrying its own defaults as static data.
//! Nothing in the installer branches on product names; it reads the profile.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The products this installer knows how to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProductKind {
    /// The media server (runs headless or as a service).
    #[default]
    Server,
    /// The classic client hosted inside the Windows Media Center shell.
    Client,
    /// The stand-alone theater front-end.
    TheaterFrontend,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown product '{0}' (expected server, mbt/theater or mbc/classic)")]
pub struct UnknownProduct(pub String);

impl FromStr for ProductKind {
    type Err = UnknownProduct;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" | "mbs" => Ok(Self::Server),
            "mbc" | "classic" | "client" => Ok(Self::Client),
            "mbt" | "theater" => Ok(Self::TheaterFrontend),
            _ => Err(UnknownProduct(s.to_string())),
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().friendly_name)
    }
}

/// Which well-known directory a product's data root lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBase {
    /// Per-user application data.
    User,
    /// Machine-wide application data.
    Shared,
}

/// Where the product's executable lives by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableLocation {
    /// A file inside the product's system directory.
    InSystemDir(&'static str),
    /// A path relative to the Windows directory (`%windir%`).
    InWindowsDir(&'static [&'static str]),
}

/// How to get a running instance out of the way before files are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStrategy {
    /// Ask politely via the local management endpoint, then wait.
    Graceful,
    /// Kill the process; there is no server state to corrupt.
    Terminate,
    /// The product is hosted by a shared OS process; never touch it.
    Leave,
}

/// A URL shortcut created next to the main program shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlShortcut {
    pub name: &'static str,
    pub url: &'static str,
    pub description: &'static str,
}

/// Static defaults for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductProfile {
    pub kind: ProductKind,
    /// Name the catalog publishes the package under.
    pub package_name: &'static str,
    pub friendly_name: &'static str,
    /// Candidate data-root directory names, current name first, then legacy names.
    pub data_dir_names: &'static [&'static str],
    pub data_base: DataBase,
    /// Name of the directory under the data root that holds program files.
    pub system_dir_name: &'static str,
    pub executable: ExecutableLocation,
    /// Process name of a running instance (without `.exe`).
    pub process_name: Option<&'static str>,
    pub shutdown: ShutdownStrategy,
    pub launch_args: &'static [&'static str],
    pub extra_shortcuts: &'static [UrlShortcut],
    /// Start-menu folder the shortcuts are grouped under.
    pub shortcut_folder: &'static str,
    /// Argument passed to the uninstaller to select this product.
    pub uninstaller_arg: &'static str,
}

const SERVER: ProductProfile = ProductProfile {
    kind: ProductKind::Server,
    package_name: "MBServer",
    friendly_name: "Emby Server",
    data_dir_names: &["Emby-Server", "MediaBrowser-Server"],
    data_base: DataBase::User,
    system_dir_name: "system",
    executable: ExecutableLocation::InSystemDir("MediaBrowser.ServerApplication.exe"),
    process_name: Some("MediaBrowser.ServerApplication"),
    shutdown: ShutdownStrategy::Graceful,
    launch_args: &[],
    extra_shortcuts: &[UrlShortcut {
        name: "Emby Server Dashboard",
        url: "http://localhost:8096/web/dashboard.html",
        description: "Open the Emby Server Dashboard",
    }],
    shortcut_folder: "Emby",
    uninstaller_arg: "server",
};

const CLIENT: ProductProfile = ProductProfile {
    kind: ProductKind::Client,
    package_name: "MBClassic",
    friendly_name: "Emby for WMC",
    data_dir_names: &["MediaBrowser-Classic"],
    data_base: DataBase::Shared,
    system_dir_name: "system",
    executable: ExecutableLocation::InWindowsDir(&["ehome", "ehshell.exe"]),
    process_name: None,
    shutdown: ShutdownStrategy::Leave,
    launch_args: &[
        "/nostartupanimation",
        r"/entrypoint:{CE32C570-4BEC-4aeb-AD1D-CF47B91DE0B2}\{FC9ABCCC-36CB-47ac-8BAB-03E8EF5F6F22}",
    ],
    extra_shortcuts: &[],
    shortcut_folder: "Emby",
    uninstaller_arg: "mbt",
};

const THEATER: ProductProfile = ProductProfile {
    kind: ProductKind::TheaterFrontend,
    package_name: "MBTheater",
    friendly_name: "Emby Theater",
    data_dir_names: &["Emby-Theater", "MediaBrowser-Theater"],
    data_base: DataBase::User,
    system_dir_name: "system",
    executable: ExecutableLocation::InSystemDir("MediaBrowser.UI.exe"),
    process_name: Some("MediaBrowser.UI"),
    shutdown: ShutdownStrategy::Terminate,
    launch_args: &[],
    extra_shortcuts: &[],
    shortcut_folder: "Emby",
    uninstaller_arg: "mbt",
};

impl ProductKind {
    /// Static defaults for this product.
    pub fn profile(self) -> &'static ProductProfile {
        match self {
            Self::Server => &SERVER,
            Self::Client => &CLIENT,
            Self::TheaterFrontend => &THEATER,
        }
    }
}
