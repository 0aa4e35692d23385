//! emberup - install and update Emby products
//!
//! Installs a product from the package catalog, or applies an update archive
//! handed over by a running instance of the product.
//!
//! Arguments may be given as flags (`--product mbt --class beta`) or in the
//! legacy `key=value` form older launchers pass (`product=mbt class=beta`).
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use emberup_core::config::{
    DEFAULT_CATALOG_URL, DEFAULT_SHUTDOWN_URL, DEFAULT_USAGE_URL, Endpoints, InstallRequest,
};
use emberup_core::{ProductKind, Reporter};
use emberup_schema::{InstallOperation, PackageVersion, ReleaseChannel};
use tokio_util::sync::CancellationToken;

/// Keys accepted in the legacy `key=value` argument form.
const LEGACY_KEYS: &[&str] = &[
    "archive",
    "product",
    "class",
    "version",
    "service",
    "installpath",
    "startpath",
    "systempath",
    "caller",
];

#[derive(Debug, Parser)]
#[command(name = "emberup")]
#[command(author, version = env!("EMBERUP_VERSION"), about = "emberup - install and update Emby products")]
pub struct Cli {
    /// Product to install: server, mbt (theater) or mbc (classic)
    #[arg(long, default_value = "server")]
    pub product: ProductKind,

    /// Highest version to install (defaults to the latest)
    #[arg(long)]
    pub version: Option<PackageVersion>,

    /// Least stable release channel to accept: stable, beta or dev
    #[arg(long = "class", visible_alias = "channel", default_value = "stable")]
    pub channel: ReleaseChannel,

    /// Install this archive instead of downloading one
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Start this service after installing instead of the program
    #[arg(long)]
    pub service: Option<String>,

    /// Installation root (defaults to the product's data directory)
    #[arg(long = "installpath")]
    pub install_path: Option<PathBuf>,

    /// Program to launch after installing
    #[arg(long = "startpath")]
    pub start_path: Option<PathBuf>,

    /// Directory holding the program files
    #[arg(long = "systempath")]
    pub system_path: Option<PathBuf>,

    /// Process id of the program that requested an update; waited on before updating
    #[arg(long)]
    pub caller: Option<u32>,

    #[arg(long, env = "EMBERUP_CATALOG_URL", default_value = DEFAULT_CATALOG_URL, hide_default_value = true)]
    pub catalog_url: String,

    #[arg(long, env = "EMBERUP_USAGE_URL", default_value = DEFAULT_USAGE_URL, hide_default_value = true)]
    pub usage_url: String,

    /// Do not report the install to the usage service
    #[arg(long)]
    pub no_usage_report: bool,

    #[arg(long, env = "EMBERUP_SHUTDOWN_URL", default_value = DEFAULT_SHUTDOWN_URL, hide_default_value = true)]
    pub shutdown_url: String,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// A caller handing over to us means an update; otherwise a fresh install.
    pub fn operation(&self) -> InstallOperation {
        if self.caller.is_some() {
            InstallOperation::Update
        } else {
            InstallOperation::Install
        }
    }

    pub fn into_request(self, reporter: Arc<dyn Reporter>, cancel: CancellationToken) -> InstallRequest {
        let mut request = InstallRequest::new(self.operation(), self.product)
            .with_channel(self.channel)
            .with_endpoints(Endpoints {
                catalog_url: self.catalog_url,
                usage_url: (!self.no_usage_report).then_some(self.usage_url),
                shutdown_url: self.shutdown_url,
            })
            .with_reporter(reporter)
            .with_cancel(cancel);
        request.version = self.version;
        request.archive = self.archive;
        request.install_root = self.install_path;
        request.executable = self.start_path;
        request.system_dir = self.system_path;
        request.service = self.service;
        request
    }
}

/// Rewrite legacy `key=value` arguments as `--key=value` so clap can parse them.
///
/// ```
/// let args = emberup_cli::normalize_args(["emberup", "product=mbt", "Class=Beta", "--quiet"]);
/// assert_eq!(args, ["emberup", "--product=mbt", "--class=Beta", "--quiet"]);
/// ```
pub fn normalize_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut out: Vec<String> = args.next().into_iter().collect();
    for arg in args {
        match arg.split_once('=') {
            Some((key, value))
                if !key.starts_with('-')
                    && LEGACY_KEYS.contains(&key.to_ascii_lowercase().as_str()) =>
            {
                out.push(format!("--{}={value}", key.to_ascii_lowercase()));
            }
            _ => out.push(arg),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberup_core::NullReporter;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["emberup"];
        full.extend_from_slice(args);
        Cli::try_parse_from(normalize_args(full)).unwrap()
    }

    #[test]
    fn test_legacy_arguments() {
        let cli = parse(&[
            "product=mbt",
            "class=Beta",
            "version=3.0.5",
            "archive=C:/tmp/update.zip",
            "caller=1234",
        ]);
        assert_eq!(cli.product, ProductKind::TheaterFrontend);
        assert_eq!(cli.channel, ReleaseChannel::Beta);
        assert_eq!(cli.version, Some(PackageVersion::new(3, 0, 5, 0)));
        assert_eq!(cli.caller, Some(1234));
        assert_eq!(cli.operation(), InstallOperation::Update);
    }

    #[test]
    fn test_flag_arguments_and_defaults() {
        let cli = parse(&["--product", "server"]);
        assert_eq!(cli.channel, ReleaseChannel::Stable);
        assert_eq!(cli.operation(), InstallOperation::Install);
        assert!(cli.archive.is_none());
    }

    #[test]
    fn test_values_containing_equals_are_untouched() {
        let args = normalize_args(["emberup", "--archive", "a=b.zip"]);
        assert_eq!(args, ["emberup", "--archive", "a=b.zip"]);
    }

    #[test]
    fn test_into_request_maps_paths_and_endpoints() {
        let cli = parse(&[
            "installpath=/data/emby",
            "systempath=/data/emby/system",
            "service=Emby",
            "--no-usage-report",
            "--catalog-url",
            "http://localhost/catalog",
        ]);
        let request = cli.into_request(Arc::new(NullReporter), CancellationToken::new());

        assert_eq!(request.install_root, Some(PathBuf::from("/data/emby")));
        assert_eq!(request.system_dir, Some(PathBuf::from("/data/emby/system")));
        assert_eq!(request.service.as_deref(), Some("Emby"));
        assert_eq!(request.endpoints.catalog_url, "http://localhost/catalog");
        assert!(request.endpoints.usage_url.is_none());
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        assert!(Cli::try_parse_from(normalize_args(["emberup", "product=toaster"])).is_err());
    }
}
