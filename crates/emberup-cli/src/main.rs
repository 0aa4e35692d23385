//! emberup - install and update Emby products

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use emberup_cli::ui::{ConsoleReporter, UiActor, UiEvent};
use emberup_cli::{Cli, normalize_args};
use emberup_core::paths::scratch_dir;
use emberup_core::platform::ExitWait;
use emberup_core::swap::remove_dir_if_exists;
use emberup_core::{Installer, Platform, Reporter, RunStatus, SystemPlatform};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_from(normalize_args(std::env::args()));
    let platform = Arc::new(SystemPlatform::for_folder(
        cli.product.profile().shortcut_folder,
    ));

    let ui = UiActor::spawn(cli.quiet);
    let reporter = Arc::new(ConsoleReporter::new(ui.sender()));

    if let Some(pid) = cli.caller {
        reporter.status(&format!("Waiting for process {pid} to exit..."));
        // The caller exits on its own once it has handed over; wait as long as it takes.
        if platform.wait_for_exit(pid, Duration::MAX).await == ExitWait::TimedOut {
            tracing::warn!(pid, "Caller still running");
        }
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Cancellation requested");
            on_ctrl_c.cancel();
        }
    });

    let request = cli.into_request(reporter, cancel);
    let scratch = request.scratch_dir.clone().unwrap_or_else(scratch_dir);
    let sender = ui.sender();

    let result = Installer::new(request, platform).run().await;

    let code = match result.status {
        RunStatus::Succeeded => {
            let _ = sender.send(UiEvent::Success(result.message));
            0
        }
        RunStatus::Canceled => {
            if let Err(e) = remove_dir_if_exists(&scratch).await {
                tracing::warn!("Could not clear {}: {e}", scratch.display());
            }
            let _ = sender.send(UiEvent::Warning(result.message));
            2
        }
        RunStatus::Failed => {
            let _ = sender.send(UiEvent::Error(result.detail()));
            1
        }
    };

    ui.finish();
    Ok(ExitCode::from(code))
}
