//! Getting a running instance of the product out of the way.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::platform::{ExitWait, Platform, PlatformError, ProcessLookup, Termination};
use crate::product::ShutdownStrategy;

#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("Shutdown request was rejected: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Could not terminate process {pid}: {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: PlatformError,
    },
}

/// What happened to the running instance, if there was one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Nothing to stop.
    NotRunning,
    /// The product is never stopped by the installer.
    Skipped,
    /// Graceful shutdown was acknowledged and the process exited.
    Stopped,
    /// Graceful shutdown was acknowledged but the process outlived the wait.
    StillExiting,
    /// The management endpoint did not answer; continuing regardless.
    Unreachable,
    /// The process was killed.
    Terminated,
}

/// Timeouts for the graceful path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// How long to wait for the shutdown endpoint to answer.
    pub request: Duration,
    /// How long to wait for the process to exit after it acknowledged.
    pub exit_wait: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            exit_wait: Duration::from_secs(30),
        }
    }
}

/// Stops running instances before their files are replaced.
pub struct ProcessCoordinator<'a> {
    platform: &'a dyn Platform,
    client: &'a Client,
    shutdown_url: &'a str,
    timeouts: ShutdownTimeouts,
}

impl std::fmt::Debug for ProcessCoordinator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessCoordinator")
            .field("shutdown_url", &self.shutdown_url)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl<'a> ProcessCoordinator<'a> {
    pub fn new(platform: &'a dyn Platform, client: &'a Client, shutdown_url: &'a str) -> Self {
        Self {
            platform,
            client,
            shutdown_url,
            timeouts: ShutdownTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ShutdownTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Stop the process called `process_name` using `strategy`.
    ///
    /// Only a rejected graceful request or a failed kill is an error; an
    /// unreachable endpoint or a slow exit is logged and tolerated.
    pub async fn stop(
        &self,
        process_name: Option<&str>,
        strategy: ShutdownStrategy,
    ) -> Result<ShutdownOutcome, ShutdownError> {
        let Some(name) = process_name else {
            return Ok(ShutdownOutcome::Skipped);
        };
        if strategy == ShutdownStrategy::Leave {
            return Ok(ShutdownOutcome::Skipped);
        }

        let ProcessLookup::Found(pid) = self.platform.find_process(name).await else {
            tracing::debug!("{name} is not running");
            return Ok(ShutdownOutcome::NotRunning);
        };

        match strategy {
            ShutdownStrategy::Graceful => self.request_shutdown(name, pid).await,
            ShutdownStrategy::Terminate => {
                tracing::info!(pid, "Terminating {name}");
                match self.platform.terminate(pid).await {
                    Ok(Termination::Terminated) => Ok(ShutdownOutcome::Terminated),
                    Ok(Termination::AlreadyExited) => Ok(ShutdownOutcome::NotRunning),
                    Err(source) => Err(ShutdownError::Terminate { pid, source }),
                }
            }
            ShutdownStrategy::Leave => Ok(ShutdownOutcome::Skipped),
        }
    }

    async fn request_shutdown(&self, name: &str, pid: u32) -> Result<ShutdownOutcome, ShutdownError> {
        tracing::info!(pid, url = self.shutdown_url, "Requesting shutdown of {name}");
        let response = self
            .client
            .post(self.shutdown_url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .body("")
            .timeout(self.timeouts.request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match response {
            Ok(_) => {}
            Err(e) if e.is_timeout() || e.is_connect() => {
                tracing::warn!("Shutdown endpoint did not respond, continuing: {e}");
                return Ok(ShutdownOutcome::Unreachable);
            }
            Err(e) => return Err(ShutdownError::Request(e)),
        }

        match self.platform.wait_for_exit(pid, self.timeouts.exit_wait).await {
            ExitWait::Exited | ExitWait::AlreadyExited => Ok(ShutdownOutcome::Stopped),
            ExitWait::TimedOut => {
                tracing::warn!(
                    "{name} still running after {:?}, continuing",
                    self.timeouts.exit_wait
                );
                Ok(ShutdownOutcome::StillExiting)
            }
        }
    }
}
