//! Streaming package download with bounded retry and cancellation.
//!
//! Each attempt starts from an empty scratch directory, streams the archive to
//! disk while reporting progress, and checks the cancellation token between
//! chunks. Timeouts, connection failures, HTTP error statuses and interrupted
//! bodies are retried; anything else fails the download immediately.

use std::path::{Path, PathBuf};

use emberup_schema::{PackageVersionInfo, filename_from_url};
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::reporter::{Reporter, percent};
use crate::retry::{RetryError, RetryPolicy, retry};

#[derive(Error, Debug)]
pub enum DownloadError {
    /// Timeout, refused connection, error status or a body cut short.
    #[error("Network error: {0}")]
    Transient(#[source] reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        // A body cut short comes out of `bytes_stream` as a decode error.
        if err.is_timeout()
            || err.is_connect()
            || err.is_status()
            || err.is_body()
            || err.is_decode()
            || err.is_request()
        {
            Self::Transient(err)
        } else {
            Self::Http(err)
        }
    }
}

impl DownloadError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result of a download that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The archive is on disk at this path.
    Downloaded(PathBuf),
    /// Cancellation was requested; partial data has been discarded.
    Canceled,
}

/// Downloads package archives into a scratch directory.
#[derive(Debug)]
pub struct PackageFetcher<'a> {
    client: &'a Client,
    scratch_dir: &'a Path,
    policy: RetryPolicy,
}

impl<'a> PackageFetcher<'a> {
    pub fn new(client: &'a Client, scratch_dir: &'a Path) -> Self {
        Self {
            client,
            scratch_dir,
            policy: RetryPolicy::download(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Download `info` into the scratch directory.
    ///
    /// Returns [`FetchOutcome::Canceled`] if `cancel` fires at any point, which
    /// is not an error. A failure after the retry budget is spent is reported
    /// as [`RetryError::Exhausted`].
    pub async fn fetch(
        &self,
        info: &PackageVersionInfo,
        reporter: &dyn Reporter,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, RetryError<DownloadError>> {
        let label = format!("Download of {}", info.source_url);
        retry(self.policy, &label, DownloadError::is_transient, move |attempt| {
            self.attempt(info, reporter, cancel, attempt)
        })
        .await
    }

    async fn attempt(
        &self,
        info: &PackageVersionInfo,
        reporter: &dyn Reporter,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<FetchOutcome, DownloadError> {
        tracing::debug!(attempt, url = %info.source_url, "Starting download attempt");
        reset_dir(self.scratch_dir).await?;

        let dest = self.scratch_dir.join(archive_file_name(info));
        let outcome = self.stream_to(info, &dest, reporter, cancel).await;

        if !matches!(outcome, Ok(FetchOutcome::Downloaded(_))) {
            tokio::fs::remove_file(&dest).await.ok();
        }
        outcome
    }

    async fn stream_to(
        &self,
        info: &PackageVersionInfo,
        dest: &Path,
        reporter: &dyn Reporter,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, DownloadError> {
        let send = self
            .client
            .get(&info.source_url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(FetchOutcome::Canceled),
            res = send => res?.error_for_status()?,
        };

        let total = response.content_length().or(info.size);
        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_pct = None;
        reporter.progress(0.0);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(FetchOutcome::Canceled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            let pct = percent(downloaded, total);
            if pct.is_some() && pct != last_pct {
                last_pct = pct;
                if let Some(p) = pct {
                    reporter.progress(p);
                }
            }
        }

        file.flush().await?;
        tracing::info!(bytes = downloaded, path = %dest.display(), "Download complete");
        Ok(FetchOutcome::Downloaded(dest.to_path_buf()))
    }
}

/// A file name for the archive that cannot escape the scratch directory.
fn archive_file_name(info: &PackageVersionInfo) -> String {
    let candidate = Path::new(&info.target_filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    candidate.unwrap_or_else(|| {
        let from_url = filename_from_url(&info.source_url);
        if from_url.is_empty() {
            "package.zip".to_string()
        } else {
            from_url.to_string()
        }
    })
}

async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NullReporter;
    use emberup_schema::{PackageVersion, ReleaseChannel};
    use mockito::Server;
    use std::time::Duration;

    fn info(url: String) -> PackageVersionInfo {
        PackageVersionInfo {
            version: PackageVersion::new(3, 0, 5, 0),
            channel: ReleaseChannel::Stable,
            source_url: url,
            target_filename: "MBServer.zip".to_string(),
            checksum: None,
            size: None,
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_download_succeeds_after_two_failures() {
        let mut server = Server::new_async().await;
        let failures = server
            .mock("GET", "/pkg.zip")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let success = server
            .mock("GET", "/pkg.zip")
            .with_status(200)
            .with_body("archive-bytes")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("scratch");
        let client = Client::new();
        let fetcher = PackageFetcher::new(&client, &scratch).with_policy(quick());

        let outcome = fetcher
            .fetch(
                &info(format!("{}/pkg.zip", server.url())),
                &NullReporter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let FetchOutcome::Downloaded(path) = outcome else {
            panic!("expected a downloaded file");
        };
        assert_eq!(path, scratch.join("MBServer.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"archive-bytes");
        failures.assert_async().await;
        success.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_gives_up_after_three_attempts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/pkg.zip")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let client = Client::new();
        let fetcher = PackageFetcher::new(&client, tmp.path()).with_policy(quick());

        let err = fetcher
            .fetch(
                &info(format!("{}/pkg.zip", server.url())),
                &NullReporter,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(3));
        assert!(err.inner().is_transient());
        mock.assert_async().await;
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start_is_not_an_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/pkg.zip")
            .with_body("x")
            .expect(0)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let client = Client::new();
        let fetcher = PackageFetcher::new(&client, tmp.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fetcher
            .fetch(
                &info(format!("{}/pkg.zip", server.url())),
                &NullReporter,
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Canceled);
        mock.assert_async().await;
        assert!(!tmp.path().join("MBServer.zip").exists());
    }

    #[test]
    fn test_archive_file_name_cannot_escape() {
        let mut i = info("http://h/a/real.zip?sig=1".to_string());
        i.target_filename = "../../evil.zip".to_string();
        assert_eq!(archive_file_name(&i), "evil.zip");
        i.target_filename = String::new();
        assert_eq!(archive_file_name(&i), "real.zip");
    }

    #[tokio::test]
    async fn test_interrupted_body_is_retried() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/pkg.zip", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            for attempt in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await.unwrap();
                let response: &[u8] = if attempt == 0 {
                    // Promises more than it sends, then hangs up.
                    b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\narchive"
                } else {
                    b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\nConnection: close\r\n\r\narchive-bytes"
                };
                socket.write_all(response).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        let tmp = tempfile::tempdir().unwrap();
        let client = Client::new();
        let fetcher = PackageFetcher::new(&client, tmp.path()).with_policy(quick());

        let outcome = fetcher
            .fetch(&info(url), &NullReporter, &CancellationToken::new())
            .await
            .unwrap();

        let FetchOutcome::Downloaded(path) = outcome else {
            panic!("expected a downloaded file");
        };
        assert_eq!(std::fs::read(&path).unwrap(), b"archive-bytes");
        server.await.unwrap();
    }
}
