//! Install/update usage reporting.
//!
//! Reports are best-effort: callers log a failure and carry on.

use std::time::Duration;

use emberup_schema::{InstallOperation, PackageName, PackageVersion};
use reqwest::Client;
use thiserror::Error;

/// Upper bound on one report, connection included.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Usage service answered '{0}'")]
    Rejected(String),
}

/// One install/update event sent to the usage service.
#[derive(Debug, Clone)]
pub struct UsageReport<'a> {
    pub machine_id: String,
    pub product: &'a PackageName,
    pub operation: InstallOperation,
    pub version: Option<PackageVersion>,
}

/// An identifier for this machine; the host name, or "unknown".
pub fn machine_id() -> String {
    sysinfo::System::host_name()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Send `report` to `url`. The service acknowledges with the body `success`.
pub async fn report_usage(
    client: &Client,
    url: &str,
    report: &UsageReport<'_>,
) -> Result<(), UsageError> {
    let version = report.version.map(|v| v.to_string()).unwrap_or_default();
    let operation = report.operation.to_string();
    let body = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .timeout(REPORT_TIMEOUT)
        .query(&[
            ("mac", report.machine_id.as_str()),
            ("product", report.product.as_str()),
            ("operation", operation.as_str()),
            ("version", version.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    if body.trim() == "success" {
        Ok(())
    } else {
        Err(UsageError::Rejected(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_report_sends_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/installed")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("mac".into(), "host-1".into()),
                Matcher::UrlEncoded("product".into(), "MBServer".into()),
                Matcher::UrlEncoded("operation".into(), "Update".into()),
                Matcher::UrlEncoded("version".into(), "3.0.5.0".into()),
            ]))
            .with_body("success")
            .create_async()
            .await;

        let name = PackageName::new("MBServer");
        let report = UsageReport {
            machine_id: "host-1".to_string(),
            product: &name,
            operation: InstallOperation::Update,
            version: Some(PackageVersion::new(3, 0, 5, 0)),
        };
        report_usage(&Client::new(), &format!("{}/installed", server.url()), &report)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unexpected_body_is_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_body("nope")
            .create_async()
            .await;

        let name = PackageName::new("MBTheater");
        let report = UsageReport {
            machine_id: machine_id(),
            product: &name,
            operation: InstallOperation::Install,
            version: None,
        };
        let err = report_usage(&Client::new(), &server.url(), &report)
            .await
            .unwrap_err();
        assert!(matches!(err, UsageError::Rejected(body) if body == "nope"));
    }

    #[tokio::test]
    async fn test_silent_service_times_out() {
        // Accepts connections into the backlog but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/installed", listener.local_addr().unwrap());

        let name = PackageName::new("MBServer");
        let report = UsageReport {
            machine_id: "host-1".to_string(),
            product: &name,
            operation: InstallOperation::Install,
            version: None,
        };
        let outcome = tokio::time::timeout(
            REPORT_TIMEOUT + Duration::from_secs(10),
            report_usage(&Client::new(), &url, &report),
        )
        .await
        .expect("report should give up on its own");

        assert!(matches!(outcome, Err(UsageError::Http(e)) if e.is_timeout()));
        drop(listener);
    }
}
