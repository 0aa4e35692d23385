//! Version resolution against the package catalog.
//!
//! The catalog is untrusted: transport and parse failures, as well as records
//! missing a version or download URL, all degrade to "no eligible version"
//! rather than an error. Release channel is a filter, never a sort key.

use std::time::Duration;

use emberup_schema::{CatalogPackage, PackageName, PackageVersion, PackageVersionInfo, ReleaseChannel};
use reqwest::Client;
use thiserror::Error;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
enum CatalogFetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed catalog response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Pick the highest usable version from the first package record.
///
/// A candidate qualifies when `channel` admits its classification and, if a
/// `ceiling` is given, its version does not exceed it.
pub fn select_best(
    packages: Vec<CatalogPackage>,
    channel: ReleaseChannel,
    ceiling: Option<PackageVersion>,
) -> Option<PackageVersionInfo> {
    let package = packages.into_iter().next()?;
    package
        .versions
        .into_iter()
        .filter_map(|v| match v.into_info() {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!("Skipping catalog entry: {e}");
                None
            }
        })
        .filter(|info| channel.admits(info.channel))
        .filter(|info| ceiling.is_none_or(|max| info.version <= max))
        .max_by_key(|info| info.version)
}

/// Queries the catalog service for a package's published versions.
#[derive(Debug)]
pub struct VersionResolver<'a> {
    client: &'a Client,
    catalog_url: &'a str,
}

impl<'a> VersionResolver<'a> {
    pub fn new(client: &'a Client, catalog_url: &'a str) -> Self {
        Self {
            client,
            catalog_url,
        }
    }

    /// Best version of `package` for `channel` not above `ceiling`, or None.
    pub async fn resolve(
        &self,
        package: &PackageName,
        channel: ReleaseChannel,
        ceiling: Option<PackageVersion>,
    ) -> Option<PackageVersionInfo> {
        let packages = match self.fetch(package).await {
            Ok(packages) => packages,
            Err(e) => {
                tracing::warn!("Could not query catalog for {package}: {e}");
                return None;
            }
        };

        let best = select_best(packages, channel, ceiling);
        match &best {
            Some(info) => tracing::info!(
                version = %info.version,
                channel = %info.channel,
                "Resolved {package}"
            ),
            None => tracing::warn!(
                "No {channel} version of {package} found{}",
                ceiling.map(|c| format!(" at or below {c}")).unwrap_or_default()
            ),
        }
        best
    }

    async fn fetch(&self, package: &PackageName) -> Result<Vec<CatalogPackage>, CatalogFetchError> {
        let body = self
            .client
            .get(self.catalog_url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .query(&[("name", package.as_str())])
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const CATALOG: &str = r#"[{
        "name": "MBServer",
        "versions": [
            {"versionStr": "3.0.5.0", "classification": "Release", "sourceUrl": "http://h/3050.zip"},
            {"versionStr": "3.0.6.0", "classification": "Beta", "sourceUrl": "http://h/3060.zip"},
            {"versionStr": "3.1.0.0", "classification": 2, "sourceUrl": "http://h/3100.zip"},
            {"versionStr": "2.9.0.0", "classification": "Release", "sourceUrl": "http://h/2900.zip"},
            {"versionStr": "9.9.9.9", "classification": "Release"},
            {"classification": "Release", "sourceUrl": "http://h/none.zip"}
        ]
    }]"#;

    fn packages() -> Vec<CatalogPackage> {
        serde_json::from_str(CATALOG).unwrap()
    }

    #[test]
    fn test_channel_filters_but_does_not_sort() {
        let best = select_best(packages(), ReleaseChannel::Stable, None).unwrap();
        assert_eq!(best.version, PackageVersion::new(3, 0, 5, 0));

        let best = select_best(packages(), ReleaseChannel::Beta, None).unwrap();
        assert_eq!(best.version, PackageVersion::new(3, 0, 6, 0));

        let best = select_best(packages(), ReleaseChannel::Dev, None).unwrap();
        assert_eq!(best.version, PackageVersion::new(3, 1, 0, 0));
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let best = select_best(
            packages(),
            ReleaseChannel::Dev,
            Some(PackageVersion::new(3, 0, 6, 0)),
        )
        .unwrap();
        assert_eq!(best.version, PackageVersion::new(3, 0, 6, 0));

        assert!(
            select_best(
                packages(),
                ReleaseChannel::Stable,
                Some(PackageVersion::new(1, 0, 0, 0))
            )
            .is_none()
        );
    }

    #[test]
    fn test_never_exceeds_ceiling_or_channel() {
        let channels = [ReleaseChannel::Stable, ReleaseChannel::Beta, ReleaseChannel::Dev];
        let ceilings = [
            None,
            Some(PackageVersion::new(2, 0, 0, 0)),
            Some(PackageVersion::new(2, 9, 0, 0)),
            Some(PackageVersion::new(3, 0, 5, 9)),
            Some(PackageVersion::new(3, 0, 6, 0)),
            Some(PackageVersion::new(10, 0, 0, 0)),
        ];
        for channel in channels {
            for ceiling in ceilings {
                if let Some(info) = select_best(packages(), channel, ceiling) {
                    assert!(channel.admits(info.channel), "{channel} got {}", info.channel);
                    if let Some(max) = ceiling {
                        assert!(info.version <= max, "{} > {max}", info.version);
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_catalog() {
        assert!(select_best(Vec::new(), ReleaseChannel::Dev, None).is_none());
    }

    #[tokio::test]
    async fn test_resolve_queries_catalog_by_name() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/retrieveAll")
            .match_query(Matcher::UrlEncoded("name".into(), "MBServer".into()))
            .with_header("content-type", "application/json")
            .with_body(CATALOG)
            .create_async()
            .await;

        let client = Client::new();
        let url = format!("{}/retrieveAll", server.url());
        let resolver = VersionResolver::new(&client, &url);
        let info = resolver
            .resolve(&PackageName::new("MBServer"), ReleaseChannel::Beta, None)
            .await
            .unwrap();

        assert_eq!(info.version, PackageVersion::new(3, 0, 6, 0));
        assert_eq!(info.target_filename, "3060.zip");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_catalog_is_no_version() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = Client::new();
        let url = server.url();
        let resolver = VersionResolver::new(&client, &url);
        assert!(
            resolver
                .resolve(&PackageName::new("MBServer"), ReleaseChannel::Dev, None)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_unknown_classification_does_not_hide_valid_versions() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_body(
                r#"[{"name": "MBServer", "versions": [
                    {"versionStr": "3.0.5.0", "classification": "Release", "sourceUrl": "http://h/3050.zip"},
                    {"versionStr": "3.9.0.0", "classification": "Alpha", "sourceUrl": "http://h/3900.zip"}
                ]}]"#,
            )
            .create_async()
            .await;

        let client = Client::new();
        let url = server.url();
        let info = VersionResolver::new(&client, &url)
            .resolve(&PackageName::new("MBServer"), ReleaseChannel::Dev, None)
            .await
            .unwrap();
        assert_eq!(info.version, PackageVersion::new(3, 0, 5, 0));
    }
}
