use log::{debug, info};
use serde::Deserialize;

use crate::config::UpdaterConfig;
use crate::error::UpdateError;
use crate::retry::{Attempt, RetryError, RetryPolicy};
use crate::version::strip_tag_prefix;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// `sha256:<hex>` when the host publishes one.
    #[serde(default)]
    pub digest: Option<String>,
}

impl ReleaseAsset {
    /// Expected SHA-256 of the asset, if a well-formed digest was published.
    #[must_use]
    pub fn sha256(&self) -> Option<String> {
        parse_sha256_digest(self.digest.as_deref()?)
    }
}

/// Latest-release metadata. Only the tag and the asset list are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub tag: String,
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Deserialize)]
struct RawRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

impl ReleaseInfo {
    /// The tag without its leading `v`.
    #[must_use]
    pub fn version_label(&self) -> &str {
        strip_tag_prefix(&self.tag)
    }

    /// First asset whose name contains `marker`, ignoring case.
    ///
    /// # Errors
    /// Returns [`UpdateError::AssetNotFound`] when nothing matches.
    pub fn select_asset(&self, marker: &str) -> Result<&ReleaseAsset, UpdateError> {
        let marker_lower = marker.to_ascii_lowercase();
        self.assets
            .iter()
            .find(|asset| asset.name.to_ascii_lowercase().contains(&marker_lower))
            .ok_or_else(|| UpdateError::AssetNotFound {
                marker: marker.to_string(),
                tag: self.tag.clone(),
            })
    }

    fn from_json(body: &str) -> Result<Self, UpdateError> {
        let raw: RawRelease = serde_json::from_str(body)
            .map_err(|error| UpdateError::MalformedRelease(error.to_string()))?;
        let tag = raw
            .tag_name
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .ok_or_else(|| {
                UpdateError::MalformedRelease("version tag not found in release".to_string())
            })?;
        Ok(Self {
            tag,
            assets: raw.assets,
        })
    }
}

/// Build the HTTP client shared by metadata fetches and downloads.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(config: &UpdaterConfig) -> Result<reqwest::Client, UpdateError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(format!("seekdesk-updater/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| UpdateError::Http {
            context: "failed to build HTTP client",
            source,
        })
}

/// Fetches latest-release metadata with a bounded retry budget.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl ReleaseClient {
    #[must_use]
    pub fn new(http: reqwest::Client, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            url: url.into(),
            retry,
        }
    }

    /// Fetch the latest release.
    ///
    /// Connection errors, timeouts and non-success statuses are retried until
    /// the budget runs out. A response without a version tag is not retried.
    ///
    /// # Errors
    /// Returns [`UpdateError::Network`] once every attempt failed, or
    /// [`UpdateError::MalformedRelease`] for an unusable response body.
    pub async fn fetch_latest(&self) -> Result<ReleaseInfo, UpdateError> {
        let attempts = self.retry.attempts();
        let result = self
            .retry
            .run("release metadata fetch", |attempt| {
                debug!("[Attempt {attempt}/{attempts}] Fetching release info from {}", self.url);
                self.fetch_once()
            })
            .await;

        match result {
            Ok(release) => {
                info!(
                    "Latest release {} with {} asset(s)",
                    release.tag,
                    release.assets.len()
                );
                Ok(release)
            }
            Err(RetryError::Fatal(error)) => Err(error),
            Err(RetryError::Exhausted { attempts, last }) => {
                Err(UpdateError::Network {
                    attempts,
                    last_error: last.to_string(),
                })
            }
        }
    }

    async fn fetch_once(&self) -> Result<ReleaseInfo, Attempt<UpdateError>> {
        let transient = |context: &'static str| {
            move |source: reqwest::Error| Attempt::Transient(UpdateError::Http { context, source })
        };

        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(transient("release request failed"))?;

        let response = response
            .error_for_status()
            .map_err(transient("release request returned an error status"))?;

        let body = response
            .text()
            .await
            .map_err(transient("failed to read release response"))?;

        ReleaseInfo::from_json(&body).map_err(Attempt::Fatal)
    }
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}
