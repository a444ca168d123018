//! Release registry access.
//!
//! The updater needs two questions answered by the registry: "what is the
//! latest release?" and "what were the recent releases?". [`RegistryClient`]
//! answers both over the GitHub releases REST API; [`ReleaseSource`] abstracts
//! them so the upgrade path resolver can be driven by any source.
//!
//! # Failure mapping
//!
//! | HTTP status | Error |
//! |---|---|
//! | 401 | [`UpdaterError::AuthenticationFailed`] |
//! | 403, 429 | [`UpdaterError::RateLimited`] |
//! | 404 | [`UpdaterError::NoReleasesFound`] |
//! | other non-2xx | [`UpdaterError::Registry`] |
//!
//! Transport failures map to [`UpdaterError::Network`] or
//! [`UpdaterError::Timeout`], undecodable bodies to [`UpdaterError::Parse`].
//! Nothing is retried here.

pub mod metadata;
pub mod models;

pub use metadata::{ParsedRelease, ReleaseMetadata, parse_release_body};
pub use models::{ReleaseAsset, ReleaseRecord};

use crate::config::UpdaterConfig;
use crate::constants::{METADATA_TIMEOUT, USER_AGENT};
use crate::core::{Result, UpdaterError};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Where releases come from.
pub trait ReleaseSource {
    /// The release the registry marks as latest.
    fn latest(&self) -> impl Future<Output = Result<ReleaseRecord>> + Send;

    /// Up to `page_size` most recent releases, in registry order.
    fn releases(&self, page_size: u32) -> impl Future<Output = Result<Vec<ReleaseRecord>>> + Send;
}

/// Map a registry status other than `200 OK` to its error.
#[must_use]
pub fn map_status(status: u16) -> UpdaterError {
    match status {
        401 => UpdaterError::AuthenticationFailed,
        403 | 429 => UpdaterError::RateLimited { status },
        404 => UpdaterError::NoReleasesFound,
        status => UpdaterError::Registry { status },
    }
}

/// Map a transport error, reporting timeouts against `timeout`.
pub(crate) fn map_transport(error: &reqwest::Error, timeout: Duration) -> UpdaterError {
    if error.is_timeout() {
        UpdaterError::Timeout {
            seconds: timeout.as_secs(),
        }
    } else {
        UpdaterError::Network {
            message: error.to_string(),
        }
    }
}

/// HTTP client for the registry's releases API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl RegistryClient {
    /// Build a client for the repository named in `config`.
    pub fn new(config: &UpdaterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdaterError::Network {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: config.token.clone(),
        })
    }

    fn releases_url(&self, suffix: &str) -> String {
        format!("{}/repos/{}/{}/releases{suffix}", self.api_base, self.owner, self.repo)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {url}");
        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(METADATA_TIMEOUT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport(&e, METADATA_TIMEOUT))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            debug!(status = status.as_u16(), "Registry request failed");
            return Err(map_status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport(&e, METADATA_TIMEOUT))?;
        serde_json::from_slice(&body).map_err(|e| UpdaterError::parse("registry response", e))
    }

    /// Fetch the latest release.
    pub async fn fetch_latest(&self) -> Result<ReleaseRecord> {
        self.get_json(&self.releases_url("/latest")).await
    }

    /// Fetch one page of the most recent releases.
    pub async fn fetch_releases(&self, page_size: u32) -> Result<Vec<ReleaseRecord>> {
        self.get_json(&self.releases_url(&format!("?per_page={page_size}")))
            .await
    }
}

impl ReleaseSource for RegistryClient {
    async fn latest(&self) -> Result<ReleaseRecord> {
        self.fetch_latest().await
    }

    async fn releases(&self, page_size: u32) -> Result<Vec<ReleaseRecord>> {
        self.fetch_releases(page_size).await
    }
}
