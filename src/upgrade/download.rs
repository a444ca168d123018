//! Build artifact download.
//!
//! The artifact for version `V` is the release asset named
//! `<repo>-build-<V>.zip`. Downloads follow at most one redirect, and only to a
//! host on the [`TrustedHosts`] allow-list: the redirect target is validated
//! before any byte is written.
//!
//! A [`DownloadRecord`] is written next to the artifact *before* the transfer
//! starts, with `complete = false`, and rewritten with the size and SHA-256
//! digest once the stream has finished. A record that is missing, unreadable
//! or incomplete means "nothing usable is downloaded".

use crate::config::{TrustedHosts, UpdaterConfig};
use crate::constants::{ARTIFACT_DOWNLOAD_TIMEOUT, ARTIFACT_REQUEST_TIMEOUT, USER_AGENT};
use crate::core::{IoResultExt, Result, UpdaterError};
use crate::registry::{ReleaseRecord, map_transport};
use crate::utils::{ensure_dir, read_json_file, remove_path, write_json_file};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderValue, LOCATION};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Provenance of the artifact in the downloads directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub version: String,
    pub tag_name: String,
    /// Artifact file name inside the downloads directory.
    pub file_name: String,
    pub downloaded_at: DateTime<Utc>,
    /// Set once the whole payload is on disk.
    #[serde(default)]
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Hex SHA-256 of the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Read the download record, if a complete download is on disk.
///
/// Unreadable records, incomplete records and records whose artifact is
/// missing all yield `None`.
#[must_use]
pub fn read_download_record(config: &UpdaterConfig) -> Option<DownloadRecord> {
    let path = config.download_record_path();
    if !path.exists() {
        return None;
    }

    let record: DownloadRecord = match read_json_file(&path) {
        Ok(record) => record,
        Err(e) => {
            warn!("Ignoring unreadable download record: {e}");
            return None;
        }
    };

    if !record.complete {
        debug!(version = %record.version, "Ignoring incomplete download");
        return None;
    }
    if !config.downloads_dir().join(&record.file_name).is_file() {
        warn!(file = %record.file_name, "Download record points at a missing artifact");
        return None;
    }
    Some(record)
}

/// Validate a redirect response's `Location` against the allow-list.
///
/// Relative locations resolve against `base`.
pub fn validate_redirect(
    base: &Url,
    location: Option<&HeaderValue>,
    trusted: &TrustedHosts,
) -> Result<Url> {
    let location = location
        .ok_or_else(|| UpdaterError::InvalidRedirect {
            reason: "redirect without a location".to_string(),
        })?
        .to_str()
        .map_err(|e| UpdaterError::InvalidRedirect {
            reason: e.to_string(),
        })?;

    let url = base.join(location).map_err(|e| UpdaterError::InvalidRedirect {
        reason: format!("{location}: {e}"),
    })?;

    let host = url
        .host_str()
        .ok_or_else(|| UpdaterError::InvalidRedirect {
            reason: format!("{location}: no host"),
        })?
        .to_ascii_lowercase();

    if !trusted.is_trusted(&host) {
        warn!(host = %host, "Blocked redirect to untrusted host");
        return Err(UpdaterError::UntrustedRedirect { host });
    }

    Ok(url)
}

/// Streams build artifacts into the downloads directory.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
    token: Option<String>,
    trusted_hosts: TrustedHosts,
    downloads_dir: PathBuf,
    record_path: PathBuf,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl Downloader {
    pub fn new(config: &UpdaterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(ARTIFACT_REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| UpdaterError::Network {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            token: config.token.clone(),
            trusted_hosts: config.trusted_hosts.clone(),
            downloads_dir: config.downloads_dir(),
            record_path: config.download_record_path(),
            request_timeout: ARTIFACT_REQUEST_TIMEOUT,
            idle_timeout: ARTIFACT_DOWNLOAD_TIMEOUT,
        })
    }

    /// Override how long to wait for response headers (`request`) and for the
    /// next body chunk or the redirected response (`idle`).
    #[must_use]
    pub fn with_timeouts(mut self, request: Duration, idle: Duration) -> Self {
        self.request_timeout = request;
        self.idle_timeout = idle;
        self
    }

    /// Download the asset named `asset_name` of `release` as `version`.
    ///
    /// On failure the partial artifact and its record are removed.
    pub async fn download(
        &self,
        release: &ReleaseRecord,
        version: &str,
        asset_name: &str,
    ) -> Result<DownloadRecord> {
        let asset = release
            .find_asset(asset_name)
            .ok_or_else(|| UpdaterError::AssetNotFound {
                version: version.to_string(),
                expected: asset_name.to_string(),
            })?;

        ensure_dir(&self.downloads_dir)?;
        let artifact = self.downloads_dir.join(asset_name);

        let mut record = DownloadRecord {
            version: version.to_string(),
            tag_name: release.tag_name.clone(),
            file_name: asset_name.to_string(),
            downloaded_at: Utc::now(),
            complete: false,
            size: None,
            sha256: None,
        };
        write_json_file(&self.record_path, &record)?;

        info!(version, url = %asset.browser_download_url, "Downloading build artifact");
        match self.fetch(&asset.browser_download_url, &artifact).await {
            Ok((size, digest)) => {
                record.complete = true;
                record.size = Some(size);
                record.sha256 = Some(digest);
                write_json_file(&self.record_path, &record)?;
                info!(version, size, "Download complete");
                Ok(record)
            }
            Err(e) => {
                for path in [&artifact, &self.record_path] {
                    if let Err(cleanup) = remove_path(path) {
                        warn!("Failed to clean up after failed download: {cleanup}");
                    }
                }
                Err(e)
            }
        }
    }

    /// Stream `url` into `dest`, returning its size and SHA-256.
    ///
    /// Timeouts bound waiting, not the transfer: the headers must arrive
    /// within `request_timeout` (`idle_timeout` after a redirect) and each body
    /// chunk within `idle_timeout` of the previous one.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(u64, String)> {
        let mut request = self.http.get(url).header(ACCEPT, "application/octet-stream");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let mut response = send_within(request, self.request_timeout).await?;

        if is_redirect(response.status()) {
            let target = validate_redirect(
                response.url(),
                response.headers().get(LOCATION),
                &self.trusted_hosts,
            )?;
            debug!(host = target.host_str().unwrap_or_default(), "Following redirect");

            // The token is for the registry only; it is not forwarded.
            let request = self.http.get(target).header(ACCEPT, "application/octet-stream");
            response = send_within(request, self.idle_timeout).await?;

            if is_redirect(response.status()) {
                return Err(UpdaterError::DownloadFailed {
                    reason: "more than one redirect".to_string(),
                });
            }
        }

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpdaterError::DownloadFailed {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let mut file = tokio::fs::File::create(dest).await.fs_context("create", dest)?;
        let mut hasher = Sha256::new();
        let mut size = 0u64;

        loop {
            let chunk = tokio::time::timeout(self.idle_timeout, response.chunk())
                .await
                .map_err(|_| timed_out(self.idle_timeout))?
                .map_err(|e| map_transport(&e, self.idle_timeout))?;
            let Some(chunk) = chunk else { break };
            hasher.update(&chunk);
            file.write_all(&chunk).await.fs_context("write", dest)?;
            size += chunk.len() as u64;
        }
        file.flush().await.fs_context("flush", dest)?;
        file.sync_all().await.fs_context("sync", dest)?;

        Ok((size, hex::encode(hasher.finalize())))
    }
}

async fn send_within(request: reqwest::RequestBuilder, timeout: Duration) -> Result<reqwest::Response> {
    tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| timed_out(timeout))?
        .map_err(|e| map_transport(&e, timeout))
}

fn timed_out(timeout: Duration) -> UpdaterError {
    warn!(seconds = timeout.as_secs_f64(), "Artifact download stalled");
    UpdaterError::Timeout {
        seconds: timeout.as_secs(),
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}
