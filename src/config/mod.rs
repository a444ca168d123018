//! Updater configuration.
//!
//! The configuration is supplied once, when the [`Updater`](crate::upgrade::Updater)
//! is constructed, and never re-read afterwards. Hosts either build it in code
//! with [`UpdaterConfig::new`] and the `with_*` methods, or load it from a TOML
//! file with [`UpdaterConfig::load_from`].
//!
//! # File Format
//!
//! ```toml
//! owner = "acme"
//! repo = "scoreboard"
//! # token = "ghp_..."            # or set GH_UPDATER_TOKEN
//! app_root = "/opt/scoreboard"
//! preserve_on_update = [".env", ".git", "data"]
//! dependency_install = ["npm", "ci", "--omit=dev"]
//!
//! [trusted_hosts]
//! domains = ["github.com", "githubusercontent.com"]
//! asset_buckets = ["github-production-release-asset"]
//! ```
//!
//! Every field except `owner` and `repo` has a default.

use crate::constants::{
    BACKUPS_DIR, DEFAULT_API_BASE, DEFAULT_MANIFEST_FILE, DEFAULT_RELEASE_PAGE_SIZE,
    DOWNLOAD_RECORD_FILE, DOWNLOADS_DIR, MAX_RELEASE_PAGE_SIZE, ROLLBACK_DIR, STAGING_DIR,
    TOKEN_ENV, UPDATER_DIR,
};
use crate::core::{IoResultExt, Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

fn default_preserve() -> Vec<String> {
    vec![".env".to_string(), ".git".to_string()]
}

fn default_dependency_install() -> Vec<String> {
    ["npm", "ci", "--omit=dev"].iter().map(|s| (*s).to_string()).collect()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

const fn default_page_size() -> u32 {
    DEFAULT_RELEASE_PAGE_SIZE
}

/// Redirect destinations the downloader is allowed to follow.
///
/// A host is trusted when it equals one of `domains`, ends with `.<domain>`,
/// or contains one of `asset_buckets` and ends with `.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustedHosts {
    /// Domains matched exactly or by dot-suffix.
    pub domains: Vec<String>,
    /// Bucket name markers for release assets served from S3.
    pub asset_buckets: Vec<String>,
}

impl Default for TrustedHosts {
    fn default() -> Self {
        Self {
            domains: [
                "github.com",
                "githubusercontent.com",
                "github-releases.githubusercontent.com",
                "objects.githubusercontent.com",
                "codeload.github.com",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            asset_buckets: vec!["github-production-release-asset".to_string()],
        }
    }
}

impl TrustedHosts {
    /// Check whether `host` may be followed as a redirect target.
    ///
    /// Comparison is case-insensitive.
    #[must_use]
    pub fn is_trusted(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }

        let domain_match = self.domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{domain}"))
        });
        if domain_match {
            return true;
        }

        host.ends_with(".amazonaws.com")
            && self
                .asset_buckets
                .iter()
                .any(|bucket| host.contains(&bucket.to_ascii_lowercase()))
    }
}

/// Configuration for one updater instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Repository owner on the registry.
    pub owner: String,

    /// Repository name on the registry. Also the prefix of build asset names.
    pub repo: String,

    /// Optional bearer token for registry requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Root of the live application tree.
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,

    /// Manifest file (relative to `app_root`) carrying the application version.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Top-level entries of `app_root` kept across updates.
    ///
    /// The updater's own working directory is always added, see [`Self::preserve_set`].
    #[serde(default = "default_preserve")]
    pub preserve_on_update: Vec<String>,

    /// Program and arguments run in `app_root` after the new build is in place.
    ///
    /// An empty list skips the step.
    #[serde(default = "default_dependency_install")]
    pub dependency_install: Vec<String>,

    /// Registry API root.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Number of historical releases fetched when the latest one is unreachable.
    #[serde(default = "default_page_size")]
    pub release_page_size: u32,

    /// Redirect allow-list for artifact downloads.
    #[serde(default)]
    pub trusted_hosts: TrustedHosts,
}

impl UpdaterConfig {
    /// Create a configuration with defaults for everything but the repository.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            token: None,
            app_root: default_app_root(),
            manifest_file: default_manifest_file(),
            preserve_on_update: default_preserve(),
            dependency_install: default_dependency_install(),
            api_base: default_api_base(),
            release_page_size: default_page_size(),
            trusted_hosts: TrustedHosts::default(),
        }
    }

    /// Load a configuration from a TOML file.
    ///
    /// `GH_UPDATER_TOKEN`, when set and non-empty, replaces the file's token.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).fs_context("read config", path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| UpdaterError::parse(format!("config {}", path.display()), e))?;

        if let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            debug!("Using registry token from {TOKEN_ENV}");
            config.token = Some(token);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.app_root = root.into();
        self
    }

    #[must_use]
    pub fn with_manifest_file(mut self, manifest: impl Into<String>) -> Self {
        self.manifest_file = manifest.into();
        self
    }

    #[must_use]
    pub fn with_preserve<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserve_on_update = paths.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_dependency_install<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependency_install = command.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    #[must_use]
    pub const fn with_release_page_size(mut self, size: u32) -> Self {
        self.release_page_size = size;
        self
    }

    #[must_use]
    pub fn with_trusted_hosts(mut self, hosts: TrustedHosts) -> Self {
        self.trusted_hosts = hosts;
        self
    }

    /// Reject configurations no updater could work with.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            return Err(UpdaterError::config("`owner` and `repo` are required"));
        }
        if self.owner.contains('/') || self.repo.contains('/') {
            return Err(UpdaterError::config("`owner` and `repo` must not contain '/'"));
        }
        if self.manifest_file.trim().is_empty() {
            return Err(UpdaterError::config("`manifest_file` must not be empty"));
        }
        if !(1..=MAX_RELEASE_PAGE_SIZE).contains(&self.release_page_size) {
            return Err(UpdaterError::config(format!(
                "`release_page_size` must be between 1 and {MAX_RELEASE_PAGE_SIZE}, got {}",
                self.release_page_size
            )));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(UpdaterError::config(format!(
                "`api_base` must be an http(s) URL, got {}",
                self.api_base
            )));
        }
        for entry in &self.preserve_on_update {
            let mut components = Path::new(entry).components();
            let single_name = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            );
            if !single_name {
                return Err(UpdaterError::config(format!(
                    "preserve entry `{entry}` must name a single top-level entry of the application root"
                )));
            }
        }
        Ok(())
    }

    /// Configured preserve list plus the updater's own working directory.
    #[must_use]
    pub fn preserve_set(&self) -> Vec<String> {
        let mut set = self.preserve_on_update.clone();
        if !set.iter().any(|p| p == UPDATER_DIR) {
            set.push(UPDATER_DIR.to_string());
        }
        set
    }

    #[must_use]
    pub fn updater_dir(&self) -> PathBuf {
        self.app_root.join(UPDATER_DIR)
    }

    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.updater_dir().join(DOWNLOADS_DIR)
    }

    #[must_use]
    pub fn download_record_path(&self) -> PathBuf {
        self.downloads_dir().join(DOWNLOAD_RECORD_FILE)
    }

    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.downloads_dir().join(STAGING_DIR)
    }

    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.updater_dir().join(BACKUPS_DIR)
    }

    #[must_use]
    pub fn rollback_dir(&self) -> PathBuf {
        self.updater_dir().join(ROLLBACK_DIR)
    }

    /// Deterministic build asset name for `version`.
    #[must_use]
    pub fn asset_name(&self, version: &str) -> String {
        format!("{}-build-{}.zip", self.repo, version)
    }
}
