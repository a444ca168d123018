//! Error handling for the updater
//!
//! Two layers, mirroring how the rest of the crate is consumed:
//! 1. [`UpdaterError`] - the typed taxonomy every public operation returns, so
//!    embedding hosts can match on failure modes (retry on [`UpdaterError::Busy`],
//!    stop on [`UpdaterError::UntrustedRedirect`], ...).
//! 2. [`ErrorContext`] - a rendering wrapper used by the binary that adds an
//!    actionable suggestion to whatever error reached the top level.
//!
//! # Compound install failures
//!
//! An install that fails after the rollback archive exists is always followed
//! by an automatic rollback. Its outcome is folded into the returned error:
//! [`UpdaterError::RolledBack`] when the previous release was restored and
//! [`UpdaterError::RollbackFailed`] when it was not. The latter means the
//! application tree may be in neither the old nor the new state.

use crate::upgrade::state::Operation;
use colored::Colorize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Convenient alias used across the library.
pub type Result<T, E = UpdaterError> = std::result::Result<T, E>;

/// The error type returned by every updater operation.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// Construction arguments or configuration file are invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration.
        message: String,
    },

    /// A second updater was initialised in the same process.
    #[error("Updater instance already exists. Only one updater is allowed per application")]
    AlreadyExists,

    /// The registry rejected the configured token (HTTP 401).
    #[error("Authentication failed: invalid registry token")]
    AuthenticationFailed,

    /// The registry refused the request (HTTP 403 or 429).
    #[error("Registry rate limit exceeded or access forbidden (HTTP {status})")]
    RateLimited {
        /// Status code returned by the registry.
        status: u16,
    },

    /// The repository has no releases (HTTP 404).
    #[error("No releases found for this repository")]
    NoReleasesFound,

    /// Any other non-success registry status.
    #[error("Registry returned status {status}")]
    Registry {
        /// Status code returned by the registry.
        status: u16,
    },

    /// Transport-level failure talking to the registry or the asset host.
    #[error("Network error: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },

    /// A request exceeded its time budget.
    #[error("Request timed out after {seconds} seconds")]
    Timeout {
        /// The budget that was exceeded.
        seconds: u64,
    },

    /// Malformed JSON from the registry or in a manifest/record.
    #[error("Failed to parse {what}: {reason}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Parser error message.
        reason: String,
    },

    /// The application manifest does not exist.
    #[error("Manifest not found: {path}")]
    ManifestNotFound {
        /// Expected manifest location.
        path: String,
    },

    /// The selected release carries no build artifact for the target version.
    #[error("Build asset not found for version {version}. Expected: {expected}")]
    AssetNotFound {
        /// Target version.
        version: String,
        /// Asset name that was looked up.
        expected: String,
    },

    /// A redirect pointed outside the trusted host allow-list.
    #[error("Redirect to untrusted domain blocked for security: {host}")]
    UntrustedRedirect {
        /// Host name the redirect pointed to.
        host: String,
    },

    /// A redirect response carried no usable location.
    #[error("Invalid redirect: {reason}")]
    InvalidRedirect {
        /// Why the location could not be used.
        reason: String,
    },

    /// The artifact host answered with an unusable response.
    #[error("Download failed: {reason}")]
    DownloadFailed {
        /// Failure description.
        reason: String,
    },

    /// `install` was called without a complete download on disk.
    #[error("No update downloaded")]
    NothingDownloaded,

    /// The artifact on disk no longer matches its download record.
    #[error("Downloaded artifact {file} does not match its recorded checksum")]
    ChecksumMismatch {
        /// Artifact file name.
        file: String,
        /// Digest recorded at download time.
        expected: String,
        /// Digest computed before install.
        actual: String,
    },

    /// The staged build refuses to install over the running version.
    #[error(
        "Cannot install version {version}: requires minimum version {minimum}, but current version is {current}. Please upgrade to an intermediate version first"
    )]
    IncompatibleInstall {
        /// Version being installed.
        version: String,
        /// Minimum version declared by the staged build.
        minimum: String,
        /// Currently installed version.
        current: String,
    },

    /// The host's dependency-install command exited unsuccessfully.
    #[error("Dependency install command `{command}` failed with {status}")]
    DependencyInstallFailed {
        /// Rendered command line.
        command: String,
        /// Exit status description.
        status: String,
    },

    /// There is no rollback archive to restore.
    #[error("No rollback archive found")]
    NoRollbackAvailable,

    /// The install failed and the previous release was restored.
    #[error("Update failed: {cause}. Successfully rolled back to v{version}")]
    RolledBack {
        /// The failure that triggered the rollback.
        cause: Box<UpdaterError>,
        /// Version restored by the rollback.
        version: String,
    },

    /// The install failed and restoring the previous release failed too.
    #[error("Update failed: {cause} AND rollback failed: {rollback}")]
    RollbackFailed {
        /// The failure that triggered the rollback.
        cause: Box<UpdaterError>,
        /// Why the rollback itself failed.
        rollback: Box<UpdaterError>,
    },

    /// Another operation holds the state machine.
    #[error("Cannot {requested}: {current} operation is in progress")]
    Busy {
        /// The operation that was refused.
        requested: &'static str,
        /// The operation currently running.
        current: Operation,
    },

    /// A filesystem operation failed.
    #[error("Failed to {operation} {path}: {source}")]
    FileSystem {
        /// What was being attempted.
        operation: String,
        /// Path involved.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing a zip archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A blocking worker panicked or was cancelled.
    #[error("Background task failed: {message}")]
    Task {
        /// Join error description.
        message: String,
    },
}

impl UpdaterError {
    /// Build a [`UpdaterError::FileSystem`] for `path`.
    pub fn fs(operation: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        Self::FileSystem {
            operation: operation.into(),
            path: path.display().to_string(),
            source,
        }
    }

    /// Build a [`UpdaterError::Parse`].
    pub fn parse(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`UpdaterError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the caller may simply try again later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. } | Self::RateLimited { .. } | Self::Network { .. } | Self::Timeout { .. }
        )
    }
}

/// Extension for attaching filesystem context to `std::io::Result`.
pub trait IoResultExt<T> {
    /// Map an I/O error into [`UpdaterError::FileSystem`].
    fn fs_context(self, operation: &str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn fs_context(self, operation: &str, path: &Path) -> Result<T> {
        self.map_err(|source| UpdaterError::fs(operation, path, source))
    }
}

/// An error paired with a suggestion for the operator.
///
/// Used by the binary to render failures on stderr.
#[derive(Debug)]
pub struct ErrorContext {
    /// The rendered error message.
    pub message: String,
    /// What the operator could do about it.
    pub suggestion: Option<String>,
    /// Additional background.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap a message with no suggestion.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colours.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any top-level error into an [`ErrorContext`] with a suggestion.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    match error.downcast_ref::<UpdaterError>() {
        Some(updater_error) => create_error_context(updater_error),
        None => ErrorContext::new(format!("{error:#}")),
    }
}

fn create_error_context(error: &UpdaterError) -> ErrorContext {
    let context = ErrorContext::new(error.to_string());
    match error {
        UpdaterError::Configuration { .. } => context
            .with_suggestion("Check gh-updater.toml: `owner` and `repo` are required")
            .with_details("Pass --config to point at a different configuration file"),
        UpdaterError::AuthenticationFailed => context
            .with_suggestion("Check the configured token or set GH_UPDATER_TOKEN to a valid one"),
        UpdaterError::RateLimited { .. } => context
            .with_suggestion("Wait a few minutes and retry, or configure a token for a higher rate limit"),
        UpdaterError::NoReleasesFound => {
            context.with_suggestion("Check that `owner`/`repo` point at a repository with published releases")
        }
        UpdaterError::Network { .. } | UpdaterError::Timeout { .. } => {
            context.with_suggestion("Check network connectivity and retry")
        }
        UpdaterError::Busy { .. } => context
            .with_suggestion("Poll `gh-updater state` and retry once the updater is idle"),
        UpdaterError::IncompatibleInstall { .. } => context
            .with_suggestion("Run `gh-updater clear-downloads`, then `check` to find an intermediate version"),
        UpdaterError::UntrustedRedirect { .. } => context
            .with_suggestion("The download was aborted; add the host to trusted_hosts only if you trust it")
            .with_details("Redirects are only followed to hosts on the configured allow-list"),
        UpdaterError::NothingDownloaded => {
            context.with_suggestion("Run `gh-updater download` first")
        }
        UpdaterError::ChecksumMismatch { expected, actual, .. } => context
            .with_suggestion("Run `gh-updater clear-downloads` and download again")
            .with_details(format!("expected sha256 {expected}, found {actual}")),
        UpdaterError::NoRollbackAvailable => {
            context.with_details("Rollback archives are created by a successful `install`")
        }
        UpdaterError::RollbackFailed { .. } => context
            .with_suggestion("Inspect the application directory; restore manually from .gh-updater/rollback if needed")
            .with_details("The application may be in neither the old nor the new state"),
        UpdaterError::FileSystem { source, .. }
            if source.kind() == std::io::ErrorKind::PermissionDenied =>
        {
            context.with_suggestion("Check file ownership of the application directory")
        }
        _ => context,
    }
}
