//! Global constants used throughout the updater.
//!
//! Timeouts, registry paging limits and the names of everything the updater
//! writes to disk live here so the on-disk layout is discoverable in one place.

use std::time::Duration;

/// Timeout for registry metadata requests (latest release, release list).
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait for the response headers of the initial artifact request.
pub const ARTIFACT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait for the redirected artifact response, and for each body chunk.
///
/// A slow but steady transfer never trips it.
pub const ARTIFACT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of historical releases fetched when resolving an upgrade path.
pub const DEFAULT_RELEASE_PAGE_SIZE: u32 = 30;

/// Upper bound for the historical release page.
pub const MAX_RELEASE_PAGE_SIZE: u32 = 30;

/// User agent sent with every registry request.
pub const USER_AGENT: &str = concat!("gh-updater/", env!("CARGO_PKG_VERSION"));

/// Default registry API root.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Working directory of the updater, relative to the application root.
///
/// Always part of the preserve set so repeated updates never nest it.
pub const UPDATER_DIR: &str = ".gh-updater";

/// Subdirectory holding the downloaded artifact and its record.
pub const DOWNLOADS_DIR: &str = "downloads";

/// Subdirectory holding per-install backups of preserved paths.
pub const BACKUPS_DIR: &str = "backups";

/// Subdirectory holding rollback archives.
pub const ROLLBACK_DIR: &str = "rollback";

/// Staging directory (inside the downloads directory) for extracted builds.
pub const STAGING_DIR: &str = "extracted";

/// File name of the persisted download record.
pub const DOWNLOAD_RECORD_FILE: &str = "update-info.json";

/// Default manifest file carrying the application version.
pub const DEFAULT_MANIFEST_FILE: &str = "package.json";

/// Default configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gh-updater.toml";

/// Environment variable overriding the configured registry token.
pub const TOKEN_ENV: &str = "GH_UPDATER_TOKEN";

/// Marker of the embedded metadata block inside release notes.
pub const METADATA_MARKER: &str = "UPGRADE_METADATA";
