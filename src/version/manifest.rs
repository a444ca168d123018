//! Reading versions out of an application manifest.
//!
//! The manifest is a JSON document with a top-level `version` string. Builds
//! published for the updater may also declare `minimumVersionRequired`, the
//! lowest installed version they agree to replace.

use crate::core::{IoResultExt, Result, UpdaterError};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ManifestVersions {
    version: Option<String>,
    #[serde(rename = "minimumVersionRequired")]
    minimum_version_required: Option<String>,
}

fn load(path: &Path) -> Result<ManifestVersions> {
    if !path.exists() {
        return Err(UpdaterError::ManifestNotFound {
            path: path.display().to_string(),
        });
    }
    let content = std::fs::read_to_string(path).fs_context("read manifest", path)?;
    serde_json::from_str(&content)
        .map_err(|e| UpdaterError::parse(format!("manifest {}", path.display()), e))
}

/// Read the installed application version from `root/manifest_file`.
///
/// The version must be a plain `MAJOR.MINOR.PATCH` triple.
///
/// # Errors
///
/// - [`UpdaterError::ManifestNotFound`] when the file does not exist
/// - [`UpdaterError::Parse`] for invalid JSON, a missing `version`, or a
///   version with pre-release or build metadata
pub fn read_manifest_version(root: &Path, manifest_file: &str) -> Result<String> {
    let path = root.join(manifest_file);
    let manifest = load(&path)?;
    let what = format!("manifest {}", path.display());

    let raw = manifest
        .version
        .ok_or_else(|| UpdaterError::parse(what.as_str(), "missing `version` field"))?;
    let parsed = semver::Version::parse(raw.trim()).map_err(|e| UpdaterError::parse(what.as_str(), e))?;

    if !parsed.pre.is_empty() || !parsed.build.is_empty() {
        return Err(UpdaterError::parse(
            what,
            format!("version `{raw}` must not carry pre-release or build metadata"),
        ));
    }

    debug!(version = %parsed, path = %path.display(), "Read installed version");
    Ok(parsed.to_string())
}

/// Read the optional `minimumVersionRequired` of a staged build's manifest.
///
/// A missing or unreadable manifest yields `None`; unreadable ones are logged.
#[must_use]
pub fn read_minimum_version(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match load(path) {
        Ok(manifest) => manifest.minimum_version_required.filter(|v| !v.trim().is_empty()),
        Err(e) => {
            warn!("Could not check version compatibility: {e}");
            None
        }
    }
}
