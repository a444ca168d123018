//! Upgrade path resolution.
//!
//! Publishers can fence a release off with `minimumVersionRequired` (see
//! [`crate::registry::metadata`]) to force installations through an
//! intermediate release, e.g. one that runs a data migration. The resolver
//! picks the single best next hop:
//!
//! 1. If the latest release has no minimum, or the current version satisfies
//!    it, the target is the latest release.
//! 2. Otherwise a page of recent releases is fetched and sorted newest first;
//!    the first one newer than the current version whose own minimum is
//!    satisfied becomes the target.
//! 3. If no release qualifies there is no target, and the notes explain which
//!    minimum version blocks the upgrade.

use crate::core::Result;
use crate::registry::{ParsedRelease, ReleaseRecord, ReleaseSource, parse_release_body};
use crate::version::{compare_versions, satisfies_minimum};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Outcome of resolving the next upgrade hop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePathResult {
    /// Version of the registry's latest release.
    pub latest_version: String,
    /// Version to install next, if any release is reachable.
    pub target_version: Option<String>,
    pub update_available: bool,
    /// Whether the target is the latest release.
    pub is_latest_compatible: bool,
    pub release_name: Option<String>,
    pub release_notes: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Web page of the selected release (or of the latest one when none is reachable).
    pub download_url: Option<String>,
    /// Minimum version declared by the selected release.
    pub minimum_version_required: Option<String>,
    /// Minimum version declared by the latest release, when it blocked the direct upgrade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_minimum_version_required: Option<String>,
    /// The release to download, `None` when no upgrade is possible.
    #[serde(skip)]
    pub selected_release: Option<ReleaseRecord>,
}

/// Resolve the best reachable upgrade from `current_version`.
///
/// Registry failures are returned as-is. Identical inputs always produce the
/// same target.
pub async fn resolve_upgrade_path<S: ReleaseSource>(
    source: &S,
    current_version: &str,
    page_size: u32,
) -> Result<UpgradePathResult> {
    let latest = source.latest().await?;
    let latest_version = latest.version().to_string();
    let latest_parsed = parse_release_body(latest.body_raw.as_deref());
    let latest_min = latest_parsed.minimum_version().map(str::to_string);

    let direct = latest_min
        .as_deref()
        .is_none_or(|min| satisfies_minimum(current_version, min));

    if direct {
        let update_available = compare_versions(&latest_version, current_version) == Ordering::Greater;
        debug!(current = current_version, latest = %latest_version, update_available, "Latest release is reachable");
        return Ok(UpgradePathResult {
            target_version: Some(latest_version.clone()),
            latest_version,
            update_available,
            is_latest_compatible: true,
            release_name: Some(latest.display_name().to_string()),
            release_notes: latest_parsed.release_notes,
            published_at: latest.published_at,
            download_url: latest.html_url.clone(),
            minimum_version_required: latest_min,
            latest_minimum_version_required: None,
            selected_release: Some(latest),
        });
    }

    info!(
        current = current_version,
        latest = %latest_version,
        minimum = latest_min.as_deref().unwrap_or_default(),
        "Latest release requires a newer installed version, looking for an intermediate release"
    );

    let mut candidates: Vec<(ReleaseRecord, ParsedRelease)> = source
        .releases(page_size)
        .await?
        .into_iter()
        .map(|release| {
            let parsed = parse_release_body(release.body_raw.as_deref());
            (release, parsed)
        })
        .collect();
    candidates.sort_by(|(a, _), (b, _)| compare_versions(b.version(), a.version()));

    let intermediate = candidates.into_iter().find(|(release, parsed)| {
        compare_versions(release.version(), current_version) == Ordering::Greater
            && parsed
                .minimum_version()
                .is_none_or(|min| satisfies_minimum(current_version, min))
    });

    match intermediate {
        Some((release, parsed)) => {
            info!(target = release.version(), "Selected intermediate release");
            Ok(UpgradePathResult {
                latest_version,
                target_version: Some(release.version().to_string()),
                update_available: true,
                is_latest_compatible: false,
                release_name: Some(release.display_name().to_string()),
                minimum_version_required: parsed.minimum_version().map(str::to_string),
                release_notes: parsed.release_notes,
                published_at: release.published_at,
                download_url: release.html_url.clone(),
                latest_minimum_version_required: latest_min,
                selected_release: Some(release),
            })
        }
        None => {
            let minimum = latest_min.as_deref().unwrap_or("unknown");
            Ok(UpgradePathResult {
                latest_version,
                target_version: None,
                update_available: false,
                is_latest_compatible: false,
                release_name: Some(latest.display_name().to_string()),
                release_notes: format!(
                    "Cannot upgrade from version {current_version}. Minimum version required for latest release: {minimum}"
                ),
                published_at: latest.published_at,
                download_url: latest.html_url.clone(),
                minimum_version_required: latest_min.clone(),
                latest_minimum_version_required: latest_min,
                selected_release: None,
            })
        }
    }
}
