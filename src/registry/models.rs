//! Release records as returned by the registry API.

use crate::version::normalize_tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Tag name (e.g. `"v1.2.0"`).
    pub tag_name: String,

    /// Human-readable release title.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    /// Raw release notes, possibly carrying an embedded metadata block.
    #[serde(rename = "body", default)]
    pub body_raw: Option<String>,

    /// Release page on the registry's web UI.
    #[serde(default)]
    pub html_url: Option<String>,

    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name (e.g. `"scoreboard-build-1.2.0.zip"`).
    pub name: String,
    /// Download URL.
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl ReleaseRecord {
    /// Version string derived from the tag, without a leading `v`.
    #[must_use]
    pub fn version(&self) -> &str {
        normalize_tag(&self.tag_name)
    }

    /// Release title, falling back to the tag name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.tag_name)
    }

    /// Find an asset by exact file name.
    #[must_use]
    pub fn find_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}
