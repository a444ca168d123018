//! Release metadata embedded in release notes.
//!
//! Publishers attach machine-readable upgrade constraints to a release by
//! putting an HTML comment anywhere in its notes:
//!
//! ```text
//! <!-- UPGRADE_METADATA
//! { "minimumVersionRequired": "1.5.0" }
//! -->
//! ```
//!
//! The block is invisible on the registry's web UI. [`parse_release_body`]
//! extracts it and returns the remaining notes for display.

use crate::constants::METADATA_MARKER;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::warn;

static METADATA_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)<!--\s*{METADATA_MARKER}\s+(.*?)\s*-->"))
        .expect("metadata block pattern is valid")
});

/// Machine-readable constraints of a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseMetadata {
    /// Lowest installed version allowed to upgrade straight to this release.
    #[serde(default)]
    pub minimum_version_required: Option<String>,
}

/// Release notes split into display text and metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRelease {
    /// Notes with the metadata block removed, trimmed.
    pub release_notes: String,
    /// Parsed metadata, `None` when absent or malformed.
    pub metadata: Option<ReleaseMetadata>,
}

impl ParsedRelease {
    /// The declared minimum version, if any.
    #[must_use]
    pub fn minimum_version(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.minimum_version_required.as_deref())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Split raw release notes into display notes and embedded metadata.
///
/// A block with invalid JSON is logged and treated as absent; it is still
/// removed from the notes.
#[must_use]
pub fn parse_release_body(body: Option<&str>) -> ParsedRelease {
    let body = body.unwrap_or_default();

    let Some(captures) = METADATA_BLOCK.captures(body) else {
        return ParsedRelease {
            release_notes: body.trim().to_string(),
            metadata: None,
        };
    };

    let json = captures.get(1).map_or("", |m| m.as_str());
    let metadata = match serde_json::from_str::<ReleaseMetadata>(json) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!("Failed to parse release metadata block: {e}");
            None
        }
    };

    ParsedRelease {
        release_notes: METADATA_BLOCK.replace(body, "").trim().to_string(),
        metadata,
    }
}
