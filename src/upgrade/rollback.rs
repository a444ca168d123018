//! Rollback archive store.
//!
//! Each install snapshots the live tree into `rollback-v<version>.zip` before
//! deleting anything. Archives are ordered by the version in their name, so
//! the newest snapshot is the one an explicit rollback restores.

use crate::core::{IoResultExt, Result};
use crate::utils::{list_entries, remove_path};
use crate::version::compare_versions;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rollback-v(.+)\.zip$").expect("archive name pattern is valid"));

/// What an explicit rollback would restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackInfo {
    pub available: bool,
    pub version: String,
    pub path: PathBuf,
    pub size: u64,
    /// Modification time of the archive.
    pub created_at: DateTime<Utc>,
}

/// Version embedded in a rollback archive name, or `"unknown"`.
#[must_use]
pub fn archive_version(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|name| ARCHIVE_NAME.captures(name))
        .and_then(|c| c.get(1))
        .map_or_else(|| "unknown".to_string(), |m| m.as_str().to_string())
}

#[derive(Debug, Clone)]
pub struct RollbackStore {
    dir: PathBuf,
}

impl RollbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Archive path for a snapshot of `version`.
    #[must_use]
    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("rollback-v{version}.zip"))
    }

    /// All rollback archives, newest first.
    pub fn archives(&self) -> Result<Vec<PathBuf>> {
        let mut archives: Vec<PathBuf> = list_entries(&self.dir)?
            .into_iter()
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| ARCHIVE_NAME.is_match(n))
            })
            .collect();
        archives.sort_by(|a, b| {
            compare_versions(&archive_version(b), &archive_version(a)).then_with(|| b.cmp(a))
        });
        Ok(archives)
    }

    /// The newest rollback archive.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.archives()?.into_iter().next())
    }

    /// Describe the newest archive, `None` when there is nothing to roll back to.
    pub fn info(&self) -> Result<Option<RollbackInfo>> {
        let Some(path) = self.latest()? else {
            return Ok(None);
        };
        let metadata = std::fs::metadata(&path).fs_context("stat", &path)?;
        let modified = metadata.modified().fs_context("read modification time of", &path)?;

        Ok(Some(RollbackInfo {
            available: true,
            version: archive_version(&path),
            size: metadata.len(),
            created_at: DateTime::<Utc>::from(modified),
            path,
        }))
    }

    /// Remove an archive after it has been restored.
    pub fn consume(&self, archive: &Path) -> Result<()> {
        remove_path(archive)
    }
}
