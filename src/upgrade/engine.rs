//! Install and rollback of the application tree.
//!
//! The engine is synchronous and is run on a blocking worker by the
//! [`Updater`](super::Updater). An install proceeds strictly in this order:
//!
//! ```text
//! verify   artifact checksum matches the download record
//! stage    extract the artifact into a fresh staging directory
//! fence    staged manifest's minimumVersionRequired <= current version
//! backup   copy preserved entries + manifest into backups/backup-v<cur>-<ms>
//! snapshot pack every non-preserved entry into rollback/rollback-v<cur>.zip
//! ---------------------------------------------------------- live tree mutated below
//! delete   remove every non-preserved entry
//! copy     copy every staged entry into the live tree
//! restore  copy preserved entries back (manifest excluded)
//! deps     run the dependency-install command
//! ```
//!
//! A failure before the snapshot exists leaves the live tree untouched and is
//! reported as-is. A failure after it triggers the automatic rollback and is
//! reported as [`UpdaterError::RolledBack`] or [`UpdaterError::RollbackFailed`].

use super::backup::BackupManager;
use super::download::DownloadRecord;
use super::rollback::{RollbackStore, archive_version};
use crate::config::UpdaterConfig;
use crate::constants::UPDATER_DIR;
use crate::core::{Result, UpdaterError};
use crate::utils::{
    calculate_checksum, copy_entry, ensure_dir, extract_archive, list_entries, list_entries_except,
    pack_tree, remove_path,
};
use crate::version::{read_minimum_version, satisfies_minimum};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

/// A completed install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub old_version: String,
    pub new_version: String,
    /// Snapshot of the previous release.
    pub rollback_path: PathBuf,
}

/// A completed explicit rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    /// Version restored.
    pub version: String,
}

/// Replaces and restores the application tree.
#[derive(Debug, Clone)]
pub struct InstallEngine {
    config: UpdaterConfig,
    preserve: Vec<String>,
    rollbacks: RollbackStore,
}

impl InstallEngine {
    pub fn new(config: UpdaterConfig) -> Self {
        let preserve = config.preserve_set();
        let rollbacks = RollbackStore::new(config.rollback_dir());
        Self {
            config,
            preserve,
            rollbacks,
        }
    }

    pub fn rollbacks(&self) -> &RollbackStore {
        &self.rollbacks
    }

    fn app_root(&self) -> &Path {
        &self.config.app_root
    }

    /// Install the downloaded build described by `record` over `current_version`.
    pub fn install(&self, record: &DownloadRecord, current_version: &str) -> Result<InstallReport> {
        let artifact = self.config.downloads_dir().join(&record.file_name);
        if !artifact.is_file() {
            return Err(UpdaterError::NothingDownloaded);
        }
        self.verify_checksum(record, &artifact)?;

        info!(from = current_version, to = %record.version, "Installing update");

        let staging = self.config.staging_dir();
        if let Err(e) = self.stage(&artifact, &staging, &record.version, current_version) {
            discard(&staging, "staging directory");
            return Err(e);
        }

        let backup = BackupManager::new(self.app_root(), &self.config.backups_dir(), current_version);
        if let Err(e) = backup.create_backup(&self.preserve, &self.config.manifest_file) {
            backup.cleanup_backup().ok();
            discard(&staging, "staging directory");
            return Err(e);
        }

        let rollback_path = self.rollbacks.archive_path(current_version);
        if let Err(e) = pack_tree(self.app_root(), &rollback_path, &self.preserve) {
            discard(&rollback_path, "partial rollback archive");
            backup.cleanup_backup().ok();
            discard(&staging, "staging directory");
            return Err(e);
        }
        info!(path = %rollback_path.display(), "Rollback archive created");

        if let Err(cause) = self.replace_tree(&staging, &backup) {
            error!("Update failed, rolling back: {cause}");
            let outcome = self.restore_snapshot(&rollback_path, Some(&backup));
            discard(&staging, "staging directory");

            return Err(match outcome {
                Ok(()) => {
                    backup.cleanup_backup().ok();
                    info!(version = current_version, "Rolled back after failed update");
                    UpdaterError::RolledBack {
                        cause: Box::new(cause),
                        version: current_version.to_string(),
                    }
                }
                Err(rollback) => {
                    error!("Rollback failed: {rollback}");
                    UpdaterError::RollbackFailed {
                        cause: Box::new(cause),
                        rollback: Box::new(rollback),
                    }
                }
            });
        }

        discard(&staging, "staging directory");
        discard(&artifact, "downloaded artifact");
        discard(&self.config.download_record_path(), "download record");
        backup.cleanup_backup().ok();

        info!(version = %record.version, "Update installed");
        Ok(InstallReport {
            old_version: current_version.to_string(),
            new_version: record.version.clone(),
            rollback_path,
        })
    }

    /// Restore the newest rollback archive and remove it.
    pub fn rollback(&self) -> Result<RollbackReport> {
        let archive = self.rollbacks.latest()?.ok_or(UpdaterError::NoRollbackAvailable)?;
        let version = archive_version(&archive);

        info!(version = %version, archive = %archive.display(), "Rolling back");
        self.restore_snapshot(&archive, None)?;

        if let Err(e) = self.rollbacks.consume(&archive) {
            warn!("Rolled back, but failed to remove the archive: {e}");
        }
        info!(version = %version, "Rollback complete");
        Ok(RollbackReport { version })
    }

    fn verify_checksum(&self, record: &DownloadRecord, artifact: &Path) -> Result<()> {
        let Some(expected) = &record.sha256 else {
            return Ok(());
        };
        let actual = calculate_checksum(artifact)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(UpdaterError::ChecksumMismatch {
                file: record.file_name.clone(),
                expected: expected.clone(),
                actual,
            });
        }
        debug!("Artifact checksum verified");
        Ok(())
    }

    fn stage(&self, artifact: &Path, staging: &Path, version: &str, current: &str) -> Result<()> {
        remove_path(staging)?;
        ensure_dir(staging)?;
        extract_archive(artifact, staging)?;

        let Some(minimum) = read_minimum_version(&staging.join(&self.config.manifest_file)) else {
            return Ok(());
        };
        if !satisfies_minimum(current, &minimum) {
            warn!(version, minimum = %minimum, current, "Staged build refuses the installed version");
            return Err(UpdaterError::IncompatibleInstall {
                version: version.to_string(),
                minimum,
                current: current.to_string(),
            });
        }
        Ok(())
    }

    fn replace_tree(&self, staging: &Path, backup: &BackupManager) -> Result<()> {
        for entry in list_entries_except(self.app_root(), &self.preserve)? {
            remove_path(&entry)?;
        }
        debug!("Removed previous release");

        for entry in list_entries(staging)? {
            let Some(name) = entry.file_name() else { continue };
            if name == std::ffi::OsStr::new(UPDATER_DIR) {
                continue;
            }
            copy_entry(&entry, &self.app_root().join(name))?;
        }
        debug!("Copied new release into place");

        backup.restore_backup(&[self.config.manifest_file.as_str()])?;
        self.install_dependencies()
    }

    /// Put the tree recorded in `archive` back in place.
    ///
    /// Per-entry deletion failures and a failing dependency install are logged;
    /// extraction and backup restore failures are not tolerated.
    fn restore_snapshot(&self, archive: &Path, backup: Option<&BackupManager>) -> Result<()> {
        if !archive.is_file() {
            return Err(UpdaterError::NoRollbackAvailable);
        }

        for entry in list_entries_except(self.app_root(), &self.preserve)? {
            if let Err(e) = remove_path(&entry) {
                warn!("Failed to remove {} during rollback: {e}", entry.display());
            }
        }

        extract_archive(archive, self.app_root())?;

        if let Some(backup) = backup {
            backup.restore_backup(&[])?;
        }

        if let Err(e) = self.install_dependencies() {
            warn!("Dependency install after rollback failed: {e}");
        }
        Ok(())
    }

    fn install_dependencies(&self) -> Result<()> {
        let Some((program, args)) = self.config.dependency_install.split_first() else {
            debug!("No dependency install command configured");
            return Ok(());
        };
        let command = self.config.dependency_install.join(" ");
        info!("Running {command}");

        let status = Command::new(program)
            .args(args)
            .current_dir(self.app_root())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| UpdaterError::DependencyInstallFailed {
                command: command.clone(),
                status: format!("error: {e}"),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(UpdaterError::DependencyInstallFailed {
                command,
                status: status.to_string(),
            })
        }
    }
}

/// Best-effort removal of bookkeeping files.
fn discard(path: &Path, what: &str) {
    if let Err(e) = remove_path(path) {
        warn!("Failed to remove {what}: {e}");
    }
}
