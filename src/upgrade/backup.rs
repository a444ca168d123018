use crate::core::{Result, UpdaterError};
use crate::utils::{copy_entry, ensure_dir, list_entries, remove_path};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manages the per-install backup of preserved paths.
///
/// Before an install replaces the application tree, every entry of the
/// preserve set (local secrets, data directories, the VCS checkout) and the
/// current manifest are copied into a fresh directory named
/// `backup-v<version>-<millis>`. After the new build is in place the preserved
/// entries are copied back; on a failed install the automatic rollback
/// restores all of them, manifest included.
///
/// The updater's own working directory is never copied into its own backup.
///
/// # Examples
///
/// ```rust,no_run
/// use gh_updater::upgrade::backup::BackupManager;
/// use std::path::Path;
///
/// # fn example() -> gh_updater::core::Result<()> {
/// let backup = BackupManager::new(Path::new("/opt/app"), Path::new("/opt/app/.gh-updater/backups"), "1.0.0");
/// backup.create_backup(&[".env".to_string()], "package.json")?;
/// // ... replace the tree ...
/// backup.restore_backup(&["package.json"])?;
/// backup.cleanup_backup()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    /// The live application tree.
    app_root: PathBuf,
    /// Directory this install's backup is written to.
    backup_path: PathBuf,
}

impl BackupManager {
    /// Create a manager for a backup of version `version` under `backups_dir`.
    pub fn new(app_root: &Path, backups_dir: &Path, version: &str) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self {
            app_root: app_root.to_path_buf(),
            backup_path: backups_dir.join(format!("backup-v{version}-{millis}")),
        }
    }

    /// Directory holding this backup.
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Copy the preserved entries and the manifest into the backup directory.
    ///
    /// Entries that do not exist in the live tree are skipped. `skip` names
    /// entries that must never be copied (the updater's working directory).
    /// Returns the number of entries backed up.
    pub fn create_backup(&self, preserved: &[String], manifest_file: &str) -> Result<usize> {
        self.create_backup_except(preserved, manifest_file, &[crate::constants::UPDATER_DIR])
    }

    fn create_backup_except(
        &self,
        preserved: &[String],
        manifest_file: &str,
        skip: &[&str],
    ) -> Result<usize> {
        if self.backup_path.exists() {
            debug!("Removing stale backup at {}", self.backup_path.display());
            remove_path(&self.backup_path)?;
        }
        ensure_dir(&self.backup_path)?;

        let mut names: Vec<&str> = preserved
            .iter()
            .map(String::as_str)
            .filter(|name| !skip.contains(name))
            .collect();
        if !names.contains(&manifest_file) {
            names.push(manifest_file);
        }

        let mut count = 0;
        for name in names {
            let source = self.app_root.join(name);
            if std::fs::symlink_metadata(&source).is_err() {
                debug!("Nothing to back up for {name}");
                continue;
            }
            copy_entry(&source, &self.backup_path.join(name))?;
            count += 1;
        }

        info!(entries = count, path = %self.backup_path.display(), "Backup created");
        Ok(count)
    }

    /// Copy every backed-up entry, except those named in `except`, over the live tree.
    ///
    /// Existing live entries are replaced. Returns the number restored.
    pub fn restore_backup(&self, except: &[&str]) -> Result<usize> {
        if !self.backup_path.is_dir() {
            return Err(UpdaterError::fs(
                "restore backup from",
                &self.backup_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "backup directory is missing"),
            ));
        }

        let mut count = 0;
        for entry in list_entries(&self.backup_path)? {
            let Some(name) = entry.file_name() else { continue };
            if except.iter().any(|e| std::ffi::OsStr::new(e) == name) {
                continue;
            }
            let target = self.app_root.join(name);
            remove_path(&target)?;
            copy_entry(&entry, &target)?;
            count += 1;
        }

        debug!(entries = count, "Restored preserved entries");
        Ok(count)
    }

    /// Remove the backup directory. A missing backup is not an error.
    pub fn cleanup_backup(&self) -> Result<()> {
        if self.backup_path.exists() {
            debug!("Cleaning up backup at {}", self.backup_path.display());
            if let Err(e) = remove_path(&self.backup_path) {
                warn!("Failed to remove backup: {e}");
                return Err(e);
            }
        }
        Ok(())
    }
}
