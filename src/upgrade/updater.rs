use super::download::{DownloadRecord, Downloader, read_download_record};
use super::engine::InstallEngine;
use super::resolver::{UpgradePathResult, resolve_upgrade_path};
use super::rollback::RollbackInfo;
use super::state::{Operation, StateMachine, UpdaterState};
use crate::config::UpdaterConfig;
use crate::core::{Result, UpdaterError};
use crate::registry::RegistryClient;
use crate::utils::{list_entries, remove_path};
use crate::version::read_manifest_version;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Result of [`Updater::check`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub current_version: String,
    #[serde(flatten)]
    pub upgrade: UpgradePathResult,
    /// A complete download of the target version is on disk.
    pub downloaded: bool,
    pub downloaded_version: Option<String>,
}

/// Result of [`Updater::download`].
///
/// `success` is `false`, with an explanation in `message`, when there is
/// nothing to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    pub latest_version: String,
    pub is_latest_compatible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_intermediate_version: Option<bool>,
    pub minimum_version_required: Option<String>,
}

/// Result of [`Updater::install`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub success: bool,
    pub message: String,
    pub old_version: String,
    pub new_version: String,
    pub rollback_available: bool,
    pub rollback_path: PathBuf,
}

/// Result of [`Updater::rollback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub success: bool,
    pub message: String,
    pub version: String,
}

/// Result of [`Updater::clear_downloads`] and [`Updater::clear_backups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearOutcome {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
}

/// The self-update agent.
///
/// Obtained from an [`UpdaterCell`]; see the [module docs](super) for the
/// lifecycle of an update. All operations are serialised by an in-process
/// state machine: calling one while another runs returns
/// [`UpdaterError::Busy`] immediately.
#[derive(Debug)]
pub struct Updater {
    config: UpdaterConfig,
    registry: RegistryClient,
    downloader: Downloader,
    engine: InstallEngine,
    state: Arc<StateMachine>,
}

impl Updater {
    fn new(config: UpdaterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: RegistryClient::new(&config)?,
            downloader: Downloader::new(&config)?,
            engine: InstallEngine::new(config.clone()),
            state: Arc::default(),
            config,
        })
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Version of the live application, read from its manifest.
    pub fn current_version(&self) -> Result<String> {
        read_manifest_version(&self.config.app_root, &self.config.manifest_file)
    }

    pub fn get_state(&self) -> UpdaterState {
        self.state.snapshot()
    }

    /// Resolve the next upgrade hop and report what is already downloaded.
    pub async fn check(&self) -> Result<CheckOutcome> {
        let _guard = self.state.begin(Operation::Checking, "check for updates")?;

        let current_version = self.current_version()?;
        let upgrade =
            resolve_upgrade_path(&self.registry, &current_version, self.config.release_page_size).await?;

        let record = read_download_record(&self.config);
        let target = upgrade.target_version.as_deref().unwrap_or(&upgrade.latest_version);
        let downloaded = record.as_ref().is_some_and(|r| r.version == target);

        Ok(CheckOutcome {
            current_version,
            downloaded,
            downloaded_version: record.map(|r| r.version),
            upgrade,
        })
    }

    /// Download the build of the next upgrade hop.
    pub async fn download(&self) -> Result<DownloadOutcome> {
        let _guard = self.state.begin(Operation::Downloading, "download")?;

        let current_version = self.current_version()?;
        let upgrade =
            resolve_upgrade_path(&self.registry, &current_version, self.config.release_page_size).await?;

        let (Some(target), Some(release), true) = (
            upgrade.target_version.clone(),
            upgrade.selected_release.as_ref(),
            upgrade.update_available,
        ) else {
            let message = if upgrade.target_version.is_some() {
                "Already running latest compatible version".to_string()
            } else {
                upgrade.release_notes.clone()
            };
            info!("{message}");
            return Ok(DownloadOutcome {
                success: false,
                message,
                size: None,
                target_version: None,
                latest_version: upgrade.latest_version,
                is_latest_compatible: upgrade.is_latest_compatible,
                is_intermediate_version: None,
                minimum_version_required: upgrade.minimum_version_required,
            });
        };

        let asset_name = self.config.asset_name(&target);
        let record = self.downloader.download(release, &target, &asset_name).await?;

        Ok(DownloadOutcome {
            success: true,
            message: "Update downloaded successfully".to_string(),
            size: record.size,
            is_intermediate_version: Some(target != upgrade.latest_version),
            target_version: Some(target),
            latest_version: upgrade.latest_version,
            is_latest_compatible: upgrade.is_latest_compatible,
            minimum_version_required: upgrade.minimum_version_required,
        })
    }

    /// Install the downloaded build, rolling back automatically on failure.
    pub async fn install(&self) -> Result<InstallOutcome> {
        let guard = self.state.begin(Operation::Installing, "install")?;

        let record: DownloadRecord = read_download_record(&self.config).ok_or(UpdaterError::NothingDownloaded)?;
        let current_version = self.current_version()?;

        let engine = self.engine.clone();
        let report = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            engine.install(&record, &current_version)
        })
            .await
            .map_err(|e| UpdaterError::Task {
                message: e.to_string(),
            })??;

        Ok(InstallOutcome {
            success: true,
            message: "Update installed successfully".to_string(),
            old_version: report.old_version,
            new_version: report.new_version,
            rollback_available: true,
            rollback_path: report.rollback_path,
        })
    }

    /// Restore the most recent rollback archive.
    pub async fn rollback(&self) -> Result<RollbackOutcome> {
        let guard = self.state.begin(Operation::Installing, "rollback")?;

        let engine = self.engine.clone();
        let report = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            engine.rollback()
        })
            .await
            .map_err(|e| UpdaterError::Task {
                message: e.to_string(),
            })??;

        Ok(RollbackOutcome {
            success: true,
            message: format!("Successfully rolled back to version {}", report.version),
            version: report.version,
        })
    }

    /// Describe what [`Self::rollback`] would restore.
    pub fn get_rollback_info(&self) -> Result<Option<RollbackInfo>> {
        self.engine.rollbacks().info()
    }

    /// Delete everything in the downloads directory.
    pub fn clear_downloads(&self) -> Result<ClearOutcome> {
        self.state.while_idle(
            "clear downloads",
            &[Operation::Downloading, Operation::Installing],
            || {
                let deleted = clear_dir(&self.config.downloads_dir())?;
                Ok(clear_outcome(deleted, "download"))
            },
        )
    }

    /// Delete all backups and rollback archives.
    pub fn clear_backups(&self) -> Result<ClearOutcome> {
        self.state.while_idle("clear backups", &[Operation::Installing], || {
            let deleted =
                clear_dir(&self.config.backups_dir())? + clear_dir(&self.config.rollback_dir())?;
            Ok(clear_outcome(deleted, "backup"))
        })
    }
}

fn clear_dir(dir: &Path) -> Result<usize> {
    let entries = list_entries(dir)?;
    for entry in &entries {
        debug!("Removing {}", entry.display());
        remove_path(entry)?;
    }
    Ok(entries.len())
}

fn clear_outcome(deleted: usize, noun: &str) -> ClearOutcome {
    let message = if deleted == 0 {
        format!("No {noun}s to clear")
    } else {
        format!("Cleared {deleted} {noun}(s)")
    };
    info!("{message}");
    ClearOutcome {
        success: true,
        message,
        deleted_count: deleted,
    }
}

/// Guarded initialiser handing out the single [`Updater`] of a cell.
///
/// The first [`init`](Self::init) builds the updater; every later call fails
/// with [`UpdaterError::AlreadyExists`]. Use [`crate::init_global`] for the
/// process-wide instance, or own a cell and inject the handle.
///
/// ```rust,no_run
/// use gh_updater::config::UpdaterConfig;
/// use gh_updater::upgrade::UpdaterCell;
///
/// static UPDATER: UpdaterCell = UpdaterCell::new();
///
/// # async fn example() -> gh_updater::core::Result<()> {
/// let updater = UPDATER.init(UpdaterConfig::new("acme", "scoreboard"))?;
/// let check = updater.check().await?;
/// if check.upgrade.update_available {
///     updater.download().await?;
///     updater.install().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct UpdaterCell {
    inner: OnceLock<Arc<Updater>>,
}

impl UpdaterCell {
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Build the updater. Fails if this cell already holds one.
    pub fn init(&self, config: UpdaterConfig) -> Result<Arc<Updater>> {
        if self.inner.get().is_some() {
            return Err(UpdaterError::AlreadyExists);
        }
        let updater = Arc::new(Updater::new(config)?);
        if self.inner.set(Arc::clone(&updater)).is_err() {
            warn!("Concurrent updater initialisation lost the race");
            return Err(UpdaterError::AlreadyExists);
        }
        Ok(updater)
    }

    /// The updater, if initialised.
    pub fn get(&self) -> Option<Arc<Updater>> {
        self.inner.get().cloned()
    }
}

impl Default for UpdaterCell {
    fn default() -> Self {
        Self::new()
    }
}
