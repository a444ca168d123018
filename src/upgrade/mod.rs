//! Self-update of the host application.
//!
//! This module implements the update lifecycle for an application tree whose
//! builds are published as release assets on the registry.
//!
//! # Architecture Overview
//!
//! - **[`Updater`]**: the public facade; serialises operations through the
//!   [`state`] machine and hands out through [`UpdaterCell`]
//! - **[`resolver`]**: picks the next reachable version, honouring
//!   `minimumVersionRequired` fences
//! - **[`download`]**: fetches the build artifact, following one redirect to a
//!   trusted host only
//! - **[`engine`]**: stages, snapshots, swaps and restores the live tree
//! - **[`backup::BackupManager`]** and **[`rollback::RollbackStore`]**: the
//!   two safety nets the engine relies on
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. check     (checking)     resolve upgrade path, report downloaded state
//! 2. download  (downloading)  resolve again, fetch <repo>-build-<target>.zip
//! 3. install   (installing)   verify, stage, fence, backup, snapshot, swap, deps
//!                             on failure: automatic rollback
//! 4. rollback  (installing)   restore newest rollback-v<version>.zip
//! ```
//!
//! # Safety Mechanisms
//!
//! - The rollback archive is written before anything in the live tree is
//!   deleted.
//! - The staged build's own minimum version is checked before the live tree
//!   is touched.
//! - Preserved paths and the updater's working directory are never deleted.
//! - A failed install reports whether the automatic rollback succeeded
//!   ([`UpdaterError::RolledBack`](crate::core::UpdaterError::RolledBack)) or
//!   not ([`UpdaterError::RollbackFailed`](crate::core::UpdaterError::RollbackFailed)).
//!
//! # Concurrency
//!
//! The state machine is in-process only. Two processes updating the same
//! application tree are not coordinated.

pub mod backup;
pub mod download;
pub mod engine;
pub mod resolver;
pub mod rollback;
pub mod state;
mod updater;

pub use download::{DownloadRecord, Downloader, read_download_record};
pub use engine::InstallEngine;
pub use resolver::{UpgradePathResult, resolve_upgrade_path};
pub use rollback::{RollbackInfo, RollbackStore};
pub use state::{Operation, UpdaterState};
pub use updater::{
    CheckOutcome, ClearOutcome, DownloadOutcome, InstallOutcome, RollbackOutcome, Updater,
    UpdaterCell,
};
