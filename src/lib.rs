//! gh-updater - self-update agent for long-running services
//!
//! A service embeds this crate to update itself from builds published as
//! release assets on a GitHub-style release registry. It can:
//!
//! - **check** whether a newer release is reachable from the installed version,
//!   honouring minimum-version fences declared in release notes
//! - **download** the build of the next hop, following redirects only to
//!   trusted hosts
//! - **install** the build over the live application tree, with a snapshot
//!   taken first and an automatic rollback on failure
//! - **roll back** to the snapshot on request
//!
//! # Architecture Overview
//!
//! - [`config`] - construction-time configuration and the redirect allow-list
//! - [`core`] - error taxonomy and operator-facing error rendering
//! - [`version`] - version comparison and the installed-version reader
//! - [`registry`] - registry client, release models, metadata parser
//! - [`upgrade`] - resolver, downloader, install/rollback engine, state machine
//! - [`utils`] - filesystem and zip helpers
//! - [`cli`] - the `gh-updater` command-line front end
//!
//! # Release conventions
//!
//! - Tags are versions, optionally prefixed with `v` (`v1.4.0`).
//! - Each release carries an asset named `<repo>-build-<version>.zip` holding
//!   the application tree, including its `package.json`.
//! - A release may declare the lowest version allowed to upgrade to it:
//!
//! ```text
//! <!-- UPGRADE_METADATA
//! { "minimumVersionRequired": "1.5.0" }
//! -->
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use gh_updater::config::UpdaterConfig;
//!
//! # async fn example() -> gh_updater::core::Result<()> {
//! let updater = gh_updater::init_global(
//!     UpdaterConfig::new("acme", "scoreboard").with_app_root("/opt/scoreboard"),
//! )?;
//!
//! let check = updater.check().await?;
//! if check.upgrade.update_available {
//!     updater.download().await?;
//!     let outcome = updater.install().await?;
//!     println!("updated {} -> {}", outcome.old_version, outcome.new_version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod registry;
pub mod upgrade;
pub mod utils;
pub mod version;

use std::sync::Arc;
use upgrade::{Updater, UpdaterCell};

static GLOBAL: UpdaterCell = UpdaterCell::new();

/// Initialise the process-wide updater.
///
/// A second call fails with [`core::UpdaterError::AlreadyExists`].
pub fn init_global(config: config::UpdaterConfig) -> core::Result<Arc<Updater>> {
    GLOBAL.init(config)
}

/// The process-wide updater, if [`init_global`] has succeeded.
pub fn global() -> Option<Arc<Updater>> {
    GLOBAL.get()
}
