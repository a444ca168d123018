//! Command-line interface for gh-updater.
//!
//! Each subcommand maps 1:1 onto an [`Updater`](crate::upgrade::Updater)
//! operation:
//!
//! - `check` - resolve the next reachable version
//! - `download` - download its build
//! - `install` - install the downloaded build (rolls back on failure)
//! - `state` - print the state machine
//! - `clear-downloads` - delete downloaded builds
//! - `rollback` - restore the most recent rollback archive
//! - `rollback-info` - describe the most recent rollback archive
//! - `clear-backups` - delete backups and rollback archives
//!
//! # Global Options
//!
//! - `--config` - configuration file (default `gh-updater.toml`)
//! - `--root` - application root, overriding the configuration
//! - `--json` - print the operation result as JSON
//! - `--verbose` / `--quiet` - log level when `RUST_LOG` is unset
//!
//! # Examples
//!
//! ```bash
//! gh-updater check
//! gh-updater --json download
//! gh-updater --root /opt/scoreboard install
//! RUST_LOG=gh_updater=trace gh-updater rollback
//! ```

mod report;

use crate::config::UpdaterConfig;
use crate::constants::DEFAULT_CONFIG_FILE;
use crate::core::UpdaterError;
use crate::upgrade::Updater;
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Self-update agent for services released through GitHub releases.
#[derive(Parser, Debug)]
#[command(name = "gh-updater", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(long, global = true, env = "GH_UPDATER_CONFIG")]
    config: Option<PathBuf>,

    /// Application root (overrides `app_root` from the configuration)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Check for a reachable update
    Check,
    /// Download the next reachable update
    Download,
    /// Install the downloaded update
    Install,
    /// Show the updater state
    State,
    /// Delete downloaded updates
    ClearDownloads,
    /// Restore the most recent rollback archive
    Rollback,
    /// Describe the most recent rollback archive
    RollbackInfo,
    /// Delete backups and rollback archives
    ClearBackups,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    /// Load the configuration and apply command-line overrides.
    pub fn load_config(&self) -> Result<UpdaterConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if self.config.is_none() && !path.exists() {
            return Err(UpdaterError::config(format!(
                "no configuration file found at {}",
                path.display()
            ))
            .into());
        }

        let mut config = UpdaterConfig::load_from(&path)?;
        if let Some(root) = &self.root {
            config.app_root = root.clone();
        }
        Ok(config)
    }

    /// Run the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.load_config()?;
        let updater = crate::init_global(config)?;
        self.run(&updater).await
    }

    async fn run(&self, updater: &Arc<Updater>) -> Result<()> {
        match self.command {
            Commands::Check => self.emit(&updater.check().await?, report::check),
            Commands::Download => self.emit(&updater.download().await?, report::download),
            Commands::Install => self.emit(&updater.install().await?, report::install),
            Commands::State => self.emit(&updater.get_state(), report::state),
            Commands::ClearDownloads => self.emit(&updater.clear_downloads()?, report::clear),
            Commands::Rollback => self.emit(&updater.rollback().await?, report::rollback),
            Commands::RollbackInfo => {
                self.emit(&updater.get_rollback_info()?, report::rollback_info)
            }
            Commands::ClearBackups => self.emit(&updater.clear_backups()?, report::clear),
        }
    }

    fn emit<T: Serialize>(&self, value: &T, human: fn(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}
