//! Human-readable rendering of operation results.

use crate::upgrade::{
    CheckOutcome, ClearOutcome, DownloadOutcome, InstallOutcome, RollbackInfo, RollbackOutcome,
    UpdaterState,
};
use colored::Colorize;

pub(super) fn check(outcome: &CheckOutcome) {
    let upgrade = &outcome.upgrade;
    println!("Current version: {}", outcome.current_version.cyan());
    println!("Latest version:  {}", upgrade.latest_version.cyan());

    if !upgrade.update_available {
        match &upgrade.target_version {
            Some(_) => println!("{}", "Already running the latest compatible version".green()),
            None => println!("{}", upgrade.release_notes.yellow()),
        }
        return;
    }

    if let Some(target) = &upgrade.target_version {
        println!("{} {}", "Update available:".green().bold(), target.bold());
    }
    if !upgrade.is_latest_compatible {
        let minimum = upgrade
            .latest_minimum_version_required
            .as_deref()
            .unwrap_or("unknown");
        println!(
            "{}",
            format!(
                "Latest release requires at least {minimum}; this is an intermediate version"
            )
            .yellow()
        );
    }
    if let Some(name) = &upgrade.release_name {
        println!("Release: {name}");
    }
    if let Some(published) = &upgrade.published_at {
        println!("Published: {}", published.format("%Y-%m-%d %H:%M UTC"));
    }
    if outcome.downloaded {
        println!("{}", "Already downloaded; run `gh-updater install`".green());
    }
    if !upgrade.release_notes.is_empty() {
        println!("\n{}", upgrade.release_notes);
    }
}

pub(super) fn download(outcome: &DownloadOutcome) {
    if !outcome.success {
        println!("{}", outcome.message.yellow());
        return;
    }
    let target = outcome.target_version.as_deref().unwrap_or_default();
    println!("{} {}", "Downloaded".green().bold(), target.bold());
    if let Some(size) = outcome.size {
        println!("Size: {size} bytes");
    }
    if outcome.is_intermediate_version == Some(true) {
        println!(
            "{}",
            format!(
                "This is an intermediate version; {} will be reachable after installing it",
                outcome.latest_version
            )
            .yellow()
        );
    }
}

pub(super) fn install(outcome: &InstallOutcome) {
    println!(
        "{} {} -> {}",
        "Installed".green().bold(),
        outcome.old_version,
        outcome.new_version.bold()
    );
    println!("Rollback archive: {}", outcome.rollback_path.display());
}

pub(super) fn state(state: &UpdaterState) {
    let current = if state.locked {
        state.current.as_str().yellow()
    } else {
        state.current.as_str().green()
    };
    println!("State: {current}");
}

pub(super) fn clear(outcome: &ClearOutcome) {
    println!("{}", outcome.message);
}

pub(super) fn rollback(outcome: &RollbackOutcome) {
    println!("{}", outcome.message.green());
}

pub(super) fn rollback_info(info: &Option<RollbackInfo>) {
    match info {
        Some(info) => {
            println!("Rollback available to version {}", info.version.bold());
            println!("Archive: {} ({} bytes)", info.path.display(), info.size);
            println!("Created: {}", info.created_at.format("%Y-%m-%d %H:%M UTC"));
        }
        None => println!("{}", "No rollback available".yellow()),
    }
}
