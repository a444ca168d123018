//! Zip packing and extraction for build artifacts and rollback archives.
//!
//! Entry names always use `/` separators. Extraction only writes entries whose
//! names stay inside the destination ([`zip::read::ZipFile::enclosed_name`]);
//! anything else is skipped with a warning.

use crate::core::{IoResultExt, Result, UpdaterError};
use crate::utils::fs::{ensure_dir, list_entries_except};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    if metadata.is_dir() { 0o755 } else { 0o644 }
}

fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() { None } else { Some(parts.join("/")) }
}

/// Pack every top-level entry of `root` not named in `excluded` into `archive`.
///
/// Returns the number of top-level entries packed.
pub fn pack_tree(root: &Path, archive: &Path, excluded: &[String]) -> Result<usize> {
    if let Some(parent) = archive.parent() {
        ensure_dir(parent)?;
    }

    let file = File::create(archive).fs_context("create archive", archive)?;
    let mut writer = ZipWriter::new(file);
    let top_level = list_entries_except(root, excluded)?;

    for entry_path in &top_level {
        for entry in WalkDir::new(entry_path).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(entry_path.as_path()).to_path_buf();
                UpdaterError::fs("walk", &path, io::Error::from(e))
            })?;
            let path = entry.path();
            let Some(name) = entry_name(root, path) else {
                continue;
            };
            let metadata = fs::symlink_metadata(path).fs_context("stat", path)?;
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(mode_of(&metadata));

            if metadata.file_type().is_symlink() {
                let target = fs::read_link(path).fs_context("read link", path)?;
                writer.add_symlink(name, target.to_string_lossy().into_owned(), options)?;
            } else if metadata.is_dir() {
                writer.add_directory(format!("{name}/"), options)?;
            } else {
                writer.start_file(name, options)?;
                let mut source = File::open(path).fs_context("open", path)?;
                io::copy(&mut source, &mut writer).fs_context("archive", path)?;
            }
        }
    }

    writer.finish()?;
    debug!(entries = top_level.len(), archive = %archive.display(), "Packed application tree");
    Ok(top_level.len())
}

/// Extract `archive` into `dest`, creating it if needed.
///
/// Returns the number of entries written.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    ensure_dir(dest)?;
    let file = File::open(archive).fs_context("open archive", archive)?;
    let mut zip = ZipArchive::new(file)?;
    let mut written = 0;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(relative);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            ensure_dir(&out_path)?;
            written += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            ensure_dir(parent)?;
        }

        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            entry.read_to_string(&mut target).fs_context("read link target", &out_path)?;
            write_symlink(&target, &out_path)?;
            written += 1;
            continue;
        }

        let mut out = File::create(&out_path).fs_context("create", &out_path)?;
        io::copy(&mut entry, &mut out).fs_context("extract", &out_path)?;
        drop(out);
        set_mode(&out_path, mode)?;
        written += 1;
    }

    debug!(entries = written, archive = %archive.display(), dest = %dest.display(), "Extracted archive");
    Ok(written)
}

#[cfg(unix)]
fn write_symlink(target: &str, link: &Path) -> Result<()> {
    crate::utils::fs::remove_path(link)?;
    std::os::unix::fs::symlink(target, link).fs_context("create link", link)
}

#[cfg(not(unix))]
fn write_symlink(_target: &str, link: &Path) -> Result<()> {
    warn!("Skipping symbolic link {}", link.display());
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        let perms = fs::Permissions::from_mode(mode & 0o7777);
        fs::set_permissions(path, perms).fs_context("set permissions", path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}
