//! File system helpers used by the install and rollback engine.
//!
//! Everything here is synchronous. Install and rollback run on a blocking
//! worker, so plain `std::fs` keeps the tree operations simple and ordered.
//! All functions report failures as [`UpdaterError::FileSystem`] with the path
//! that failed.

use crate::core::{IoResultExt, Result, UpdaterError};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Ensures a directory exists, creating it and all parents if necessary.
///
/// Fails if `path` exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(UpdaterError::fs(
                "create directory",
                path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
            ));
        }
        return Ok(());
    }
    fs::create_dir_all(path).fs_context("create directory", path)
}

/// Atomically writes bytes to a file.
///
/// The content goes to a sibling `.tmp` file which is synced and then renamed
/// over `path`, so readers see either the old or the new content.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path).fs_context("create", &temp_path)?;
        file.write_all(content).fs_context("write", &temp_path)?;
        file.sync_all().fs_context("sync", &temp_path)?;
    }

    fs::rename(&temp_path, path).fs_context("rename into place", path)
}

/// Serialise `data` as pretty JSON and write it atomically.
pub fn write_json_file<T>(path: &Path, data: &T) -> Result<()>
where
    T: serde::Serialize,
{
    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| UpdaterError::parse(format!("JSON for {}", path.display()), e))?;
    atomic_write(path, &json)
}

/// Read and deserialise a JSON file.
pub fn read_json_file<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = fs::read(path).fs_context("read", path)?;
    serde_json::from_slice(&content).map_err(|e| UpdaterError::parse(path.display().to_string(), e))
}

/// Recursively copies a directory tree.
///
/// Regular files keep their permissions; symbolic links are recreated as
/// links on Unix and skipped elsewhere.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in fs::read_dir(src).fs_context("read directory", src)? {
        let entry = entry.fs_context("read directory", src)?;
        copy_entry(&entry.path(), &dst.join(entry.file_name()))?;
    }

    Ok(())
}

/// Copies a single file, directory or symlink from `src` to `dst`.
pub fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(src).fs_context("stat", src)?;
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        copy_dir(src, dst)
    } else if file_type.is_symlink() {
        copy_symlink(src, dst)
    } else {
        fs::copy(src, dst).fs_context("copy file to", dst)?;
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).fs_context("read link", src)?;
    remove_path(dst)?;
    std::os::unix::fs::symlink(&target, dst).fs_context("create link", dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<()> {
    tracing::debug!("Skipping symbolic link {}", src.display());
    Ok(())
}

/// Removes a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(UpdaterError::fs("stat", path, e)),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path).fs_context("remove directory", path)
    } else {
        fs::remove_file(path).fs_context("remove file", path)
    }
}

/// Lists the direct children of `dir`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(dir)
        .fs_context("read directory", dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .fs_context("read directory", dir)?;
    entries.sort();
    Ok(entries)
}

/// Lists the direct children of `dir` whose names are not in `excluded`.
pub fn list_entries_except(dir: &Path, excluded: &[String]) -> Result<Vec<PathBuf>> {
    Ok(list_entries(dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|name| !excluded.iter().any(|e| e == name))
        })
        .collect())
}

/// Computes the SHA-256 checksum of a file as lowercase hex.
pub fn calculate_checksum(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).fs_context("open", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).fs_context("read", path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
