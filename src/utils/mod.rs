//! Filesystem and archive utilities
//!
//! - [`fs`] - directory copy/remove, atomic JSON writes, checksums
//! - [`archive`] - zip packing of an application tree and safe extraction

pub mod archive;
pub mod fs;

pub use archive::{extract_archive, pack_tree};
pub use fs::{
    atomic_write, calculate_checksum, copy_dir, copy_entry, ensure_dir, list_entries,
    list_entries_except, read_json_file, remove_path, write_json_file,
};
