//! File system helpers for the library layout.
//!
//! A library root holds one folder per album (any depth of music files
//! below it) and the playlists at the top level. Listings are sorted by
//! name so every scan and every run sees the same order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, FileSystemError, Result};
use crate::paths;
use crate::playlist;

/// Name of the staging directory used by renaming runs.
pub const STAGING_DIR_NAME: &str = "_blueMeTmp";

/// Converts an I/O error for read operations.
pub(crate) fn read_error(path: &Path, e: io::Error) -> Error {
    Error::FileSystem(FileSystemError::ReadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Converts an I/O error for directory creation.
pub(crate) fn create_dir_error(path: &Path, e: io::Error) -> Error {
    Error::FileSystem(FileSystemError::CreateDirFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Converts an I/O error for move operations.
pub(crate) fn move_error(source: &Path, destination: &Path, e: io::Error) -> Error {
    Error::FileSystem(FileSystemError::MoveFailed {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Check that `root` can serve as a library root.
///
/// # Errors
///
/// Returns an error if the path does not exist or is not a directory.
pub fn ensure_root(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(Error::FileSystem(FileSystemError::NotFound {
            path: root.to_path_buf(),
        }));
    }
    if !root.is_dir() {
        return Err(Error::invalid_path(root, "library root is not a directory"));
    }
    Ok(())
}

/// Sorted entries directly below `dir` matching `keep`.
fn list_dir(dir: &Path, keep: impl Fn(&Path, &fs::FileType) -> bool) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| read_error(dir, e))? {
        let entry = entry.map_err(|e| read_error(dir, e))?;
        let file_type = entry.file_type().map_err(|e| read_error(&entry.path(), e))?;
        let path = entry.path();
        if keep(&path, &file_type) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Album folders directly below the root, without the staging directory.
///
/// # Errors
///
/// Returns an error if the root cannot be listed.
pub fn music_folders(root: &Path) -> Result<Vec<PathBuf>> {
    list_dir(root, |path, file_type| {
        file_type.is_dir() && path.file_name().is_none_or(|name| name != STAGING_DIR_NAME)
    })
}

/// Playlist files directly below the root.
///
/// # Errors
///
/// Returns an error if the root cannot be listed.
pub fn playlist_files(root: &Path) -> Result<Vec<PathBuf>> {
    list_dir(root, |path, file_type| {
        file_type.is_file() && playlist::is_playlist_file(path)
    })
}

/// Music files directly inside `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn top_level_music_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_dir(dir, |path, file_type| {
        file_type.is_file() && paths::is_music_file(path)
    })
}

/// Music files at any depth below `dir`, in name order per directory.
///
/// The staging directory is skipped. Unreadable entries are skipped.
#[must_use]
pub fn music_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != STAGING_DIR_NAME)
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file() && paths::is_music_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Whether the stem of `path` consists of ASCII digits only.
#[must_use]
pub fn has_numeric_stem(path: &Path) -> bool {
    numeric_stem(path).is_some()
}

/// The number an all-digit file or folder name stands for.
#[must_use]
pub fn numeric_stem(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Highest number among all-digit names, `0` when there is none.
pub fn highest_number<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> u32 {
    paths
        .into_iter()
        .filter_map(|path| numeric_stem(path))
        .max()
        .unwrap_or(0)
}
