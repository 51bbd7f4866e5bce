//! Root-relative path handling.
//!
//! Playlist entries and path mappings use one canonical form: components
//! joined by a backslash, relative to the library root (`001\001.mp3`).
//! That is the form the head unit reads, and it keeps mappings comparable
//! regardless of the host platform.

use std::collections::BTreeMap;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator used in stored playlist entries and path mappings.
pub const ENTRY_SEPARATOR: char = '\\';

/// Extension of the music files the library manages.
pub const MUSIC_EXTENSION: &str = "mp3";

/// Check if a path names a music file, based on its extension.
#[must_use]
pub fn is_music_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MUSIC_EXTENSION))
}

/// Compute the canonical relative form of `path` below `root`.
///
/// # Errors
///
/// Returns an invalid-path error when `path` is not located under `root`
/// or equals it.
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rest = path.strip_prefix(root).map_err(|_| {
        Error::invalid_path(path, format!("not under library root {}", root.display()))
    })?;

    let mut parts = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(Error::invalid_path(
                    path,
                    "relative part must not leave the library root",
                ));
            }
        }
    }

    if parts.is_empty() {
        return Err(Error::invalid_path(path, "path is the library root itself"));
    }
    Ok(parts.join(&ENTRY_SEPARATOR.to_string()))
}

/// Split an entry on either separator into its components.
fn entry_components(entry: &str) -> impl Iterator<Item = &str> {
    entry
        .split(['\\', '/'])
        .filter(|part| !part.is_empty() && *part != ".")
}

/// Rewrite a line using the separator of the host platform.
#[must_use]
pub fn to_native(line: &str) -> PathBuf {
    let native: String = line
        .trim()
        .chars()
        .map(|c| if c == '\\' || c == '/' { MAIN_SEPARATOR } else { c })
        .collect();
    PathBuf::from(native)
}

/// Absolute location of an entry below `root`.
#[must_use]
pub fn entry_to_path(root: &Path, entry: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in entry_components(entry) {
        path.push(part);
    }
    path
}

/// Resolve a playlist line to a canonical relative entry.
///
/// Lines that look absolute on this platform are made relative to `root`.
///
/// # Errors
///
/// Returns an invalid-path error when an absolute line points outside
/// `root`, or a relative line climbs out of it.
pub fn resolve_line(root: &Path, line: &str) -> Result<String> {
    let native = to_native(line);
    if native.is_absolute() {
        return relative_path(root, &native);
    }

    if entry_components(line).any(|part| part == "..") {
        return Err(Error::invalid_path(
            native,
            "relative part must not leave the library root",
        ));
    }
    Ok(entry_components(line)
        .collect::<Vec<_>>()
        .join(&ENTRY_SEPARATOR.to_string()))
}

/// Old entry to new entry table produced by a renaming run.
///
/// Keys and values are canonical relative entries. The mapping is consumed
/// once by the playlist synchronizer and then discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    moves: BTreeMap<String, String>,
}

impl PathMapping {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a move. Identical paths are not recorded.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        let (old, new) = (old.into(), new.into());
        if old != new {
            self.moves.insert(old, new);
        }
    }

    /// New entry for `old`, if it moved.
    #[must_use]
    pub fn get(&self, old: &str) -> Option<&str> {
        self.moves.get(old).map(String::as_str)
    }

    /// Number of recorded moves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Check if nothing moved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Replace the new entry of every move for which `redirect` returns
    /// another entry.
    pub fn redirect<F>(&mut self, mut redirect: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        for new in self.moves.values_mut() {
            if let Some(actual) = redirect(new) {
                *new = actual;
            }
        }
    }

    /// Iterate over `(old, new)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.moves.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
