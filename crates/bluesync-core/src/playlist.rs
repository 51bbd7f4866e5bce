//! Playlist management module.
//!
//! Playlists are plain M3U files at the top of the library root. Each line
//! is one root-relative track path; extended M3U is rejected because the
//! head unit cannot read it. The file name carries a run of trailing spaces
//! before the extension so the head unit display never shows `.m3u`.
//!
//! Every write to a playlist file (save, create, rename, delete) goes
//! through one process-wide lock so back-to-back saves on slow removable
//! media never interleave.
//!
//! # Example
//!
//! ```rust,ignore
//! use bluesync_core::playlist::{self, PlaylistSynchronizer};
//!
//! let parsed = playlist::read_playlist(root, &path, false)?;
//! let sync = PlaylistSynchronizer::for_mapping(&mapping);
//! let outcome = sync.sync(&path, &parsed.entries)?;
//! println!("{} now at {}", outcome.name, outcome.path.display());
//! ```

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, FileSystemError, PlaylistError, Result};
use crate::paths::{self, PathMapping};
use crate::sanitize::INVALID_FILE_NAME_CHARS;

/// Playlist file extension.
pub const PLAYLIST_EXTENSION: &str = "m3u";

/// Suffix appended to a playlist name to form its file name. The spaces
/// push the extension off the head unit display.
pub const PLAYLIST_SUFFIX: &str = "            .m3u";

static PLAYLIST_LOCK: Mutex<()> = Mutex::new(());

/// Take the process-wide playlist write lock.
fn write_lock() -> MutexGuard<'static, ()> {
    PLAYLIST_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Entries
// =============================================================================

/// Ordered set of canonical relative entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntries {
    entries: Vec<String>,
}

impl PlaylistEntries {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` if it was already present.
    pub fn insert(&mut self, entry: impl Into<String>) -> bool {
        let entry = entry.into();
        if self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove an entry. Returns `false` if it was not present.
    pub fn remove(&mut self, entry: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e != entry);
        before != self.entries.len()
    }

    /// Check membership.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in playlist order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Entries in playlist order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.entries
    }

    /// Replace every entry present in `mapping`, keeping positions.
    ///
    /// Returns `true` if anything changed. A replacement that would
    /// duplicate an entry already kept is dropped.
    pub fn apply_mapping(&mut self, mapping: &PathMapping) -> bool {
        if mapping.is_empty() {
            return false;
        }

        let mut changed = false;
        let mut updated = Self::new();
        for entry in &self.entries {
            let target = match mapping.get(entry) {
                Some(new) => {
                    changed = true;
                    new
                }
                None => entry.as_str(),
            };
            if !updated.insert(target) {
                changed = true;
            }
        }
        if changed {
            *self = updated;
        }
        changed
    }

    /// Remove every entry listed in `removed`. Returns `true` if anything
    /// was removed.
    pub fn remove_all(&mut self, removed: &[String]) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !removed.contains(e));
        before != self.entries.len()
    }
}

impl<S: Into<String>> FromIterator<S> for PlaylistEntries {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut entries = Self::new();
        for entry in iter {
            entries.insert(entry);
        }
        entries
    }
}

// =============================================================================
// Names and paths
// =============================================================================

/// Check if a path is a playlist file, based on its extension.
#[must_use]
pub fn is_playlist_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PLAYLIST_EXTENSION))
}

/// File path of the playlist called `name` below `root`.
#[must_use]
pub fn playlist_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{name}{PLAYLIST_SUFFIX}"))
}

/// Display name of a playlist: the file stem without the padding.
#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .unwrap_or_default()
}

/// Validate a playlist name and return it trimmed.
///
/// # Errors
///
/// Returns an error if the name is blank or contains characters that are
/// not allowed in file names.
pub fn validate_playlist_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Playlist(PlaylistError::InvalidName {
            name: name.to_string(),
            reason: "Playlist name cannot be empty".to_string(),
        }));
    }

    if trimmed
        .chars()
        .any(|c| c.is_control() || INVALID_FILE_NAME_CHARS.contains(c))
    {
        return Err(Error::Playlist(PlaylistError::InvalidName {
            name: name.to_string(),
            reason: "Playlist name contains invalid characters".to_string(),
        }));
    }

    Ok(trimmed.to_string())
}

// =============================================================================
// Parsing and saving
// =============================================================================

/// Result of parsing a playlist file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlaylist {
    /// Entries that resolve to existing files.
    pub entries: PlaylistEntries,
    /// Entries present on disk but not kept (missing targets, duplicates).
    pub dropped: Vec<String>,
}

impl ParsedPlaylist {
    /// Whether the in-memory list differs from the file.
    #[must_use]
    pub fn is_pruned(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Parse a playlist file.
///
/// Blank lines are ignored, separators are normalised, absolute lines are
/// made relative to `root`. With `skip_missing` set, entries whose target
/// does not exist are dropped instead of failing the parse.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a line starts with `#`,
/// a line points outside `root`, or (without `skip_missing`) an entry's
/// target does not exist.
pub fn read_playlist(root: &Path, path: &Path, skip_missing: bool) -> Result<ParsedPlaylist> {
    let name = display_name(path);
    debug!("Reading playlist '{}' from {}", name, path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        Error::FileSystem(FileSystemError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })?;

    let mut parsed = ParsedPlaylist::default();
    for line in content.trim_start_matches('\u{feff}').lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.trim_start().starts_with('#') {
            return Err(Error::Playlist(PlaylistError::ExtendedM3u {
                playlist: name,
                line: line.to_string(),
            }));
        }

        let entry = paths::resolve_line(root, line).map_err(|e| {
            Error::Playlist(PlaylistError::InvalidEntry {
                playlist: name.clone(),
                entry: line.trim().to_string(),
                reason: e.to_string(),
            })
        })?;

        if paths::entry_to_path(root, &entry).is_file() {
            if !parsed.entries.insert(entry.clone()) {
                debug!("Duplicate entry '{}' in playlist '{}'", entry, name);
                parsed.dropped.push(entry);
            }
        } else if skip_missing {
            debug!("Skipping missing entry '{}' in playlist '{}'", entry, name);
            parsed.dropped.push(entry);
        } else {
            return Err(Error::Playlist(PlaylistError::MissingEntry {
                playlist: name,
                entry: line.trim().to_string(),
            }));
        }
    }

    Ok(parsed)
}

/// Overwrite a playlist file with `entries`, one per line.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save(path: &Path, entries: &PlaylistEntries) -> Result<()> {
    let mut content = String::new();
    for entry in entries.iter() {
        content.push_str(entry);
        content.push('\n');
    }

    let _guard = write_lock();
    fs::write(path, content).map_err(|e| {
        Error::FileSystem(FileSystemError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })?;

    debug!("Saved {} entries to {}", entries.len(), path.display());
    Ok(())
}

// =============================================================================
// Management
// =============================================================================

/// Create an empty playlist called `name` below `root`.
///
/// # Errors
///
/// Returns an error if the name is invalid, the playlist already exists or
/// the file cannot be created.
pub fn create(root: &Path, name: &str) -> Result<PathBuf> {
    let name = validate_playlist_name(name)?;
    let path = playlist_path(root, &name);

    let _guard = write_lock();
    if path.exists() {
        return Err(Error::Playlist(PlaylistError::AlreadyExists { name }));
    }

    fs::write(&path, "").map_err(|e| {
        Error::FileSystem(FileSystemError::WriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        })
    })?;

    info!("Created playlist: {}", name);
    Ok(path)
}

/// Rename a playlist, or create it under the new name if `path` does not
/// exist. The padded file name convention is applied to the result.
///
/// # Errors
///
/// Returns an error if the new name is invalid, another playlist already
/// uses it, or the file system operation fails.
pub fn rename(path: &Path, new_name: &str) -> Result<PathBuf> {
    let new_name = validate_playlist_name(new_name)?;
    let root = path
        .parent()
        .ok_or_else(|| Error::invalid_path(path, "playlist has no parent directory"))?;
    let new_path = playlist_path(root, &new_name);

    let _guard = write_lock();
    if path.is_file() && path != new_path {
        if new_path.exists() {
            return Err(Error::Playlist(PlaylistError::AlreadyExists { name: new_name }));
        }
        fs::rename(path, &new_path).map_err(|e| {
            Error::FileSystem(FileSystemError::MoveFailed {
                source_path: path.to_path_buf(),
                destination: new_path.clone(),
                reason: e.to_string(),
            })
        })?;
        info!("Renamed playlist {} to '{}'", path.display(), new_name);
    } else if !new_path.exists() {
        fs::write(&new_path, "").map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: new_path.clone(),
                reason: e.to_string(),
            })
        })?;
        info!("Created playlist: {}", new_name);
    }

    Ok(new_path)
}

/// Give a playlist file the padded file name for its display name.
///
/// # Errors
///
/// Returns an error if the rename fails.
pub fn normalize_file_name(path: &Path) -> Result<PathBuf> {
    rename(path, &display_name(path))
}

/// Delete a playlist file.
///
/// # Errors
///
/// Returns an error if the playlist does not exist or cannot be deleted.
pub fn delete(path: &Path) -> Result<()> {
    let _guard = write_lock();
    fs::remove_file(path).map_err(|e| {
        if e.kind() == IoErrorKind::NotFound {
            Error::Playlist(PlaylistError::NotFound {
                name: path.display().to_string(),
            })
        } else {
            Error::FileSystem(FileSystemError::DeleteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    })?;

    info!("Deleted playlist: {}", path.display());
    Ok(())
}

/// Append tracks to a playlist, skipping those already listed.
///
/// Returns the number of entries added.
///
/// # Errors
///
/// Returns an error if the playlist cannot be parsed or saved, or a track
/// is not located under `root`.
pub fn add_tracks(root: &Path, path: &Path, tracks: &[PathBuf], skip_missing: bool) -> Result<usize> {
    let mut parsed = read_playlist(root, path, skip_missing)?;

    let mut added = 0;
    for track in tracks {
        let entry = paths::relative_path(root, track)?;
        if parsed.entries.insert(entry) {
            added += 1;
        }
    }

    if added > 0 || parsed.is_pruned() {
        save(path, &parsed.entries)?;
    }
    info!("Added {} tracks to playlist '{}'", added, display_name(path));
    Ok(added)
}

/// Remove tracks from a playlist.
///
/// Returns the number of entries removed.
///
/// # Errors
///
/// Returns an error if the playlist cannot be parsed or saved, or a track
/// is not located under `root`.
pub fn remove_tracks(
    root: &Path,
    path: &Path,
    tracks: &[PathBuf],
    skip_missing: bool,
) -> Result<usize> {
    let mut parsed = read_playlist(root, path, skip_missing)?;

    let mut removed = 0;
    for track in tracks {
        let entry = paths::relative_path(root, track)?;
        if parsed.entries.remove(&entry) {
            removed += 1;
        }
    }

    if removed > 0 || parsed.is_pruned() {
        save(path, &parsed.entries)?;
    }
    info!("Removed {} tracks from playlist '{}'", removed, display_name(path));
    Ok(removed)
}

// =============================================================================
// Synchronisation
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum EntryChange<'a> {
    Moved(&'a PathMapping),
    Removed(&'a [String]),
}

/// Keeps playlists pointing at the right files after tracks moved or were
/// deleted.
#[derive(Debug, Clone, Copy)]
pub struct PlaylistSynchronizer<'a> {
    change: EntryChange<'a>,
}

/// Result of synchronising one playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Playlist file after name normalisation.
    pub path: PathBuf,
    /// Display name.
    pub name: String,
    /// Entries after the update.
    pub entries: PlaylistEntries,
    /// Whether the entries changed and were saved.
    pub changed: bool,
}

/// Result of synchronising a batch of playlists.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Per-playlist outcomes.
    pub outcomes: Vec<SyncOutcome>,
    /// Playlists that could not be updated, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl SyncReport {
    /// Number of playlists whose entries changed.
    #[must_use]
    pub fn updated_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.changed).count()
    }

    /// Check if every playlist was synchronised.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            format!(
                "Updated {} of {} playlists",
                self.updated_count(),
                self.outcomes.len()
            )
        } else {
            format!(
                "Updated {} of {} playlists, {} could not be saved",
                self.updated_count(),
                self.outcomes.len() + self.failed.len(),
                self.failed.len()
            )
        }
    }
}

impl<'a> PlaylistSynchronizer<'a> {
    /// Synchroniser that rewrites moved entries.
    #[must_use]
    pub const fn for_mapping(mapping: &'a PathMapping) -> Self {
        Self {
            change: EntryChange::Moved(mapping),
        }
    }

    /// Synchroniser that drops deleted entries.
    #[must_use]
    pub const fn for_removed(removed: &'a [String]) -> Self {
        Self {
            change: EntryChange::Removed(removed),
        }
    }

    /// Update one playlist: rewrite its entries, save when anything changed
    /// and normalise its file name.
    ///
    /// # Errors
    ///
    /// Returns an error if saving or renaming the playlist fails.
    pub fn sync(&self, path: &Path, entries: &PlaylistEntries) -> Result<SyncOutcome> {
        let mut updated = entries.clone();
        let changed = match self.change {
            EntryChange::Moved(mapping) => updated.apply_mapping(mapping),
            EntryChange::Removed(removed) => updated.remove_all(removed),
        };

        if changed {
            save(path, &updated)?;
        }
        let path = normalize_file_name(path)?;

        Ok(SyncOutcome {
            name: display_name(&path),
            path,
            entries: updated,
            changed,
        })
    }

    /// Update every playlist. A failure on one playlist does not stop the
    /// others.
    pub fn sync_all<'p, I>(&self, playlists: I) -> SyncReport
    where
        I: IntoIterator<Item = (&'p Path, &'p PlaylistEntries)>,
    {
        let mut report = SyncReport::default();
        for (path, entries) in playlists {
            match self.sync(path, entries) {
                Ok(outcome) => {
                    if outcome.changed {
                        info!("Updated playlist '{}'", outcome.name);
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    warn!("Could not update playlist {}: {}", path.display(), e);
                    report.failed.push((path.to_path_buf(), e.to_string()));
                }
            }
        }
        report
    }
}
