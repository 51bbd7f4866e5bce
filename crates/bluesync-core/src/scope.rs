//! Selection of the tracks an operation works on.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, FileSystemError, Result};
use crate::fs;
use crate::paths;

/// Which tracks an operation processes.
///
/// Explicit tracks win over folders, folders over the whole library.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    /// These tracks, in this order.
    Tracks(Vec<PathBuf>),
    /// Every track at any depth below these folders.
    Folders(Vec<PathBuf>),
    /// Every track below the root.
    #[default]
    All,
}

impl Scope {
    /// Build a scope from optional selections, preferring tracks.
    #[must_use]
    pub fn from_selection(folders: Vec<PathBuf>, tracks: Vec<PathBuf>) -> Self {
        if !tracks.is_empty() {
            Self::Tracks(tracks)
        } else if !folders.is_empty() {
            Self::Folders(folders)
        } else {
            Self::All
        }
    }

    /// Resolve the scope to absolute track paths below `root`.
    ///
    /// Relative selections are taken relative to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected path lies outside the root, a
    /// selected track is not a music file or does not exist, or a selected
    /// folder is not a directory.
    pub fn resolve(&self, root: &Path) -> Result<Vec<PathBuf>> {
        fs::ensure_root(root)?;

        let tracks = match self {
            Self::Tracks(tracks) => {
                let mut resolved = Vec::with_capacity(tracks.len());
                for track in tracks {
                    let track = absolute(root, track)?;
                    if !paths::is_music_file(&track) {
                        return Err(Error::invalid_path(track, "not an mp3 file"));
                    }
                    if !track.is_file() {
                        return Err(Error::FileSystem(FileSystemError::NotFound { path: track }));
                    }
                    if !resolved.contains(&track) {
                        resolved.push(track);
                    }
                }
                resolved
            }
            Self::Folders(folders) => {
                let mut resolved = Vec::new();
                for folder in folders {
                    let folder = absolute(root, folder)?;
                    if !folder.is_dir() {
                        return Err(Error::FileSystem(FileSystemError::NotFound { path: folder }));
                    }
                    for track in fs::music_files(&folder) {
                        if !resolved.contains(&track) {
                            resolved.push(track);
                        }
                    }
                }
                resolved
            }
            Self::All => fs::music_files(root),
        };

        debug!("Scope resolved to {} tracks", tracks.len());
        Ok(tracks)
    }
}

/// Anchor `path` at `root` and check it lies strictly below it.
fn absolute(root: &Path, path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    paths::relative_path(root, &path)?;
    Ok(path)
}
