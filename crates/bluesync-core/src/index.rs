//! In-memory snapshot of a library root.
//!
//! The index holds every album folder (with its tracks and their cached
//! tags) and every playlist (with its parsed entries). It is built by one
//! scan and considered stale after any mutation. After a mutation a fresh
//! scan is merged into the existing index with [`LibraryIndex::reconcile`],
//! which keeps the ids of entities that survived so selections keyed on
//! those ids stay valid.
//!
//! Entities refer to each other through ids; the index owns all of them.
//!
//! # Example
//!
//! ```rust,ignore
//! use bluesync_core::index::LibraryIndex;
//!
//! let index = LibraryIndex::build(root, &codec, false, &ctx)?;
//! for folder in index.folders() {
//!     println!("{} ({} tracks)", folder.name, folder.tracks.len());
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::{OperationContext, Progress};
use crate::error::Result;
use crate::fs;
use crate::metadata::{TagCodec, TrackTags};
use crate::paths;
use crate::playlist::{self, PlaylistEntries};

/// Identifier of a music folder within its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderId(u64);

/// Identifier of a track within its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(u64);

/// Identifier of a playlist within its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaylistId(u64);

/// A music file and its cached tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Stable id.
    pub id: TrackId,
    /// Owning folder.
    pub folder: FolderId,
    /// Absolute path.
    pub path: PathBuf,
    /// Canonical entry relative to the root, as used in playlists.
    pub entry: String,
    /// Tags read at scan time.
    pub tags: TrackTags,
}

/// An album folder directly below the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicFolder {
    /// Stable id.
    pub id: FolderId,
    /// Absolute path.
    pub path: PathBuf,
    /// Folder name.
    pub name: String,
    /// Music files at any depth below the folder.
    pub tracks: Vec<Track>,
}

/// A playlist file at the top of the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    /// Stable id.
    pub id: PlaylistId,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Display name.
    pub name: String,
    /// Entries that resolve to existing files.
    pub entries: PlaylistEntries,
    /// Entries in the file that were not kept.
    pub dropped: Vec<String>,
}

impl Playlist {
    /// Whether the in-memory entries differ from the file.
    #[must_use]
    pub fn is_pruned(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// How much of a folder (or a track) a playlist contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Containment {
    /// No track is listed.
    NotContained,
    /// Some but not all tracks are listed.
    PartiallyContained,
    /// Every track is listed.
    CompletelyContained,
}

/// Snapshot of folders, tracks and playlists below a root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIndex {
    root: PathBuf,
    folders: Vec<MusicFolder>,
    playlists: Vec<Playlist>,
    error_count: usize,
    cancelled: bool,
    next_id: u64,
}

impl LibraryIndex {
    /// Create an empty index for `root`.
    #[must_use]
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            folders: Vec::new(),
            playlists: Vec::new(),
            error_count: 0,
            cancelled: false,
            next_id: 1,
        }
    }

    /// Scan `root`.
    ///
    /// Tracks whose tags cannot be read are skipped and counted; a single
    /// aggregated warning is reported when any were skipped. Cancellation
    /// is checked per file and leaves a partial index marked as cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a usable directory, cannot be
    /// listed, or a playlist fails to parse.
    pub fn build(
        root: &Path,
        codec: &dyn TagCodec,
        skip_missing: bool,
        ctx: &OperationContext,
    ) -> Result<Self> {
        let result = Self::scan(root, codec, skip_missing, ctx);
        ctx.idle();
        result
    }

    fn scan(
        root: &Path,
        codec: &dyn TagCodec,
        skip_missing: bool,
        ctx: &OperationContext,
    ) -> Result<Self> {
        fs::ensure_root(root)?;
        info!("Building index of {}", root.display());

        let mut index = Self::empty(root);
        ctx.report(Progress::indeterminate("Reading music files..."));

        'folders: for folder_path in fs::music_folders(root)? {
            let folder_id = FolderId(index.allocate());
            let mut folder = MusicFolder {
                id: folder_id,
                name: folder_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                tracks: Vec::new(),
                path: folder_path,
            };

            for track_path in fs::music_files(&folder.path) {
                if ctx.is_cancelled() {
                    index.cancelled = true;
                    index.folders.push(folder);
                    break 'folders;
                }

                match codec.read_tags(&track_path) {
                    Ok(tags) => {
                        let entry = paths::relative_path(root, &track_path)?;
                        folder.tracks.push(Track {
                            id: TrackId(index.allocate()),
                            folder: folder_id,
                            path: track_path,
                            entry,
                            tags,
                        });
                    }
                    Err(e) => {
                        warn!("Skipping {}: {}", track_path.display(), e);
                        index.error_count += 1;
                    }
                }
            }

            index.folders.push(folder);
        }

        if index.cancelled {
            info!("Index build cancelled, result is partial");
            return Ok(index);
        }

        ctx.report(Progress::indeterminate("Reading playlists..."));
        for playlist_path in fs::playlist_files(root)? {
            let parsed = playlist::read_playlist(root, &playlist_path, skip_missing)?;
            let id = PlaylistId(index.allocate());
            index.playlists.push(Playlist {
                id,
                name: playlist::display_name(&playlist_path),
                path: playlist_path,
                entries: parsed.entries,
                dropped: parsed.dropped,
            });
        }

        if let Some(warning) = index.error_warning() {
            warn!("{}", warning);
            ctx.report_error(&warning);
        }

        info!(
            "Indexed {} folders, {} tracks, {} playlists",
            index.folders.len(),
            index.track_count(),
            index.playlists.len()
        );
        Ok(index)
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Library root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Album folders in scan order.
    #[must_use]
    pub fn folders(&self) -> &[MusicFolder] {
        &self.folders
    }

    /// Playlists in scan order.
    #[must_use]
    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    /// Number of tracks skipped because their tags could not be read.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.error_count
    }

    /// Whether the scan was cancelled. A cancelled index must be rebuilt
    /// before it is trusted.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Aggregated warning about skipped files, if any.
    #[must_use]
    pub fn error_warning(&self) -> Option<String> {
        (self.error_count > 0).then(|| {
            format!(
                "{} errors occurred, some files skipped, you may not be able to proceed",
                self.error_count
            )
        })
    }

    /// Iterate over all tracks in folder order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.folders.iter().flat_map(|f| f.tracks.iter())
    }

    /// Total number of tracks.
    #[must_use]
    pub fn track_count(&self) -> usize {
        self.folders.iter().map(|f| f.tracks.len()).sum()
    }

    /// Look up a folder.
    #[must_use]
    pub fn folder(&self, id: FolderId) -> Option<&MusicFolder> {
        self.folders.iter().find(|f| f.id == id)
    }

    /// Look up a track.
    #[must_use]
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks().find(|t| t.id == id)
    }

    /// Look up a playlist.
    #[must_use]
    pub fn playlist(&self, id: PlaylistId) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    /// Find a folder by path.
    #[must_use]
    pub fn find_folder(&self, path: &Path) -> Option<&MusicFolder> {
        self.folders.iter().find(|f| f.path == path)
    }

    /// Find a track by path.
    #[must_use]
    pub fn find_track(&self, path: &Path) -> Option<&Track> {
        self.tracks().find(|t| t.path == path)
    }

    /// Find a playlist by display name.
    #[must_use]
    pub fn find_playlist(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.name == name)
    }

    /// Tracks listed in a playlist, in playlist order.
    #[must_use]
    pub fn playlist_tracks(&self, id: PlaylistId) -> Vec<&Track> {
        let Some(playlist) = self.playlist(id) else {
            return Vec::new();
        };
        let by_entry: HashMap<&str, &Track> =
            self.tracks().map(|t| (t.entry.as_str(), t)).collect();
        playlist
            .entries
            .iter()
            .filter_map(|entry| by_entry.get(entry).copied())
            .collect()
    }

    /// Whether a playlist lists a track.
    #[must_use]
    pub fn track_containment(&self, track: TrackId, playlist: PlaylistId) -> Containment {
        match (self.track(track), self.playlist(playlist)) {
            (Some(t), Some(p)) if p.entries.contains(&t.entry) => Containment::CompletelyContained,
            _ => Containment::NotContained,
        }
    }

    /// How many of a folder's tracks a playlist lists.
    #[must_use]
    pub fn folder_containment(&self, folder: FolderId, playlist: PlaylistId) -> Containment {
        let (Some(folder), Some(playlist)) = (self.folder(folder), self.playlist(playlist)) else {
            return Containment::NotContained;
        };

        let listed = folder
            .tracks
            .iter()
            .filter(|t| playlist.entries.contains(&t.entry))
            .count();
        if listed == 0 {
            Containment::NotContained
        } else if listed == folder.tracks.len() {
            Containment::CompletelyContained
        } else {
            Containment::PartiallyContained
        }
    }

    /// Merge a fresh scan into this index.
    ///
    /// Folders, tracks and playlists are matched by path. Survivors keep
    /// their ids and take the fresh data; vanished entities are dropped;
    /// new ones get new ids and appear at their scan position.
    pub fn reconcile(&mut self, fresh: Self) {
        debug!("Reconciling index of {}", self.root.display());

        let old_folders: HashMap<PathBuf, FolderId> =
            self.folders.iter().map(|f| (f.path.clone(), f.id)).collect();
        let old_tracks: HashMap<PathBuf, TrackId> =
            self.tracks().map(|t| (t.path.clone(), t.id)).collect();
        let old_playlists: HashMap<PathBuf, PlaylistId> =
            self.playlists.iter().map(|p| (p.path.clone(), p.id)).collect();

        let mut folders = Vec::with_capacity(fresh.folders.len());
        for mut folder in fresh.folders {
            folder.id = match old_folders.get(&folder.path) {
                Some(id) => *id,
                None => FolderId(self.allocate()),
            };
            for track in &mut folder.tracks {
                track.folder = folder.id;
                track.id = match old_tracks.get(&track.path) {
                    Some(id) => *id,
                    None => TrackId(self.allocate()),
                };
            }
            folders.push(folder);
        }

        let mut playlists = Vec::with_capacity(fresh.playlists.len());
        for mut playlist in fresh.playlists {
            playlist.id = match old_playlists.get(&playlist.path) {
                Some(id) => *id,
                None => PlaylistId(self.allocate()),
            };
            playlists.push(playlist);
        }

        self.root = fresh.root;
        self.folders = folders;
        self.playlists = playlists;
        self.error_count = fresh.error_count;
        self.cancelled = fresh.cancelled;
    }
}
