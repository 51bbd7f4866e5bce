//! Library manager.
//!
//! Owns the index of one library root and runs every mutating operation
//! against it: fixing tags and numbering, deleting tracks, and playlist
//! edits. After each mutation the playlists are brought in line with the
//! new file locations and the index is rebuilt and reconciled so ids of
//! surviving folders, tracks and playlists stay stable.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bluesync_core::{FixMode, Id3TagCodec, LibraryManager, OperationContext, Scope};
//!
//! let ctx = OperationContext::new();
//! let mut library = LibraryManager::open(root, Arc::new(Id3TagCodec), Default::default(), &ctx)?;
//! let outcome = library.fix(&Scope::All, FixMode::RenameAll, &ctx)?;
//! println!("{}", outcome.fix.summary());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cleanup::{self, CleanupReport, DeleteReport};
use crate::config::{self, AppConfig};
use crate::context::{CancellationToken, OperationContext};
use crate::error::{Error, PlaylistError, Result};
use crate::fixer::{FixMode, FixOptions, FixReport, RenumberingFixer};
use crate::index::{LibraryIndex, Playlist};
use crate::metadata::TagCodec;
use crate::playlist::{self, PlaylistSynchronizer, SyncReport};
use crate::scope::Scope;

/// Result of a fix run including playlist synchronisation.
#[derive(Debug)]
pub struct FixOutcome {
    /// The fixer report.
    pub fix: FixReport,
    /// Playlist updates for the moves the run made.
    pub playlists: SyncReport,
}

/// Result of a delete run including playlist synchronisation.
#[derive(Debug)]
pub struct DeleteOutcome {
    /// The delete report.
    pub delete: DeleteReport,
    /// Playlist updates for the deleted tracks.
    pub playlists: SyncReport,
}

/// Manages one library root.
pub struct LibraryManager {
    codec: Arc<dyn TagCodec>,
    config: AppConfig,
    index: LibraryIndex,
}

impl std::fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManager")
            .field("root", &self.index.root())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LibraryManager {
    /// Open a library root and build its index.
    ///
    /// Playlists that lost entries while parsing are written back.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a usable directory or the index
    /// cannot be built.
    pub fn open(
        root: &Path,
        codec: Arc<dyn TagCodec>,
        config: AppConfig,
        ctx: &OperationContext,
    ) -> Result<Self> {
        let root = config::validate_root(root)?;
        info!("Opening library at {}", root.display());

        let index = LibraryIndex::build(&root, codec.as_ref(), config.skip_missing_entries, ctx)?;
        let manager = Self {
            codec,
            config,
            index,
        };
        manager.persist_pruned_playlists();
        Ok(manager)
    }

    /// Library root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.index.root()
    }

    /// Current index.
    #[must_use]
    pub const fn index(&self) -> &LibraryIndex {
        &self.index
    }

    /// Configuration the manager runs with.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Rescan the root and merge the result into the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be scanned.
    pub fn refresh(&mut self, ctx: &OperationContext) -> Result<()> {
        let fresh = LibraryIndex::build(
            self.index.root(),
            self.codec.as_ref(),
            self.config.skip_missing_entries,
            ctx,
        )?;
        self.index.reconcile(fresh);
        self.persist_pruned_playlists();
        Ok(())
    }

    /// Rescan after a mutation. A cancelled run still leaves a complete index.
    fn refresh_after_mutation(&mut self, ctx: &OperationContext) -> Result<()> {
        if ctx.is_cancelled() {
            let rescan = ctx.clone().with_token(CancellationToken::new());
            self.refresh(&rescan)
        } else {
            self.refresh(ctx)
        }
    }

    fn persist_pruned_playlists(&self) {
        for playlist in self.index.playlists().iter().filter(|p| p.is_pruned()) {
            match playlist::save(&playlist.path, &playlist.entries) {
                Ok(()) => info!(
                    "Removed {} stale entries from playlist '{}'",
                    playlist.dropped.len(),
                    playlist.name
                ),
                Err(e) => warn!("Could not save playlist '{}': {}", playlist.name, e),
            }
        }
    }

    fn playlist_views(&self) -> impl Iterator<Item = (&Path, &playlist::PlaylistEntries)> {
        self.index
            .playlists()
            .iter()
            .map(|p| (p.path.as_path(), &p.entries))
    }

    // =========================================================================
    // Track operations
    // =========================================================================

    /// Fix tags (and numbering, depending on `mode`) of the tracks in
    /// `scope`, then update every playlist and refresh the index.
    ///
    /// Playlists are updated with every move made, also when the run was
    /// cancelled or failed part way.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope cannot be resolved or the index cannot
    /// be refreshed. Failures of the run itself are part of the report.
    pub fn fix(&mut self, scope: &Scope, mode: FixMode, ctx: &OperationContext) -> Result<FixOutcome> {
        let tracks = scope.resolve(self.root())?;
        let options = FixOptions::new(mode).with_limits(self.config.tag_limits);
        let fixer = RenumberingFixer::new(self.root(), &tracks, self.codec.as_ref(), options)?;
        let report = fixer.run(ctx);

        let playlists = PlaylistSynchronizer::for_mapping(&report.mapping).sync_all(self.playlist_views());
        if !playlists.is_success() {
            ctx.report_error(&playlists.summary());
        }

        self.refresh_after_mutation(ctx)?;
        Ok(FixOutcome {
            fix: report,
            playlists,
        })
    }

    /// Delete the tracks in `scope`, drop them from every playlist and
    /// refresh the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope cannot be resolved or the index cannot
    /// be refreshed.
    pub fn delete(&mut self, scope: &Scope, ctx: &OperationContext) -> Result<DeleteOutcome> {
        let tracks = scope.resolve(self.root())?;
        let report = cleanup::delete_tracks(self.root(), &tracks, ctx);

        let playlists = PlaylistSynchronizer::for_removed(&report.deleted).sync_all(self.playlist_views());
        if !playlists.is_success() {
            ctx.report_error(&playlists.summary());
        }

        self.refresh_after_mutation(ctx)?;
        Ok(DeleteOutcome {
            delete: report,
            playlists,
        })
    }

    /// Remove folders without music below the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be refreshed.
    pub fn cleanup(&mut self, ctx: &OperationContext) -> Result<CleanupReport> {
        let report = cleanup::cleanup_empty_folders(self.root());
        if let Some(warning) = report.warning() {
            ctx.report_error(warning);
        }
        self.refresh(ctx)?;
        Ok(report)
    }

    // =========================================================================
    // Playlist operations
    // =========================================================================

    fn require_playlist(&self, name: &str) -> Result<&Playlist> {
        self.index.find_playlist(name).ok_or_else(|| {
            Error::Playlist(PlaylistError::NotFound {
                name: name.to_string(),
            })
        })
    }

    /// Create an empty playlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the playlist exists.
    pub fn create_playlist(&mut self, name: &str, ctx: &OperationContext) -> Result<PathBuf> {
        let path = playlist::create(self.root(), name)?;
        self.refresh(ctx)?;
        Ok(path)
    }

    /// Rename a playlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist does not exist or cannot be renamed.
    pub fn rename_playlist(
        &mut self,
        name: &str,
        new_name: &str,
        ctx: &OperationContext,
    ) -> Result<PathBuf> {
        let path = self.require_playlist(name)?.path.clone();
        let renamed = playlist::rename(&path, new_name)?;
        self.refresh(ctx)?;
        Ok(renamed)
    }

    /// Delete a playlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist does not exist or cannot be deleted.
    pub fn delete_playlist(&mut self, name: &str, ctx: &OperationContext) -> Result<()> {
        let path = self.require_playlist(name)?.path.clone();
        playlist::delete(&path)?;
        self.refresh(ctx)
    }

    /// Add the tracks in `scope` to a playlist. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist does not exist, the scope cannot be
    /// resolved or the playlist cannot be saved.
    pub fn add_to_playlist(
        &mut self,
        name: &str,
        scope: &Scope,
        ctx: &OperationContext,
    ) -> Result<usize> {
        let path = self.require_playlist(name)?.path.clone();
        let tracks = scope.resolve(self.root())?;
        let added = playlist::add_tracks(
            self.root(),
            &path,
            &tracks,
            self.config.skip_missing_entries,
        )?;
        self.refresh(ctx)?;
        Ok(added)
    }

    /// Remove the tracks in `scope` from a playlist. Returns how many were
    /// listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist does not exist, the scope cannot be
    /// resolved or the playlist cannot be saved.
    pub fn remove_from_playlist(
        &mut self,
        name: &str,
        scope: &Scope,
        ctx: &OperationContext,
    ) -> Result<usize> {
        let path = self.require_playlist(name)?.path.clone();
        let tracks = scope.resolve(self.root())?;
        let removed = playlist::remove_tracks(
            self.root(),
            &path,
            &tracks,
            self.config.skip_missing_entries,
        )?;
        self.refresh(ctx)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Containment;
    use crate::metadata::{MockTagCodec, TrackTags};
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create dir");
        }
        fs::write(path, b"audio").expect("Failed to write file");
    }

    fn codec() -> Arc<dyn TagCodec> {
        let mut codec = MockTagCodec::new();
        codec
            .expect_read_tags()
            .returning(|_| Ok(TrackTags::default()));
        codec.expect_write_legacy_tag().returning(|_, _| Ok(()));
        Arc::new(codec)
    }

    fn open(root: &Path) -> LibraryManager {
        LibraryManager::open(root, codec(), AppConfig::default(), &OperationContext::new())
            .expect("library should open")
    }

    #[test]
    fn test_playlist_lifecycle_keeps_ids() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        touch(&dir.path().join("001").join("001.mp3"));
        touch(&dir.path().join("001").join("002.mp3"));
        let ctx = OperationContext::new();
        let mut library = open(dir.path());
        let root = library.root().to_path_buf();

        library.create_playlist("Road Trip", &ctx).expect("create");
        let id = library.index().find_playlist("Road Trip").expect("listed").id;
        let folder = library.index().folders()[0].id;

        let added = library
            .add_to_playlist(
                "Road Trip",
                &Scope::Tracks(vec![root.join("001").join("001.mp3")]),
                &ctx,
            )
            .expect("add");
        assert_eq!(added, 1);
        assert_eq!(library.index().find_playlist("Road Trip").expect("listed").id, id);
        assert_eq!(
            library.index().folder_containment(folder, id),
            Containment::PartiallyContained
        );

        library.rename_playlist("Road Trip", "Commute", &ctx).expect("rename");
        let renamed = library.index().find_playlist("Commute").expect("listed");
        assert_eq!(renamed.entries.as_slice(), ["001\\001.mp3"]);

        library.delete_playlist("Commute", &ctx).expect("delete");
        assert!(library.index().playlists().is_empty());
        assert!(library.delete_playlist("Commute", &ctx).is_err());
    }

    #[test]
    fn test_delete_drops_entries_from_playlists() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        touch(&dir.path().join("001").join("001.mp3"));
        touch(&dir.path().join("002").join("001.mp3"));
        fs::write(
            dir.path().join("Mix            .m3u"),
            "001\\001.mp3\n002\\001.mp3\n",
        )
        .expect("Failed to write playlist");

        let ctx = OperationContext::new();
        let mut library = open(dir.path());
        let root = library.root().to_path_buf();

        let outcome = library
            .delete(&Scope::Folders(vec![root.join("001")]), &ctx)
            .expect("delete");
        assert!(outcome.delete.is_success());
        assert_eq!(outcome.playlists.updated_count(), 1);

        let mix = library.index().find_playlist("Mix").expect("listed");
        assert_eq!(mix.entries.as_slice(), ["002\\001.mp3"]);
        assert!(!root.join("001").exists());
        assert_eq!(library.index().folders().len(), 1);
    }

    #[test]
    fn test_open_persists_pruned_playlists() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        touch(&dir.path().join("001").join("001.mp3"));
        let playlist = dir.path().join("Old            .m3u");
        fs::write(&playlist, "001\\001.mp3\n001\\009.mp3\n").expect("Failed to write playlist");

        let config = AppConfig {
            skip_missing_entries: true,
            ..AppConfig::default()
        };
        let library = LibraryManager::open(dir.path(), codec(), config, &OperationContext::new())
            .expect("library should open");

        assert_eq!(library.index().playlists().len(), 1);
        let content = fs::read_to_string(&playlist).expect("Failed to read playlist");
        assert_eq!(content, "001\\001.mp3\n");
    }

    #[test]
    fn test_open_rejects_missing_root() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = LibraryManager::open(
            &dir.path().join("missing"),
            codec(),
            AppConfig::default(),
            &OperationContext::new(),
        );
        assert!(result.is_err());
    }
}
