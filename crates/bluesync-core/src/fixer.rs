//! Renumbering fixer.
//!
//! The fixer brings a selection of tracks into the shape the head unit
//! expects: every track gets a single ID3v1 tag with sanitised, length
//! limited fields, and (depending on the mode) the files are moved to
//! `{root}/{folder:03}/{track:03}.mp3`.
//!
//! # Modes
//!
//! - [`FixMode::TagsOnly`]: rewrite tags, leave files where they are.
//! - [`FixMode::RenameAll`]: renumber every selected folder and track from 1.
//!   Files are first moved into a staging directory below the root so two
//!   files can swap numbers without overwriting each other, then the staged
//!   folders are merged back into the root.
//! - [`FixMode::RenameNewOnly`]: keep existing numbering. Folders named with
//!   digits keep their number; only tracks that do not yet follow the
//!   layout are processed, and they are numbered after the highest number
//!   already present.
//!
//! Every move is recorded in a [`PathMapping`] that the caller hands to the
//! playlist synchroniser, also when the run was cancelled or failed part way.
//!
//! # Example
//!
//! ```rust,ignore
//! use bluesync_core::fixer::{FixMode, FixOptions, RenumberingFixer};
//!
//! let fixer = RenumberingFixer::new(root, &tracks, &codec, FixOptions::new(FixMode::RenameAll))?;
//! let report = fixer.run(&ctx);
//! println!("{}", report.summary());
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cleanup::{self, CleanupReport};
use crate::context::{OperationContext, Progress};
use crate::error::{Error, FileSystemError, FixerError, Result};
use crate::fs::{self as layout, STAGING_DIR_NAME};
use crate::metadata::{LegacyTag, TagCodec, TrackTags};
use crate::paths::{self, ENTRY_SEPARATOR, MUSIC_EXTENSION, PathMapping};
use crate::sanitize::sanitize;

/// Warning shown when staged files could not all be moved back.
pub const RESTORE_WARNING: &str = "Could not restore all temporarily moved files. Please move remaining files manually from '_blueMeTmp'.";

/// Fallback artist written when a track has none.
pub const UNKNOWN_ARTIST: &str = "Unknown";

// =============================================================================
// Options
// =============================================================================

/// What a run does to the selected tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixMode {
    /// Rewrite tags only.
    TagsOnly,
    /// Rewrite tags and renumber every selected folder and track.
    RenameAll,
    /// Rewrite tags and number only what does not follow the layout yet.
    RenameNewOnly,
}

impl FixMode {
    /// Whether files are moved.
    #[must_use]
    pub const fn renames_files(self) -> bool {
        !matches!(self, Self::TagsOnly)
    }

    /// Whether moves go through the staging directory.
    #[must_use]
    pub const fn uses_staging(self) -> bool {
        matches!(self, Self::RenameAll)
    }

    /// Whether existing numbers are kept.
    #[must_use]
    pub const fn preserves_numbering(self) -> bool {
        matches!(self, Self::RenameNewOnly)
    }
}

impl fmt::Display for FixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TagsOnly => "tags",
            Self::RenameAll => "rename-all",
            Self::RenameNewOnly => "rename-new",
        };
        f.write_str(name)
    }
}

impl FromStr for FixMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tags" | "tags-only" => Ok(Self::TagsOnly),
            "rename-all" => Ok(Self::RenameAll),
            "rename-new" | "rename-new-only" => Ok(Self::RenameNewOnly),
            other => Err(Error::Configuration(format!("unknown fix mode '{other}'"))),
        }
    }
}

/// Maximum lengths of the sanitised tag fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLimits {
    /// Album length.
    pub album: usize,
    /// Artist length.
    pub artist: usize,
    /// Title length.
    pub title: usize,
}

impl Default for TagLimits {
    fn default() -> Self {
        Self {
            album: 14,
            artist: 14,
            title: 30,
        }
    }
}

/// Options for a fixer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOptions {
    /// Run mode.
    pub mode: FixMode,
    /// Tag field limits.
    pub limits: TagLimits,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self::new(FixMode::TagsOnly)
    }
}

impl FixOptions {
    /// Options for `mode` with default limits.
    #[must_use]
    pub fn new(mode: FixMode) -> Self {
        Self {
            mode,
            limits: TagLimits::default(),
        }
    }

    /// Use custom tag limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: TagLimits) -> Self {
        self.limits = limits;
        self
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Result of moving staged folders back into the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Files or folders moved back into the root.
    pub restored: Vec<PathBuf>,
    /// Staged paths that could not be moved back, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Whether the staging directory was removed.
    pub staging_removed: bool,
}

impl RestoreReport {
    /// Check if everything was moved back.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a fixer run.
#[derive(Debug, Default)]
pub struct FixReport {
    /// Moves performed, also when the run stopped early.
    pub mapping: PathMapping,
    /// Number of tracks in the affected set.
    pub affected: usize,
    /// Number of tracks fully processed.
    pub processed: usize,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
    /// The failure that aborted the run, if any.
    pub failure: Option<Error>,
    /// Result of the cleanup pass, if it ran.
    pub cleanup: Option<CleanupReport>,
    /// Result of restoring staged files, if staging was used.
    pub restore: Option<RestoreReport>,
    /// User-facing warnings collected during the run.
    pub warnings: Vec<String>,
}

impl FixReport {
    /// Check if the run processed every affected track without warnings.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.cancelled && self.warnings.is_empty()
    }

    /// Get a summary string of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Processed {} of {} tracks, moved {}",
            self.processed,
            self.affected,
            self.mapping.len()
        );
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        if let Some(failure) = &self.failure {
            summary.push_str(&format!("; {failure}"));
        }
        summary
    }
}

// =============================================================================
// Numbering
// =============================================================================

/// Hands out folder and track numbers for a run.
#[derive(Debug)]
struct Numbering {
    preserve: bool,
    highest_folder: u32,
    highest_track: u32,
}

impl Numbering {
    const fn new(preserve: bool, highest_folder: u32) -> Self {
        Self {
            preserve,
            highest_folder,
            highest_track: 0,
        }
    }

    /// `None` once the numbers run out.
    fn next_folder(&mut self, previous: u32, folder: &Path) -> Option<u32> {
        if !self.preserve {
            return previous.checked_add(1);
        }
        if let Some(number) = layout::numeric_stem(folder) {
            return Some(number);
        }
        self.highest_folder = self.highest_folder.checked_add(1)?;
        Some(self.highest_folder)
    }

    fn start_folder(&mut self, highest_track: u32) {
        self.highest_track = highest_track;
    }

    fn next_track(&mut self, previous: u32) -> Option<u32> {
        if !self.preserve {
            return previous.checked_add(1);
        }
        self.highest_track = self.highest_track.checked_add(1)?;
        Some(self.highest_track)
    }
}

/// Tracks of one album folder that the run processes.
#[derive(Debug, Clone)]
struct FolderPlan {
    path: PathBuf,
    tracks: Vec<PathBuf>,
}

// =============================================================================
// Fixer
// =============================================================================

/// Rewrites tags and renumbers a selection of tracks.
pub struct RenumberingFixer<'a> {
    root: PathBuf,
    codec: &'a dyn TagCodec,
    options: FixOptions,
    plan: Vec<FolderPlan>,
}

impl fmt::Debug for RenumberingFixer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenumberingFixer")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("affected", &self.affected_count())
            .finish_non_exhaustive()
    }
}

impl<'a> RenumberingFixer<'a> {
    /// Plan a run over `tracks`.
    ///
    /// Tracks are grouped by the album folder they live in; folders keep
    /// their order in the root listing, tracks keep their order in
    /// `tracks`. Tracks directly in the root or in the staging directory
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a usable directory or cannot be
    /// listed.
    pub fn new(
        root: &Path,
        tracks: &[PathBuf],
        codec: &'a dyn TagCodec,
        options: FixOptions,
    ) -> Result<Self> {
        layout::ensure_root(root)?;

        let mut plan = Vec::new();
        for folder in layout::music_folders(root)? {
            let in_folder: Vec<PathBuf> = tracks
                .iter()
                .filter(|track| track.starts_with(&folder))
                .filter(|track| !options.mode.preserves_numbering() || needs_numbering(&folder, track))
                .cloned()
                .collect();

            if !in_folder.is_empty() {
                plan.push(FolderPlan {
                    path: folder,
                    tracks: in_folder,
                });
            }
        }

        let fixer = Self {
            root: root.to_path_buf(),
            codec,
            options,
            plan,
        };
        debug!(
            "Planned {} run: {} tracks in {} folders",
            options.mode,
            fixer.affected_count(),
            fixer.plan.len()
        );
        Ok(fixer)
    }

    /// Number of tracks the run will process.
    #[must_use]
    pub fn affected_count(&self) -> usize {
        self.plan.iter().map(|f| f.tracks.len()).sum()
    }

    /// Library root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute the run.
    ///
    /// Cancellation is checked before each track. A failing track aborts
    /// the run. Cleanup only runs after a complete pass; restoring staged
    /// files always runs.
    pub fn run(&self, ctx: &OperationContext) -> FixReport {
        let mut report = FixReport {
            affected: self.affected_count(),
            ..FixReport::default()
        };

        if report.affected == 0 {
            info!("Nothing to fix below {}", self.root.display());
            ctx.idle();
            return report;
        }

        info!(
            "Fixing {} tracks below {} ({})",
            report.affected,
            self.root.display(),
            self.options.mode
        );

        match self.process_all(ctx, &mut report) {
            Ok(()) if report.cancelled => {
                info!("Fix run cancelled after {} tracks", report.processed);
            }
            Ok(()) => {
                ctx.report(Progress::indeterminate("Cleanup folders..."));
                let cleanup = cleanup::cleanup_empty_folders(&self.root);
                if let Some(warning) = cleanup.warning() {
                    ctx.report_error(warning);
                    report.warnings.push(warning.to_string());
                }
                report.cleanup = Some(cleanup);
            }
            Err(e) => {
                error!("{}", e);
                ctx.report_error(&e.to_string());
                report.failure = Some(e);
            }
        }

        if self.options.mode.uses_staging() {
            let restore = self.restore_staged(ctx, &mut report.warnings);
            if !restore.is_success() {
                self.point_at_staged(&mut report.mapping);
            }
            report.restore = Some(restore);
        }

        info!("{}", report.summary());
        ctx.idle();
        report
    }

    fn process_all(&self, ctx: &OperationContext, report: &mut FixReport) -> Result<()> {
        let highest_folder = layout::highest_number(&layout::music_folders(&self.root)?);
        let mut numbering = Numbering::new(self.options.mode.preserves_numbering(), highest_folder);

        let mut folder_number = 0;
        for folder in &self.plan {
            folder_number = numbering
                .next_folder(folder_number, &folder.path)
                .ok_or_else(|| exhausted(&folder.path))?;
            let target_dir = self.target_dir(&folder.path, folder_number);
            numbering.start_folder(layout::highest_number(&layout::top_level_music_files(
                &folder.path,
            )?));

            let mut track_number = 0;
            for track in &folder.tracks {
                if ctx.is_cancelled() {
                    report.cancelled = true;
                    return Ok(());
                }

                ctx.report(Progress::fraction(
                    report.processed,
                    report.affected,
                    format!("Processing {}...", track.display()),
                ));

                track_number = numbering
                    .next_track(track_number)
                    .ok_or_else(|| exhausted(track))?;
                self.process_track(
                    track,
                    &target_dir,
                    folder_number,
                    track_number,
                    &mut report.mapping,
                )
                .map_err(|e| {
                    Error::Fixer(FixerError::TrackFailed {
                        path: track.clone(),
                        reason: e.to_string(),
                    })
                })?;
                report.processed += 1;
            }
        }

        Ok(())
    }

    /// Folder the tracks of `folder` are moved to. Staging runs move into
    /// the staging directory; numbered folders keep their own path when
    /// numbering is preserved.
    fn target_dir(&self, folder: &Path, folder_number: u32) -> PathBuf {
        if self.options.mode.preserves_numbering() && layout::numeric_stem(folder).is_some() {
            return folder.to_path_buf();
        }
        self.entry_base().join(format!("{folder_number:03}"))
    }

    /// Directory new mapping entries are relative to.
    fn entry_base(&self) -> PathBuf {
        if self.options.mode.uses_staging() {
            self.root.join(STAGING_DIR_NAME)
        } else {
            self.root.clone()
        }
    }

    fn process_track(
        &self,
        track: &Path,
        target_dir: &Path,
        folder_number: u32,
        track_number: u32,
        mapping: &mut PathMapping,
    ) -> Result<()> {
        let tags = self.codec.read_tags(track)?;
        let legacy = self.legacy_tag(&tags, track, folder_number, track_number);
        self.codec.write_legacy_tag(track, &legacy)?;

        if !self.options.mode.renames_files() {
            return Ok(());
        }

        let destination = target_dir.join(format!("{track_number:03}.{MUSIC_EXTENSION}"));

        if destination == track {
            return Ok(());
        }
        if destination.exists() {
            return Err(Error::FileSystem(FileSystemError::AlreadyExists {
                path: destination,
            }));
        }

        fs::create_dir_all(target_dir).map_err(|e| layout::create_dir_error(target_dir, e))?;
        let old_entry = paths::relative_path(&self.root, track)?;
        let new_entry = paths::relative_path(&self.entry_base(), &destination)?;
        fs::rename(track, &destination).map_err(|e| layout::move_error(track, &destination, e))?;

        debug!("Moved {} to {}", old_entry, new_entry);
        mapping.insert(old_entry, new_entry);
        Ok(())
    }

    /// Derive the legacy tag written for a track.
    fn legacy_tag(
        &self,
        tags: &TrackTags,
        track: &Path,
        folder_number: u32,
        track_number: u32,
    ) -> LegacyTag {
        let limits = self.options.limits;

        let mut album = sanitize(&tags.album, Some(limits.album));
        if album.is_empty() {
            album = format!("Album {folder_number}");
        }

        let mut artist = sanitize(&tags.artist, Some(limits.artist));
        if artist.is_empty() {
            artist = UNKNOWN_ARTIST.to_string();
        }

        let mut title = sanitize(&tags.title, Some(limits.title));
        if title.is_empty() {
            let stem = track
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            title = sanitize(&stem, Some(limits.title));
        }

        let number = if tags.track_number == 0 {
            track_number
        } else {
            tags.track_number
        };

        let genre = tags.genre.trim();
        LegacyTag {
            title,
            artist: Some(artist),
            album,
            track: u8::try_from(number).ok().filter(|n| *n > 0),
            genre: (!genre.is_empty()).then(|| genre.to_string()),
        }
    }

    /// Merge every staged folder back into the root and remove the staging
    /// directory.
    fn restore_staged(&self, ctx: &OperationContext, warnings: &mut Vec<String>) -> RestoreReport {
        let staging = self.root.join(STAGING_DIR_NAME);
        let mut report = RestoreReport::default();
        if !staging.is_dir() {
            return report;
        }

        ctx.report(Progress::indeterminate("Restore temporarily moved files..."));
        match fs::read_dir(&staging) {
            Ok(entries) => {
                for entry in entries.filter_map(std::result::Result::ok) {
                    let staged = entry.path();
                    if staged.is_dir() {
                        self.restore_folder(&staged, &mut report);
                    } else {
                        report
                            .failed
                            .push((staged, "unexpected file in staging directory".to_string()));
                    }
                }
            }
            Err(e) => report.failed.push((staging.clone(), e.to_string())),
        }

        if report.is_success() {
            match fs::remove_dir_all(&staging) {
                Ok(()) => report.staging_removed = true,
                Err(e) => {
                    let warning = format!("Could not delete '{STAGING_DIR_NAME}' folder: {e}");
                    warn!("{}", warning);
                    ctx.report_error(&warning);
                    warnings.push(warning);
                }
            }
        } else {
            for (path, reason) in &report.failed {
                warn!("Could not restore {}: {}", path.display(), reason);
            }
            ctx.report_error(RESTORE_WARNING);
            warnings.push(RESTORE_WARNING.to_string());
        }

        report
    }

    /// Point every move whose file is still staged at its staged location.
    fn point_at_staged(&self, mapping: &mut PathMapping) {
        let staging = self.root.join(STAGING_DIR_NAME);
        mapping.redirect(|entry| {
            paths::entry_to_path(&staging, entry)
                .is_file()
                .then(|| format!("{STAGING_DIR_NAME}{ENTRY_SEPARATOR}{entry}"))
        });
    }

    fn restore_folder(&self, staged: &Path, report: &mut RestoreReport) {
        let Some(name) = staged.file_name() else {
            return;
        };
        let target = self.root.join(name);

        if !target.exists() {
            match fs::rename(staged, &target) {
                Ok(()) => report.restored.push(target),
                Err(e) => report.failed.push((staged.to_path_buf(), e.to_string())),
            }
            return;
        }

        let entries = match fs::read_dir(staged) {
            Ok(entries) => entries,
            Err(e) => {
                report.failed.push((staged.to_path_buf(), e.to_string()));
                return;
            }
        };
        for entry in entries.filter_map(std::result::Result::ok) {
            let source = entry.path();
            let destination = target.join(entry.file_name());
            if destination.exists() {
                report
                    .failed
                    .push((source, format!("{} already exists", destination.display())));
                continue;
            }
            match fs::rename(&source, &destination) {
                Ok(()) => report.restored.push(destination),
                Err(e) => report.failed.push((source, e.to_string())),
            }
        }
    }
}

fn exhausted(path: &Path) -> Error {
    Error::Fixer(FixerError::NumberingExhausted {
        path: path.to_path_buf(),
    })
}

/// In preserve mode, whether a track still has to be numbered: it is not
/// directly inside its folder, or its name is not all digits. Tracks of a
/// folder that is not numbered always need numbering.
fn needs_numbering(folder: &Path, track: &Path) -> bool {
    if layout::numeric_stem(folder).is_none() {
        return true;
    }
    track.parent() != Some(folder) || !layout::has_numeric_stem(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TagError;
    use crate::metadata::MockTagCodec;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create dir");
        }
        fs::write(path, path.to_string_lossy().as_bytes()).expect("Failed to write file");
    }

    fn permissive_codec() -> MockTagCodec {
        let mut codec = MockTagCodec::new();
        codec
            .expect_read_tags()
            .returning(|_| Ok(TrackTags::default()));
        codec.expect_write_legacy_tag().returning(|_, _| Ok(()));
        codec
    }

    #[test]
    fn test_fix_mode_parsing_and_display() {
        assert_eq!("tags".parse::<FixMode>().expect("valid"), FixMode::TagsOnly);
        assert_eq!("rename-all".parse::<FixMode>().expect("valid"), FixMode::RenameAll);
        assert_eq!("rename-new".parse::<FixMode>().expect("valid"), FixMode::RenameNewOnly);
        assert!("shuffle".parse::<FixMode>().is_err());
        assert_eq!(FixMode::RenameNewOnly.to_string(), "rename-new");
        assert!(FixMode::RenameAll.uses_staging());
        assert!(!FixMode::TagsOnly.renames_files());
    }

    #[test]
    fn test_legacy_tag_fallbacks() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(dir.path(), &[], &codec, FixOptions::default())
            .expect("fixer should build");

        let tag = fixer.legacy_tag(
            &TrackTags::default(),
            Path::new("/x/FolderA/My Song_(live).mp3"),
            3,
            7,
        );
        assert_eq!(tag.album, "Album 3");
        assert_eq!(tag.artist.as_deref(), Some(UNKNOWN_ARTIST));
        assert_eq!(tag.title, "My Song live");
        assert_eq!(tag.track, Some(7));
        assert_eq!(tag.genre, None);
    }

    #[test]
    fn test_legacy_tag_sanitises_and_truncates() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(dir.path(), &[], &codec, FixOptions::default())
            .expect("fixer should build");

        let tags = TrackTags {
            album: "Die Ärzte: Das Beste von kurz nach früher".to_string(),
            artist: "Die Ärzte & Freunde".to_string(),
            title: "Schrei nach Liebe".to_string(),
            track_number: 12,
            genre: "Punk".to_string(),
        };
        let tag = fixer.legacy_tag(&tags, Path::new("/x/a.mp3"), 1, 1);
        assert_eq!(tag.album, "Die Aerzte: Da");
        assert_eq!(tag.artist.as_deref(), Some("Die Aerzte and"));
        assert_eq!(tag.title, "Schrei nach Liebe");
        assert_eq!(tag.track, Some(12));
        assert_eq!(tag.genre.as_deref(), Some("Punk"));
    }

    #[test]
    fn test_tags_only_leaves_files_in_place() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let track = root.join("FolderA").join("song.mp3");
        touch(&track);

        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(root, &[track.clone()], &codec, FixOptions::default())
            .expect("fixer should build");
        let report = fixer.run(&OperationContext::new());

        assert!(report.is_success(), "{}", report.summary());
        assert_eq!(report.processed, 1);
        assert!(report.mapping.is_empty());
        assert!(track.exists());
        assert!(report.restore.is_none());
    }

    #[test]
    fn test_rename_all_swaps_without_overwriting() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let first = root.join("001").join("002.mp3");
        let second = root.join("001").join("001.mp3");
        touch(&first);
        touch(&second);

        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(
            root,
            &[first.clone(), second.clone()],
            &codec,
            FixOptions::new(FixMode::RenameAll),
        )
        .expect("fixer should build");
        let report = fixer.run(&OperationContext::new());

        assert!(report.is_success(), "{}", report.summary());
        assert_eq!(report.mapping.get("001\\002.mp3"), Some("001\\001.mp3"));
        assert_eq!(report.mapping.get("001\\001.mp3"), Some("001\\002.mp3"));
        let swapped = fs::read_to_string(root.join("001").join("001.mp3")).expect("read");
        assert_eq!(swapped, first.to_string_lossy());
        assert!(!root.join(STAGING_DIR_NAME).exists());
    }

    #[test]
    fn test_rename_new_only_appends_after_highest() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let kept = root.join("004").join("001.mp3");
        let added = root.join("004").join("bonus.mp3");
        let other_kept = root.join("002").join("001.mp3");
        let new_album = root.join("New Album").join("intro.mp3");
        touch(&kept);
        touch(&root.join("004").join("003.mp3"));
        touch(&added);
        touch(&other_kept);
        touch(&new_album);

        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(
            root,
            &[kept.clone(), added.clone(), other_kept.clone(), new_album.clone()],
            &codec,
            FixOptions::new(FixMode::RenameNewOnly),
        )
        .expect("fixer should build");
        assert_eq!(fixer.affected_count(), 2);

        let report = fixer.run(&OperationContext::new());
        assert!(report.is_success(), "{}", report.summary());
        assert_eq!(report.mapping.get("004\\bonus.mp3"), Some("004\\004.mp3"));
        assert_eq!(report.mapping.get("New Album\\intro.mp3"), Some("005\\001.mp3"));
        assert!(kept.exists());
        assert!(other_kept.exists());
        assert!(!root.join("New Album").exists());
    }

    #[test]
    fn test_failure_aborts_run_and_restores_staging() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let a = root.join("FolderA").join("a.mp3");
        let b = root.join("FolderA").join("b.mp3");
        let c = root.join("FolderA").join("c.mp3");
        touch(&a);
        touch(&b);
        touch(&c);

        let mut codec = MockTagCodec::new();
        codec
            .expect_read_tags()
            .returning(|_| Ok(TrackTags::default()));
        codec.expect_write_legacy_tag().returning(|path, _| {
            if path.ends_with("b.mp3") {
                Err(Error::Tag(TagError::WriteFailed {
                    path: path.to_path_buf(),
                    reason: "locked".to_string(),
                }))
            } else {
                Ok(())
            }
        });

        let fixer = RenumberingFixer::new(
            root,
            &[a.clone(), b.clone(), c.clone()],
            &codec,
            FixOptions::new(FixMode::RenameAll),
        )
        .expect("fixer should build");
        let report = fixer.run(&OperationContext::new());

        assert_eq!(report.processed, 1);
        match &report.failure {
            Some(Error::Fixer(FixerError::TrackFailed { path, .. })) => assert_eq!(path, &b),
            other => panic!("unexpected failure: {other:?}"),
        }
        assert_eq!(report.mapping.get("FolderA\\a.mp3"), Some("001\\001.mp3"));
        assert!(root.join("001").join("001.mp3").exists());
        assert!(b.exists());
        assert!(c.exists());
        assert!(!root.join(STAGING_DIR_NAME).exists());
        assert!(report.cleanup.is_none());
        assert!(report.restore.as_ref().is_some_and(RestoreReport::is_success));
    }

    #[test]
    fn test_cancel_returns_partial_mapping_and_restores() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let a = root.join("FolderA").join("a.mp3");
        let b = root.join("FolderA").join("b.mp3");
        touch(&a);
        touch(&b);

        let ctx = OperationContext::new();
        let cancel_ctx = ctx.clone();
        let mut codec = MockTagCodec::new();
        codec
            .expect_read_tags()
            .returning(|_| Ok(TrackTags::default()));
        codec.expect_write_legacy_tag().returning(move |_, _| {
            cancel_ctx.cancel();
            Ok(())
        });

        let fixer = RenumberingFixer::new(
            root,
            &[a.clone(), b.clone()],
            &codec,
            FixOptions::new(FixMode::RenameAll),
        )
        .expect("fixer should build");
        let report = fixer.run(&ctx);

        assert!(report.cancelled);
        assert_eq!(report.processed, 1);
        assert_eq!(report.mapping.len(), 1);
        assert!(root.join("001").join("001.mp3").exists());
        assert!(b.exists());
        assert!(!root.join(STAGING_DIR_NAME).exists());
    }

    #[test]
    fn test_restore_merges_into_existing_folder() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let untouched = root.join("001").join("005.mp3");
        let selected = root.join("Extra").join("x.mp3");
        touch(&untouched);
        touch(&selected);

        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(
            root,
            &[selected.clone()],
            &codec,
            FixOptions::new(FixMode::RenameAll),
        )
        .expect("fixer should build");
        let report = fixer.run(&OperationContext::new());

        assert!(report.is_success(), "{}", report.summary());
        assert!(untouched.exists());
        assert!(root.join("001").join("001.mp3").exists());
        assert!(!root.join(STAGING_DIR_NAME).exists());
    }

    #[test]
    fn test_restore_conflict_keeps_staging_and_warns() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let blocker = root.join("001").join("001.mp3");
        let selected = root.join("Extra").join("x.mp3");
        touch(&blocker);
        touch(&selected);

        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(
            root,
            &[selected.clone()],
            &codec,
            FixOptions::new(FixMode::RenameAll),
        )
        .expect("fixer should build");
        let report = fixer.run(&OperationContext::new());

        assert!(report.failure.is_none());
        assert_eq!(report.warnings, [RESTORE_WARNING]);
        assert!(blocker.exists());
        assert!(root.join(STAGING_DIR_NAME).join("001").join("001.mp3").exists());
        assert_eq!(
            report.mapping.get("Extra\\x.mp3"),
            Some("_blueMeTmp\\001\\001.mp3")
        );
    }

    #[test]
    fn test_rename_new_only_numbers_inside_short_numbered_folder() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let kept = root.join("4").join("001.mp3");
        let added = root.join("4").join("new.mp3");
        touch(&kept);
        touch(&added);

        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(
            root,
            &[kept.clone(), added.clone()],
            &codec,
            FixOptions::new(FixMode::RenameNewOnly),
        )
        .expect("fixer should build");
        let report = fixer.run(&OperationContext::new());

        assert!(report.is_success(), "{}", report.summary());
        assert_eq!(report.mapping.get("4\\new.mp3"), Some("4\\002.mp3"));
        assert!(root.join("4").join("002.mp3").exists());
        assert!(!root.join("004").exists());
    }

    #[test]
    fn test_numbering_stops_at_the_last_number() {
        let mut numbering = Numbering::new(true, u32::MAX);
        assert_eq!(numbering.next_folder(0, Path::new("Fresh")), None);
        assert_eq!(numbering.next_folder(0, Path::new("7")), Some(7));

        numbering.start_folder(u32::MAX);
        assert_eq!(numbering.next_track(0), None);

        let mut renumbering = Numbering::new(false, 0);
        assert_eq!(renumbering.next_track(u32::MAX), None);
        assert_eq!(renumbering.next_track(1), Some(2));
    }

    #[test]
    fn test_exhausted_folder_numbers_abort_run() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let fresh = root.join("Fresh").join("a.mp3");
        touch(&root.join("4294967295").join("001.mp3"));
        touch(&fresh);

        let codec = permissive_codec();
        let fixer = RenumberingFixer::new(
            root,
            &[fresh.clone()],
            &codec,
            FixOptions::new(FixMode::RenameNewOnly),
        )
        .expect("fixer should build");
        let report = fixer.run(&OperationContext::new());

        match &report.failure {
            Some(Error::Fixer(FixerError::NumberingExhausted { path })) => {
                assert_eq!(path, &root.join("Fresh"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(fresh.exists());
        assert!(report.mapping.is_empty());
    }

    #[test]
    fn test_nothing_selected_is_a_no_op() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        touch(&root.join("001").join("001.mp3"));

        let codec = MockTagCodec::new();
        let fixer = RenumberingFixer::new(
            root,
            &[root.join("001").join("001.mp3")],
            &codec,
            FixOptions::new(FixMode::RenameNewOnly),
        )
        .expect("fixer should build");

        assert_eq!(fixer.affected_count(), 0);
        let report = fixer.run(&OperationContext::new());
        assert!(report.mapping.is_empty());
        assert_eq!(report.processed, 0);
    }
}
