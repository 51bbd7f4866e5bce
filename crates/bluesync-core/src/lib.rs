//! `Bluesync` Core Library
//!
//! This crate provides the core functionality for keeping an MP3 library on
//! a USB stick compatible with Blue&Me car head units:
//! - Name sanitising to the limited character set the head unit displays
//! - Tag rewriting to a single ID3v1 tag with length-limited fields
//! - Folder and track renumbering to the `001/001.mp3` layout
//! - Playlist parsing, management and synchronisation after moves and deletes
//! - Removal of folders left without music
//! - A library index with stable ids and containment queries
//! - Application configuration management
//!
//! Long-running operations take an [`OperationContext`] carrying the
//! cancellation token and the progress sink. [`spawn_operation`] runs one on
//! the blocking pool.
//!
//! # Error Handling
//!
//! This crate uses a typed error framework with one error enum per domain.
//! See the [`error`] module for details.
//!
//! ```rust,ignore
//! use bluesync_core::{Error, Result};
//!
//! fn do_something() -> Result<()> {
//!     // Your code here
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod config;
pub mod context;
pub mod error;
pub mod fixer;
pub mod fs;
pub mod index;
pub mod library;
pub mod metadata;
pub mod paths;
pub mod playlist;
pub mod sanitize;
pub mod scope;
pub mod task;

pub use cleanup::{
    CLEANUP_WARNING, CleanupReport, DeleteReport, cleanup_empty_folders, delete_tracks,
};
pub use config::{AppConfig, ConfigManager, validate_root};
pub use context::{
    CancellationToken, IDLE_MESSAGE, NoopProgress, OperationContext, Progress, ProgressSink,
};
pub use error::{
    Error, ErrorCategory, ErrorKind, FileSystemError, FixerError, PlaylistError, Result, TagError,
};
pub use fixer::{
    FixMode, FixOptions, FixReport, RESTORE_WARNING, RenumberingFixer, RestoreReport, TagLimits,
};
pub use fs::STAGING_DIR_NAME;
pub use index::{
    Containment, FolderId, LibraryIndex, MusicFolder, Playlist, PlaylistId, Track, TrackId,
};
pub use library::{DeleteOutcome, FixOutcome, LibraryManager};
pub use metadata::{Id3TagCodec, LegacyTag, TagCodec, TrackTags};
pub use paths::{ENTRY_SEPARATOR, PathMapping, relative_path};
pub use playlist::{
    ParsedPlaylist, PlaylistEntries, PlaylistSynchronizer, SyncOutcome, SyncReport,
    read_playlist, validate_playlist_name,
};
pub use sanitize::{remove_invalid_file_name_chars, sanitize};
pub use scope::Scope;
pub use task::{OperationHandle, spawn_operation};
