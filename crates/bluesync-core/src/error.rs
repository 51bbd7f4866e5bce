//! Error types for Bluesync core operations.
//!
//! Errors are grouped per domain (file system, playlists, tags, the fixer)
//! and every variant carries the path it concerns so the caller can act on
//! it without digging through logs.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// File system failures.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// A required file or directory does not exist.
    #[error("Path not found: {path}")]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// Reading a file or directory failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// Path being read.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Writing a file failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// Path being written.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Creating a directory failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory being created.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Deleting a file or directory failed.
    #[error("Failed to delete {path}: {reason}")]
    DeleteFailed {
        /// Path being deleted.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Moving a file or directory failed.
    #[error("Failed to move {source_path} to {destination}: {reason}")]
    MoveFailed {
        /// Original location.
        source_path: PathBuf,
        /// Target location.
        destination: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// A move target is already occupied. Files are never overwritten.
    #[error("Destination already exists: {path}")]
    AlreadyExists {
        /// Occupied path.
        path: PathBuf,
    },

    /// The path is malformed or not usable for the operation.
    #[error("Invalid path {path}: {reason}")]
    InvalidPath {
        /// Offending path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },
}

/// Playlist parsing and management failures.
#[derive(Debug, Error)]
pub enum PlaylistError {
    /// The playlist uses extended M3U directives, which the head unit cannot read.
    #[error("Error in playlist '{playlist}': extended M3U not supported (line: '{line}')")]
    ExtendedM3u {
        /// Playlist display name.
        playlist: String,
        /// Offending line.
        line: String,
    },

    /// An entry references a file that does not exist.
    #[error("Error in playlist '{playlist}': file does not exist: '{entry}'")]
    MissingEntry {
        /// Playlist display name.
        playlist: String,
        /// Entry as written in the file.
        entry: String,
    },

    /// An entry cannot be expressed relative to the library root.
    #[error("Error in playlist '{playlist}': {reason} ('{entry}')")]
    InvalidEntry {
        /// Playlist display name.
        playlist: String,
        /// Entry as written in the file.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Invalid playlist name.
    #[error("Invalid playlist name '{name}': {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Playlist not found.
    #[error("Playlist not found: {name}")]
    NotFound {
        /// Playlist name or path.
        name: String,
    },

    /// A playlist with that name already exists.
    #[error("Playlist already exists: {name}")]
    AlreadyExists {
        /// Playlist name.
        name: String,
    },
}

/// Audio tag codec failures.
#[derive(Debug, Error)]
pub enum TagError {
    /// Tags could not be read.
    #[error("Could not read tags of '{path}': {reason}")]
    ReadFailed {
        /// Track path.
        path: PathBuf,
        /// Codec message.
        reason: String,
    },

    /// Tags could not be written.
    #[error("Could not write tags of '{path}': {reason}")]
    WriteFailed {
        /// Track path.
        path: PathBuf,
        /// Codec message.
        reason: String,
    },
}

/// Renumbering run failures.
#[derive(Debug, Error)]
pub enum FixerError {
    /// Processing a track failed, aborting the run.
    #[error("Could not convert file '{path}': {reason}")]
    TrackFailed {
        /// Track being processed when the run aborted.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// The next folder or track number does not fit.
    #[error("No number left after '{path}'")]
    NumberingExhausted {
        /// Folder or track that needed the number.
        path: PathBuf,
    },
}

/// Errors that can occur in Bluesync core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// File system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Playlist operation failed.
    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    /// Tag codec failed.
    #[error(transparent)]
    Tag(#[from] TagError),

    /// Renumbering run failed.
    #[error(transparent)]
    Fixer(#[from] FixerError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation was cancelled before it produced a result.
    #[error("Operation cancelled")]
    Cancelled,

    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error category for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// File system errors.
    FileSystem,
    /// Playlist errors.
    Playlist,
    /// Tag codec errors.
    Tag,
    /// Renumbering errors.
    Fixer,
    /// Configuration errors.
    Configuration,
    /// Cancellation.
    Cancelled,
    /// Background task errors.
    Task,
    /// Raw IO errors.
    Io,
    /// Serialization errors.
    Serialization,
}

/// How an error affects the surrounding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Affects a single item; the operation logs it and continues.
    Recoverable,
    /// Aborts the whole run; cleanup and restore still execute.
    Fatal,
    /// Input rejected before any mutation happened.
    Validation,
    /// The environment is unusable (missing root, locked target).
    Environmental,
}

impl Error {
    /// Get the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::FileSystem(_) => ErrorKind::FileSystem,
            Self::Playlist(_) => ErrorKind::Playlist,
            Self::Tag(_) => ErrorKind::Tag,
            Self::Fixer(_) => ErrorKind::Fixer,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Task(_) => ErrorKind::Task,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Classify the error by its effect on the running operation.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Tag(TagError::ReadFailed { .. }) => ErrorCategory::Recoverable,
            Self::Playlist(_) | Self::Configuration(_) | Self::Serialization(_) => {
                ErrorCategory::Validation
            }
            Self::FileSystem(
                FileSystemError::NotFound { .. } | FileSystemError::InvalidPath { .. },
            ) => ErrorCategory::Environmental,
            _ => ErrorCategory::Fatal,
        }
    }

    /// Shorthand for an invalid-path error.
    pub(crate) fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileSystem(FileSystemError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        })
    }
}
