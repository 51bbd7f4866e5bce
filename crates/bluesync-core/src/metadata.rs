//! Track metadata service.
//!
//! Reading accepts whatever the file carries (ID3v2, falling back to ID3v1).
//! Writing always produces exactly one ID3v1.1 tag, the only container the
//! head unit understands; every other container is stripped first.
//!
//! # Example
//!
//! ```rust,ignore
//! use bluesync_core::metadata::{Id3TagCodec, LegacyTag, TagCodec};
//! use std::path::Path;
//!
//! let codec = Id3TagCodec::new();
//! let tags = codec.read_tags(Path::new("song.mp3"))?;
//! codec.write_legacy_tag(Path::new("song.mp3"), &LegacyTag {
//!     title: "Song".into(),
//!     album: "Album 1".into(),
//!     ..LegacyTag::default()
//! })?;
//! ```

use std::path::Path;

use id3::TagLike;
use lofty::config::WriteOptions;
use lofty::prelude::*;
use lofty::tag::{Tag, TagType};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, FileSystemError, Result, TagError};

/// Tag fields consumed by the library. Missing values are empty / zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    /// Album name.
    pub album: String,
    /// Artist name.
    pub artist: String,
    /// Track title.
    pub title: String,
    /// Track number, `0` when absent.
    pub track_number: u32,
    /// Genre as text.
    pub genre: String,
}

impl TrackTags {
    /// Check if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.album.is_empty()
            && self.artist.is_empty()
            && self.title.is_empty()
            && self.track_number == 0
            && self.genre.is_empty()
    }
}

/// The single legacy tag written to every processed track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTag {
    /// Title, at most 30 characters.
    pub title: String,
    /// Artist; `None` omits the field.
    pub artist: Option<String>,
    /// Album, at most 30 characters.
    pub album: String,
    /// Track number; `None` omits the field.
    pub track: Option<u8>,
    /// Genre text; `None` omits the field.
    pub genre: Option<String>,
}

/// Read/write access to audio tags, keyed by file path.
#[cfg_attr(test, mockall::automock)]
pub trait TagCodec: Send + Sync {
    /// Read the tag fields of a track.
    fn read_tags(&self, path: &Path) -> Result<TrackTags>;

    /// Remove every tag container and write `tag` as the only one.
    fn write_legacy_tag(&self, path: &Path, tag: &LegacyTag) -> Result<()>;
}

/// Production codec backed by `id3` (reading, stripping) and `lofty`
/// (ID3v1 writing).
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3TagCodec;

impl Id3TagCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn read_failed(path: &Path, reason: impl ToString) -> Error {
    Error::Tag(TagError::ReadFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

fn write_failed(path: &Path, reason: impl ToString) -> Error {
    Error::Tag(TagError::WriteFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

fn is_no_tag(err: &id3::Error) -> bool {
    matches!(err.kind, id3::ErrorKind::NoTag)
}

fn read_v1(path: &Path) -> Result<TrackTags> {
    match id3::v1::Tag::read_from_path(path) {
        Ok(tag) => Ok(TrackTags {
            album: tag.album.trim().to_string(),
            artist: tag.artist.trim().to_string(),
            title: tag.title.trim().to_string(),
            track_number: tag.track.map_or(0, u32::from),
            genre: tag.genre().unwrap_or_default().to_string(),
        }),
        Err(e) if is_no_tag(&e) => {
            trace!("No tag found in: {}", path.display());
            Ok(TrackTags::default())
        }
        Err(e) => Err(read_failed(path, e)),
    }
}

impl TagCodec for Id3TagCodec {
    fn read_tags(&self, path: &Path) -> Result<TrackTags> {
        if !path.is_file() {
            return Err(Error::FileSystem(FileSystemError::NotFound {
                path: path.to_path_buf(),
            }));
        }

        match id3::Tag::read_from_path(path) {
            Ok(tag) => Ok(TrackTags {
                album: tag.album().unwrap_or_default().trim().to_string(),
                artist: tag.artist().unwrap_or_default().trim().to_string(),
                title: tag.title().unwrap_or_default().trim().to_string(),
                track_number: tag.track().unwrap_or(0),
                genre: tag
                    .genre_parsed()
                    .map(|g| g.trim().to_string())
                    .unwrap_or_default(),
            }),
            Err(e) if is_no_tag(&e) => read_v1(path),
            Err(e) => Err(read_failed(path, e)),
        }
    }

    fn write_legacy_tag(&self, path: &Path, legacy: &LegacyTag) -> Result<()> {
        debug!("Writing legacy tag to: {}", path.display());

        id3::Tag::remove_from_path(path).map_err(|e| write_failed(path, e))?;
        TagType::Ape
            .remove_from_path(path)
            .map_err(|e| write_failed(path, e))?;
        id3::v1::Tag::remove_from_path(path).map_err(|e| write_failed(path, e))?;

        let mut tag = Tag::new(TagType::Id3v1);
        tag.set_title(legacy.title.clone());
        tag.set_album(legacy.album.clone());
        if let Some(artist) = &legacy.artist {
            tag.set_artist(artist.clone());
        }
        if let Some(track) = legacy.track {
            tag.set_track(u32::from(track));
        }
        if let Some(genre) = &legacy.genre {
            tag.set_genre(genre.clone());
        }

        tag.save_to_path(path, WriteOptions::default())
            .map_err(|e| write_failed(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// A few silent MPEG-1 Layer III frames (128 kbit/s, 44.1 kHz).
    fn silent_mp3() -> Vec<u8> {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        frame.repeat(8)
    }

    fn create_track(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, silent_mp3()).expect("Failed to write track");
        path
    }

    #[test]
    fn test_track_tags_is_empty() {
        let mut tags = TrackTags::default();
        assert!(tags.is_empty());
        tags.track_number = 3;
        assert!(!tags.is_empty());
    }

    #[test]
    fn test_read_untagged_file_yields_empty_tags() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = create_track(&dir, "plain.mp3");

        let tags = Id3TagCodec::new().read_tags(&path).expect("read should succeed");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = Id3TagCodec::new().read_tags(&dir.path().join("missing.mp3"));
        assert!(matches!(
            result,
            Err(Error::FileSystem(FileSystemError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_read_id3v2_fields() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = create_track(&dir, "tagged.mp3");

        let mut tag = id3::Tag::new();
        tag.set_title("Enjoy the Silence");
        tag.set_artist("Depeche Mode");
        tag.set_album("Violator");
        tag.set_track(6);
        tag.set_genre("Synthpop");
        tag.write_to_path(&path, id3::Version::Id3v24)
            .expect("Failed to write id3v2 tag");

        let tags = Id3TagCodec::new().read_tags(&path).expect("read should succeed");
        assert_eq!(tags.title, "Enjoy the Silence");
        assert_eq!(tags.artist, "Depeche Mode");
        assert_eq!(tags.album, "Violator");
        assert_eq!(tags.track_number, 6);
        assert_eq!(tags.genre, "Synthpop");
    }

    #[test]
    fn test_write_legacy_tag_replaces_id3v2() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = create_track(&dir, "convert.mp3");

        let mut tag = id3::Tag::new();
        tag.set_title("Old Title");
        tag.write_to_path(&path, id3::Version::Id3v24)
            .expect("Failed to write id3v2 tag");

        let legacy = LegacyTag {
            title: "New Title".to_string(),
            artist: None,
            album: "Album 1".to_string(),
            track: Some(2),
            genre: None,
        };
        Id3TagCodec::new()
            .write_legacy_tag(&path, &legacy)
            .expect("write should succeed");

        let v2 = id3::Tag::read_from_path(&path);
        assert!(matches!(v2, Err(ref e) if is_no_tag(e)));

        let v1 = id3::v1::Tag::read_from_path(&path).expect("id3v1 tag should exist");
        assert_eq!(v1.title.trim(), "New Title");
        assert_eq!(v1.album.trim(), "Album 1");
        assert_eq!(v1.artist.trim(), "");
        assert_eq!(v1.track, Some(2));

        let tags = Id3TagCodec::new().read_tags(&path).expect("read should succeed");
        assert_eq!(tags.title, "New Title");
        assert_eq!(tags.track_number, 2);
    }
}
