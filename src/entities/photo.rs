//! Photo metadata records.
//!
//! These mirror the rows of the photo store. A `Photo` is the logical picture
//! (identified by a content hash); a `PhotoFile` is one file on disk that
//! carries it. Several files (copies, re-saved headers) may map to one photo.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default rating for a newly discovered photo.
pub const DEFAULT_RATING: u8 = 3;

/// Stable photo identity (database row id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhotoId(pub i64);

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A photo that was taken.
///
/// `rotation` and `rating` are the only fields edited while the show runs;
/// edits happen in place and are written back through the photo store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    /// Hex SHA-256 of the last 1 KiB of the original file.
    pub hash_back: String,
    /// Counter-clockwise rotation to apply before display, in degrees.
    pub rotation: i32,
    /// 1 = "fine to delete", 2 = "don't show", 3 = default, 4 = great, 5 = best.
    pub rating: u8,
    /// Capture time, seconds since the epoch. Defaults to the file mtime.
    pub date: i64,
    /// Human date, usually derived from `date` but may be vaguer ("Summer 1975").
    pub display_date: String,
    pub label: String,
    /// Relative to the photo root. Not persisted; assigned once per run.
    #[serde(skip)]
    pub pathname: PathBuf,
    /// Resolved on-disk path the decoder reads from.
    #[serde(skip)]
    pub absolute_path: PathBuf,
}

impl Photo {
    /// Rotation normalized to 0, 90, 180 or 270.
    pub fn normalized_rotation(&self) -> i32 {
        self.rotation.rem_euclid(360)
    }

    /// Whether the photo is displayed on its side.
    pub fn is_sideways(&self) -> bool {
        matches!(self.normalized_rotation(), 90 | 270)
    }

    /// File name for log lines.
    pub fn file_name(&self) -> String {
        self.pathname
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Fields needed to create a photo row.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub hash_back: String,
    pub rotation: i32,
    pub rating: u8,
    pub date: i64,
    pub display_date: String,
    pub label: String,
}

/// One file on disk holding a photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoFile {
    /// Relative to the photo root.
    pub pathname: String,
    /// Hex SHA-256 of the whole file.
    pub hash_all: String,
    /// Hex SHA-256 of the last 1 KiB.
    pub hash_back: String,
}

#[cfg(test)]
pub(crate) fn test_photo(id: i64) -> Photo {
    Photo {
        id: PhotoId(id),
        hash_back: format!("hash{}", id),
        rotation: 0,
        rating: DEFAULT_RATING,
        date: 0,
        display_date: String::new(),
        label: format!("photo {}", id),
        pathname: PathBuf::from(format!("p{}.jpg", id)),
        absolute_path: PathBuf::from(format!("/photos/p{}.jpg", id)),
    }
}
