//! Photo store - persistent photo metadata
//!
//! The show reads every photo at startup and writes back rating and rotation
//! edits, new photos and sent emails. `PhotoStore` is the seam; the shipped
//! implementation is SQLite (`SqlitePhotoStore`).

mod migrations;
mod sqlite;

use std::fmt;

pub use sqlite::SqlitePhotoStore;

use crate::entities::{NewPhoto, Photo, PhotoFile, PhotoId};

/// Store errors
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(String),
    NotFound(PhotoId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "Database error: {}", e),
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::NotFound(id) => write!(f, "Photo {} not found", id),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

/// Persistent photo metadata.
///
/// Photos come back with empty `pathname`/`absolute_path`; paths are assigned
/// per run by the library builder.
pub trait PhotoStore {
    fn all_photos(&self) -> Result<Vec<Photo>, StoreError>;

    fn photo_by_id(&self, id: PhotoId) -> Result<Option<Photo>, StoreError>;

    fn photo_by_hash_back(&self, hash_back: &str) -> Result<Option<Photo>, StoreError>;

    /// Overwrite every persisted field of an existing photo.
    fn save_photo(&self, photo: &Photo) -> Result<(), StoreError>;

    fn create_photo(&self, photo: &NewPhoto) -> Result<PhotoId, StoreError>;

    fn all_photo_files(&self) -> Result<Vec<PhotoFile>, StoreError>;

    /// Insert or replace by pathname.
    fn save_photo_file(&self, file: &PhotoFile) -> Result<(), StoreError>;

    /// Record that `photo` was emailed to `address` (case-insensitive).
    fn email_sent(&self, photo: PhotoId, address: &str) -> Result<(), StoreError>;

    /// Addresses starting with `prefix`, most-emailed first.
    fn emails_with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    fn has_been_emailed_by(&self, photo: PhotoId, address: &str) -> Result<bool, StoreError>;
}
