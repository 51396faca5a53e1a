//! SQLite implementation of `PhotoStore`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::migrations;
use super::{PhotoStore, StoreError};
use crate::entities::{NewPhoto, Photo, PhotoFile, PhotoId};

const PHOTO_FIELDS: &str = "id, hash_back, rotation, rating, date, display_date, label";
const PHOTO_FILE_FIELDS: &str = "pathname, hash_all, hash_back";

/// Photo store in one SQLite file.
pub struct SqlitePhotoStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqlitePhotoStore {
    /// Open (creating if needed) the database at `path` and upgrade its schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Io(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        info!("Opened photo database {}", path.display());
        Ok(store)
    }

    /// Private database, gone when dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::upgrade(&mut conn)?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM photo", [], |row| row.get(0))?;
        debug!("There are {} photos in the database", count);

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn row_to_photo(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: PhotoId(row.get(0)?),
        hash_back: row.get(1)?,
        rotation: row.get(2)?,
        rating: row.get(3)?,
        date: row.get(4)?,
        display_date: row.get(5)?,
        label: row.get(6)?,
        pathname: PathBuf::new(),
        absolute_path: PathBuf::new(),
    })
}

fn row_to_photo_file(row: &Row<'_>) -> rusqlite::Result<PhotoFile> {
    Ok(PhotoFile {
        pathname: row.get(0)?,
        hash_all: row.get(1)?,
        hash_back: row.get(2)?,
    })
}

impl PhotoStore for SqlitePhotoStore {
    fn all_photos(&self) -> Result<Vec<Photo>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM photo ORDER BY id", PHOTO_FIELDS))?;
        let photos = stmt
            .query_map([], row_to_photo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(photos)
    }

    fn photo_by_id(&self, id: PhotoId) -> Result<Option<Photo>, StoreError> {
        let photo = self
            .conn
            .query_row(
                &format!("SELECT {} FROM photo WHERE id = ?1", PHOTO_FIELDS),
                params![id.0],
                row_to_photo,
            )
            .optional()?;
        Ok(photo)
    }

    fn photo_by_hash_back(&self, hash_back: &str) -> Result<Option<Photo>, StoreError> {
        let photo = self
            .conn
            .query_row(
                &format!("SELECT {} FROM photo WHERE hash_back = ?1", PHOTO_FIELDS),
                params![hash_back],
                row_to_photo,
            )
            .optional()?;
        Ok(photo)
    }

    fn save_photo(&self, photo: &Photo) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE photo
             SET hash_back = ?2, rotation = ?3, rating = ?4, date = ?5, display_date = ?6, label = ?7
             WHERE id = ?1",
            params![
                photo.id.0,
                photo.hash_back,
                photo.rotation,
                photo.rating,
                photo.date,
                photo.display_date,
                photo.label,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(photo.id));
        }
        Ok(())
    }

    fn create_photo(&self, photo: &NewPhoto) -> Result<PhotoId, StoreError> {
        self.conn.execute(
            "INSERT INTO photo (hash_back, rotation, rating, date, display_date, label)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                photo.hash_back,
                photo.rotation,
                photo.rating,
                photo.date,
                photo.display_date,
                photo.label,
            ],
        )?;
        Ok(PhotoId(self.conn.last_insert_rowid()))
    }

    fn all_photo_files(&self) -> Result<Vec<PhotoFile>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM photo_file ORDER BY pathname", PHOTO_FILE_FIELDS))?;
        let files = stmt
            .query_map([], row_to_photo_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    fn save_photo_file(&self, file: &PhotoFile) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO photo_file ({}) VALUES (?1, ?2, ?3)",
                PHOTO_FILE_FIELDS
            ),
            params![file.pathname, file.hash_all, file.hash_back],
        )?;
        Ok(())
    }

    fn email_sent(&self, photo: PhotoId, address: &str) -> Result<(), StoreError> {
        let address = address.trim().to_lowercase();
        self.conn.execute(
            "INSERT OR IGNORE INTO person (email_address) VALUES (?1)",
            params![address],
        )?;
        self.conn.execute(
            "INSERT INTO email (person_id, photo_id)
             SELECT id, ?2 FROM person WHERE email_address = ?1",
            params![address, photo.0],
        )?;
        Ok(())
    }

    fn emails_with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
        let mut stmt = self.conn.prepare(
            "SELECT person.email_address
             FROM person
             JOIN email ON person.id = email.person_id
             WHERE person.email_address LIKE ?1 ESCAPE '\\'
             GROUP BY person.email_address
             ORDER BY COUNT(*) DESC, person.email_address
             LIMIT ?2",
        )?;
        let addresses = stmt
            .query_map(params![pattern, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(addresses)
    }

    fn has_been_emailed_by(&self, photo: PhotoId, address: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM email
             JOIN person ON person.id = email.person_id
             WHERE email.photo_id = ?1 AND person.email_address = ?2",
            params![photo.0, address.trim().to_lowercase()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Escape LIKE wildcards so a typed prefix matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_photo(hash: &str) -> NewPhoto {
        NewPhoto {
            hash_back: hash.to_string(),
            rotation: 0,
            rating: 3,
            date: 1_500_000_000,
            display_date: "July 14, 2017".to_string(),
            label: "Trip".to_string(),
        }
    }

    #[test]
    fn test_create_and_load_photo() {
        let store = SqlitePhotoStore::open_in_memory().unwrap();
        let id = store.create_photo(&new_photo("abc")).unwrap();

        let photo = store.photo_by_id(id).unwrap().expect("photo");
        assert_eq!(photo.hash_back, "abc");
        assert_eq!(photo.rating, 3);
        assert_eq!(photo.label, "Trip");
        assert_eq!(store.photo_by_hash_back("abc").unwrap().map(|p| p.id), Some(id));
        assert!(store.photo_by_hash_back("nope").unwrap().is_none());
        assert_eq!(store.all_photos().unwrap().len(), 1);
    }

    #[test]
    fn test_hash_back_unique() {
        let store = SqlitePhotoStore::open_in_memory().unwrap();
        store.create_photo(&new_photo("same")).unwrap();
        assert!(matches!(
            store.create_photo(&new_photo("same")),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn test_save_photo_edits() {
        let store = SqlitePhotoStore::open_in_memory().unwrap();
        let id = store.create_photo(&new_photo("abc")).unwrap();

        let mut photo = store.photo_by_id(id).unwrap().unwrap();
        photo.rating = 5;
        photo.rotation = 270;
        store.save_photo(&photo).unwrap();

        let reloaded = store.photo_by_id(id).unwrap().unwrap();
        assert_eq!(reloaded.rating, 5);
        assert_eq!(reloaded.rotation, 270);

        photo.id = PhotoId(999);
        assert!(matches!(store.save_photo(&photo), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_photo_files_replace_by_pathname() {
        let store = SqlitePhotoStore::open_in_memory().unwrap();
        let mut file = PhotoFile {
            pathname: "2017/a.jpg".to_string(),
            hash_all: "all1".to_string(),
            hash_back: "back1".to_string(),
        };
        store.save_photo_file(&file).unwrap();
        file.hash_all = "all2".to_string();
        store.save_photo_file(&file).unwrap();

        let files = store.all_photo_files().unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_email_suggestions_by_count() {
        let store = SqlitePhotoStore::open_in_memory().unwrap();
        let p1 = store.create_photo(&new_photo("1")).unwrap();
        let p2 = store.create_photo(&new_photo("2")).unwrap();

        store.email_sent(p1, "Alice@Example.com").unwrap();
        store.email_sent(p1, "bob@example.com").unwrap();
        store.email_sent(p2, "bob@example.com").unwrap();
        store.email_sent(p2, "anna@example.com").unwrap();

        assert_eq!(
            store.emails_with_prefix("", 8).unwrap(),
            vec!["bob@example.com", "alice@example.com", "anna@example.com"]
        );
        assert_eq!(
            store.emails_with_prefix("A", 8).unwrap(),
            vec!["alice@example.com", "anna@example.com"]
        );
        assert_eq!(store.emails_with_prefix("", 1).unwrap().len(), 1);
        assert!(store.emails_with_prefix("%", 8).unwrap().is_empty());

        assert!(store.has_been_emailed_by(p1, "alice@example.com").unwrap());
        assert!(store.has_been_emailed_by(p1, "ALICE@example.com").unwrap());
        assert!(!store.has_been_emailed_by(p2, "alice@example.com").unwrap());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("frameloop.db");

        let id = {
            let store = SqlitePhotoStore::open(&path).unwrap();
            store.create_photo(&new_photo("persist")).unwrap()
        };

        let store = SqlitePhotoStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(store.photo_by_id(id).unwrap().is_some());
    }
}
