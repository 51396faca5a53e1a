//! Versioned schema upgrades.
//!
//! `schema_version` holds one row per applied upgrade. Upgrades are applied in
//! order, each in its own transaction, starting after the highest version
//! recorded.

use log::info;
use rusqlite::{Connection, OptionalExtension, params};

/// Upgrade `n` brings the schema to version `n`.
pub const MIGRATIONS: &[&str] = &[
    "CREATE TABLE person (
        id INTEGER PRIMARY KEY,
        email_address TEXT NOT NULL
    );
    CREATE UNIQUE INDEX person_email_address_index ON person(email_address);

    CREATE TABLE photo (
        id INTEGER PRIMARY KEY,
        hash_back TEXT NOT NULL,
        rotation INTEGER NOT NULL DEFAULT 0,
        rating INTEGER NOT NULL DEFAULT 3,
        date INTEGER NOT NULL,
        display_date TEXT NOT NULL,
        label TEXT NOT NULL
    );
    CREATE UNIQUE INDEX photo_hash_back ON photo(hash_back);

    CREATE TABLE email (
        id INTEGER PRIMARY KEY,
        person_id INTEGER NOT NULL REFERENCES person(id),
        sent_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        photo_id INTEGER NOT NULL
    );

    CREATE TABLE photo_file (
        pathname TEXT PRIMARY KEY,
        hash_all TEXT NOT NULL,
        hash_back TEXT NOT NULL
    );
    CREATE INDEX photo_file_hash_back ON photo_file(hash_back);",
];

/// Bring `conn` up to the latest schema. Returns the number of upgrades applied.
pub fn upgrade(conn: &mut Connection) -> rusqlite::Result<usize> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;

    let current: Option<i64> = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let start = current.map_or(0, |v| v as usize + 1);

    let mut applied = 0;
    for (version, migration) in MIGRATIONS.iter().enumerate().skip(start) {
        info!("Applying schema upgrade {}", version);
        let tx = conn.transaction()?;
        tx.execute_batch(migration)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", params![version as i64])?;
        tx.commit()?;
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(upgrade(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(upgrade(&mut conn).unwrap(), 0);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('person', 'photo', 'email', 'photo_file')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }
}
