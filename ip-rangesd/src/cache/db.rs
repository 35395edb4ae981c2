use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use bytes::Bytes;
use rusqlite::{Connection, params, OptionalExtension};
use chrono::Utc;
use crate::cache::store::CacheEntry;

pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        // One row per upstream URL; a refresh overwrites the row
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key        TEXT PRIMARY KEY,
                body       BLOB NOT NULL,
                stored_at  TEXT NOT NULL,
                ttl_ms     INTEGER NOT NULL,
                digest     TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Insert or replace the entry for a key
    pub fn put_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let ttl_ms = i64::try_from(entry.ttl.as_millis()).unwrap_or(i64::MAX);

        self.conn.execute(
            r#"
            INSERT INTO cache_entries (key, body, stored_at, ttl_ms, digest)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
                body = excluded.body,
                stored_at = excluded.stored_at,
                ttl_ms = excluded.ttl_ms,
                digest = excluded.digest
            "#,
            params![
                key,
                &entry.body[..],
                entry.stored_at.to_rfc3339(),
                ttl_ms,
                &entry.digest,
            ],
        )
        .context("Failed to store cache entry")?;

        Ok(())
    }

    /// Get the entry for a key, expired or not
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let result = self
            .conn
            .query_row(
                "SELECT body, stored_at, ttl_ms, digest FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Self::row_to_entry(row),
            )
            .optional()
            .context("Failed to query cache entry")?;

        Ok(result)
    }

    /// Helper to convert a database row to CacheEntry
    fn row_to_entry(row: &rusqlite::Row) -> Result<CacheEntry, rusqlite::Error> {
        let body: Vec<u8> = row.get(0)?;
        let stored_at_str: String = row.get(1)?;
        let ttl_ms: i64 = row.get(2)?;

        let stored_at = chrono::DateTime::parse_from_rfc3339(&stored_at_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?
            .with_timezone(&Utc);

        Ok(CacheEntry {
            body: Bytes::from(body),
            stored_at,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
            digest: row.get(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";

    fn test_entry(body: &'static [u8]) -> CacheEntry {
        CacheEntry::new(Bytes::from_static(body), Duration::from_secs(4 * 3600))
    }

    #[test]
    fn test_put_and_get() {
        let db = CacheDb::open(":memory:").unwrap();
        let entry = test_entry(br#"{"prefixes":[]}"#);

        db.put_entry(KEY, &entry).unwrap();

        let retrieved = db.get_entry(KEY).unwrap().unwrap();
        assert_eq!(retrieved.body, entry.body);
        assert_eq!(retrieved.ttl, entry.ttl);
        assert_eq!(retrieved.digest, entry.digest);
        assert_eq!(retrieved.stored_at, entry.stored_at);
    }

    #[test]
    fn test_missing_key() {
        let db = CacheDb::open(":memory:").unwrap();
        assert!(db.get_entry(KEY).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_existing() {
        let db = CacheDb::open(":memory:").unwrap();

        db.put_entry(KEY, &test_entry(b"first")).unwrap();
        let second = test_entry(b"second");
        db.put_entry(KEY, &second).unwrap();

        let retrieved = db.get_entry(KEY).unwrap().unwrap();
        assert_eq!(retrieved.body, Bytes::from_static(b"second"));
        assert_eq!(retrieved.digest, second.digest);
    }

    #[test]
    fn test_keys_are_independent() {
        let db = CacheDb::open(":memory:").unwrap();

        db.put_entry(KEY, &test_entry(b"aws")).unwrap();
        db.put_entry("http://mirror.example/ip-ranges.json", &test_entry(b"mirror")).unwrap();

        assert_eq!(db.get_entry(KEY).unwrap().unwrap().body, Bytes::from_static(b"aws"));
    }
}
