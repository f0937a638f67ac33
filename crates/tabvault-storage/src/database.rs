//! SQLite-backed key-value store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::migrations::run_migrations;
use crate::store::KeyValueStore;
use crate::Result;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
    /// Upper bound on `bytes_in_use`, if any
    quota_bytes: Option<u64>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            quota_bytes: None,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            quota_bytes: None,
        })
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn read_value(conn: &Connection, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn usage(conn: &Connection) -> Result<u64> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as u64)
    }

    fn entry_size(conn: &Connection, key: &str) -> Result<u64> {
        let size: Option<i64> = conn
            .query_row(
                "SELECT LENGTH(key) + LENGTH(value) FROM kv WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(size.unwrap_or(0).max(0) as u64)
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.with_connection(|conn| Self::read_value(conn, key))
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM kv")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entries = HashMap::with_capacity(rows.len());
            for (key, raw) in rows {
                match serde_json::from_str(&raw) {
                    Ok(value) => {
                        entries.insert(key, value);
                    }
                    // Surface unreadable rows as raw strings so integrity checks can see them
                    Err(_) => {
                        tracing::warn!(key = %key, "Stored value is not valid JSON");
                        entries.insert(key, Value::String(raw));
                    }
                }
            }
            Ok(entries)
        })
    }

    async fn set(&self, items: Vec<(String, Value)>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let encoded = items
            .into_iter()
            .map(|(key, value)| Ok((key, serde_json::to_string(&value)?)))
            .collect::<Result<Vec<(String, String)>>>()?;
        let quota = self.quota_bytes;
        let updated_at = Utc::now().to_rfc3339();

        self.transaction(|conn| {
            if let Some(quota) = quota {
                let mut required = Self::usage(conn)?;
                for (key, raw) in &encoded {
                    required = required.saturating_sub(Self::entry_size(conn, key)?);
                    required += (key.len() + raw.len()) as u64;
                }
                if required > quota {
                    return Err(StorageError::QuotaExceeded { required, quota });
                }
            }

            for (key, raw) in &encoded {
                conn.execute(
                    "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![key, raw, updated_at],
                )?;
            }
            Ok(())
        })
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        self.transaction(|conn| {
            for key in keys {
                conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            }
            Ok(())
        })
    }

    async fn bytes_in_use(&self) -> Result<u64> {
        self.with_connection(Self::usage)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            quota_bytes: self.quota_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            let count: i32 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let db = Database::open_in_memory().unwrap();

        db.set(vec![
            ("a".to_string(), json!({"n": 1})),
            ("b".to_string(), json!([1, 2, 3])),
        ])
        .await
        .unwrap();

        assert_eq!(db.get("a").await.unwrap(), Some(json!({"n": 1})));
        assert_eq!(db.get_all().await.unwrap().len(), 2);

        db.remove(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(db.get("a").await.unwrap().is_none());
        assert!(db.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_write() {
        let db = Database::open_in_memory().unwrap().with_quota(64);

        db.set_one("small", json!("ok")).await.unwrap();
        let err = db
            .set_one("large", json!("x".repeat(128)))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));

        // Nothing from the rejected batch is written
        assert!(db.get("large").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replacing_entry_counts_once() {
        let db = Database::open_in_memory().unwrap().with_quota(40);

        db.set_one("k", json!("x".repeat(20))).await.unwrap();
        db.set_one("k", json!("y".repeat(20))).await.unwrap();
        assert!(db.bytes_in_use().await.unwrap() <= 40);
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabvault.db");

        {
            let db = Database::open(&path).unwrap();
            db.set_one("categories", json!(["work"])).await.unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get("categories").await.unwrap(), Some(json!(["work"])));
    }
}
