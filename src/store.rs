use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

pub const BIO_KEY: &str = "amble_user_bio";
pub const FAVORITES_KEY: &str = "amble_favorites";
pub const USER_PLACES_KEY: &str = "amble_user_places";

/// Named JSON records that survive a restart. Absent keys read as `None`.
pub trait KeyValueStore: Send + Sync {
    fn read_json(&self, key: &str) -> AppResult<Option<Value>>;
    fn write_json(&self, key: &str, value: &Value) -> AppResult<()>;
}

pub struct SqliteStore {
    connection: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(database_file);
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(&path, flags)?;
        configure(&connection)?;
        run_migrations(&connection)?;
        info!(target: "store", path = %path.display(), "sqlite store ready");
        Ok(Self {
            connection: Mutex::new(connection),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn configure(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;
        "#,
    )?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );
        "#,
    )?;
    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn read_json(&self, key: &str) -> AppResult<Option<Value>> {
        let raw: Option<String> = self
            .connection
            .lock()
            .query_row("SELECT value FROM records WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        raw.map(|text| serde_json::from_str(&text).map_err(AppError::from))
            .transpose()
    }

    fn write_json(&self, key: &str, value: &Value) -> AppResult<()> {
        let serialized = serde_json::to_string(value)?;
        self.connection.lock().execute(
            "INSERT INTO records (key, value, updated_at)
            VALUES (?1, ?2, DATETIME('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            (key, serialized.as_str()),
        )?;
        debug!(target: "store", key, "record written");
        Ok(())
    }
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, Value>>>,
    fail_writes: Arc<AtomicBool>,
    failing_key: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail until switched back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes writes to `key` alone fail; `None` clears it.
    pub fn fail_writes_for(&self, key: Option<&str>) {
        *self.failing_key.lock() = key.map(str::to_string);
    }

    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.records.lock().get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn read_json(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn write_json(&self, key: &str, value: &Value) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst)
            || self.failing_key.lock().as_deref() == Some(key)
        {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "simulated write failure",
            )));
        }
        self.records.lock().insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn sqlite_store_round_trips_and_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteStore::open(dir.path(), "test.db").unwrap();
            assert!(store.read_json(FAVORITES_KEY).unwrap().is_none());
            store.write_json(FAVORITES_KEY, &json!(["f1"])).unwrap();
            store.write_json(FAVORITES_KEY, &json!(["f1", "c2"])).unwrap();
            assert!(store.path().ends_with("test.db"));
        }

        let reopened = SqliteStore::open(dir.path(), "test.db").unwrap();
        assert_eq!(
            reopened.read_json(FAVORITES_KEY).unwrap(),
            Some(json!(["f1", "c2"]))
        );
    }

    #[test]
    fn memory_store_can_fail_writes() {
        let store = MemoryStore::new();
        store.write_json(BIO_KEY, &json!("hello")).unwrap();
        store.set_fail_writes(true);
        assert!(store.write_json(BIO_KEY, &json!("changed")).is_err());
        assert_eq!(store.snapshot(BIO_KEY), Some(json!("hello")));
    }
}
