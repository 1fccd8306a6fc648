use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::StorageError;

pub const CURRENT_SESSION_KEY: &str = "currentTestSession";
pub const HISTORY_KEY: &str = "testHistory";
pub const USER_NAME_KEY: &str = "userName";
pub const COMPETITIONS_KEY: &str = "competitions";

/// Synchronous string key-value store that survives restarts.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Volatile store used by tests and headless runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// SQLite-backed store: one row per key.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }
}

pub fn load<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save<T: Serialize + ?Sized>(
    store: &mut dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// Read `key`, falling back to `default` when it is absent, unreadable or corrupt.
pub fn load_or_default<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> T {
    match load(store, key) {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(e) => {
            log::warn!("error reading stored key {key:?}, using default: {e}");
            default
        }
    }
}

/// Write `key`; failures are logged and swallowed.
pub fn save_logged<T: Serialize + ?Sized>(store: &mut dyn KeyValueStore, key: &str, value: &T) {
    if let Err(e) = save(store, key, value) {
        log::error!("error writing stored key {key:?}: {e}");
    }
}

pub fn remove_logged(store: &mut dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(key) {
        log::error!("error removing stored key {key:?}: {e}");
    }
}

/// Serde codec that writes a timestamp as `{"__type":"Date","value":"<rfc3339>"}`.
///
/// Nanosecond precision is kept so elapsed-time arithmetic after a reload
/// matches the in-memory value.
pub mod tagged_date {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    const DATE_TAG: &str = "Date";

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        #[serde(rename = "__type")]
        kind: String,
        value: String,
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        Tagged {
            kind: DATE_TAG.to_string(),
            value: value.to_rfc3339_opts(SecondsFormat::Nanos, true),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let tagged = Tagged::deserialize(deserializer)?;
        if tagged.kind != DATE_TAG {
            return Err(D::Error::custom(format!(
                "expected __type \"{DATE_TAG}\", found {:?}",
                tagged.kind
            )));
        }
        DateTime::parse_from_rfc3339(&tagged.value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let tagged = Option::<Tagged>::deserialize(deserializer)?;
            tagged
                .map(|t| {
                    if t.kind != DATE_TAG {
                        return Err(D::Error::custom("expected a tagged Date"));
                    }
                    DateTime::parse_from_rfc3339(&t.value)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(D::Error::custom)
                })
                .transpose()
        }
    }
}
