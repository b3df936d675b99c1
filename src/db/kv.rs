//! Durable key-value layer on top of SQLite.
//!
//! Every engine record lives under a single key. Structured values are
//! stored inside a versioned envelope so older readers can detect newer
//! records and newer readers can still load records written before the
//! envelope existed.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;

/// Current record layout version written by `put_json`.
pub const RECORD_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// SQLite-backed key-value store.
///
/// The connection sits behind a `Mutex` so a single store can be shared
/// between the background scheduler thread and foreground callers.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Open (or create) a store at `path`, running migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    /// In-memory store, used by tests and ephemeral hosts.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Raw value for `key`, `None` if unset.
    pub fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Upsert a raw value.
    pub fn put(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete a key. Returns true if a row was removed.
    pub fn delete(&self, key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    /// Delete `key` only while it still holds `expected`.
    pub fn delete_if(&self, key: &str, expected: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE key = ?1 AND value = ?2",
            params![key, expected],
        )?;
        Ok(removed > 0)
    }

    /// Atomically replace the value of `key` if it currently equals
    /// `expected` (`None` meaning "key absent").
    ///
    /// Returns true when the swap was applied.
    pub fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        let changed = match expected {
            None => conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO NOTHING",
                params![key, new_value],
            )?,
            Some(current) => conn.execute(
                "UPDATE kv_store SET value = ?2, updated_at = datetime('now')
                 WHERE key = ?1 AND value = ?3",
                params![key, new_value, current],
            )?,
        };
        Ok(changed == 1)
    }

    /// Load a versioned JSON record.
    ///
    /// Bare (pre-envelope) records are accepted as version 0.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DatabaseError> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) => {
                if envelope.version > RECORD_VERSION {
                    tracing::warn!(
                        key,
                        version = envelope.version,
                        supported = RECORD_VERSION,
                        "Record written by a newer version, reading known fields only"
                    );
                }
                Ok(Some(envelope.data))
            }
            Err(_) => Ok(Some(serde_json::from_str::<T>(&raw)?)),
        }
    }

    /// Store an enveloped JSON record only if `key` is unset.
    ///
    /// Returns false when another writer got there first.
    pub fn insert_json_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<bool, DatabaseError> {
        let raw = serde_json::to_string(&EnvelopeRef {
            version: RECORD_VERSION,
            data: value,
        })?;
        self.compare_and_swap(key, None, &raw)
    }

    /// Store a JSON record wrapped in the current envelope version.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(&EnvelopeRef {
            version: RECORD_VERSION,
            data: value,
        })?;
        self.put(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    fn store() -> SqliteKvStore {
        SqliteKvStore::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn get_missing_key_returns_none() {
        assert!(store().get("nope").unwrap().is_none());
    }

    #[test]
    fn put_then_get_overwrites() {
        let kv = store();
        kv.put("k", "one").unwrap();
        kv.put("k", "two").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn delete_reports_removal() {
        let kv = store();
        kv.put("k", "v").unwrap();
        assert!(kv.delete("k").unwrap());
        assert!(!kv.delete("k").unwrap());
    }

    #[test]
    fn json_record_is_enveloped() {
        let kv = store();
        let sample = Sample {
            name: "a".into(),
            count: 3,
        };
        kv.put_json("sample", &sample).unwrap();

        let raw = kv.get("sample").unwrap().unwrap();
        assert!(raw.contains("\"version\":1"));
        assert_eq!(kv.get_json::<Sample>("sample").unwrap(), Some(sample));
    }

    #[test]
    fn bare_legacy_record_still_loads() {
        let kv = store();
        kv.put("sample", r#"{"name":"legacy"}"#).unwrap();
        let loaded: Sample = kv.get_json("sample").unwrap().unwrap();
        assert_eq!(loaded.name, "legacy");
        assert_eq!(loaded.count, 0);
    }

    #[test]
    fn newer_record_with_extra_fields_loads() {
        let kv = store();
        kv.put(
            "sample",
            r#"{"version":7,"data":{"name":"future","count":2,"extra":true}}"#,
        )
        .unwrap();
        let loaded: Sample = kv.get_json("sample").unwrap().unwrap();
        assert_eq!(loaded.name, "future");
        assert_eq!(loaded.count, 2);
    }

    #[test]
    fn insert_json_if_absent_keeps_existing_record() {
        let kv = store();
        let first = Sample {
            name: "first".into(),
            count: 1,
        };
        assert!(kv.insert_json_if_absent("sample", &first).unwrap());
        let second = Sample {
            name: "second".into(),
            count: 2,
        };
        assert!(!kv.insert_json_if_absent("sample", &second).unwrap());
        assert_eq!(kv.get_json::<Sample>("sample").unwrap(), Some(first));
    }

    #[test]
    fn compare_and_swap_on_absent_key() {
        let kv = store();
        assert!(kv.compare_and_swap("lease", None, "a").unwrap());
        // Key now exists, a second "absent" swap must fail
        assert!(!kv.compare_and_swap("lease", None, "b").unwrap());
        assert_eq!(kv.get("lease").unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn compare_and_swap_requires_matching_value() {
        let kv = store();
        kv.put("lease", "a").unwrap();
        assert!(!kv.compare_and_swap("lease", Some("stale"), "b").unwrap());
        assert!(kv.compare_and_swap("lease", Some("a"), "b").unwrap());
        assert_eq!(kv.get("lease").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn delete_if_only_removes_matching_value() {
        let kv = store();
        kv.put("lease", "mine").unwrap();
        assert!(!kv.delete_if("lease", "theirs").unwrap());
        assert!(kv.delete_if("lease", "mine").unwrap());
        assert!(kv.get("lease").unwrap().is_none());
    }
}
