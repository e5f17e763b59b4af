//! Key/value state stores.
//!
//! Two scopes exist: a persisted store (token, selections, generated test
//! hand-off) and a tab-scoped store used by [`crate::cache::ClientCache`].
//! Both are injected through [`KeyValueStore`] so tests can swap in
//! [`MemoryStore`].

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::Result;

/// Well-known keys.
pub mod keys {
    pub const USER_TOKEN: &str = "userToken";
    pub const SELECTED_PROJECT_ID: &str = "selectedProjectId";
    pub const SELECTED_ROUTE_ID: &str = "selectedRouteId";
    /// Freshly generated test batch handed from generation to results.
    pub const GENERATED_TESTS: &str = "tests";
    pub const DASHBOARD: &str = "dashboardData";

    pub fn routes(project_id: i64) -> String {
        format!("routes_{}", project_id)
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn clear(&self, key: &str) -> Result<()>;
    fn clear_all(&self) -> Result<()>;
}

/// Typed access on top of the raw JSON values.
pub trait StoreExt: KeyValueStore {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key)?.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }))
    }

    /// Numeric ids may have been stored as strings or numbers.
    fn get_id(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get(key)?.and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }))
    }
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {}

/// In-process store; lives as long as the value does.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned map is still a valid map
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}

/// JSON object on disk, atomically replaced on every mutation.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// A file that does not parse as a JSON object reads as empty; the next
    /// mutation overwrites it.
    fn read_all(&self) -> Result<HashMap<String, Value>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, starting empty");
                Ok(HashMap::new())
            }
        }
    }

    fn write_all(&self, entries: &HashMap<String, Value>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let encoded = serde_json::to_vec_pretty(entries).map_err(std::io::Error::from)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), keys = entries.len(), "state file written");
        Ok(())
    }

    fn update<F: FnOnce(&mut HashMap<String, Value>)>(&self, f: F) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_all()?;
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn clear_all(&self) -> Result<()> {
        self.update(|entries| entries.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use serde_json::json;

    #[test]
    fn memory_store_roundtrip_and_clear() {
        let store = MemoryStore::new();
        store.set_as(keys::SELECTED_PROJECT_ID, &"12").unwrap();
        assert_eq!(store.get_id(keys::SELECTED_PROJECT_ID).unwrap(), Some(12));
        store.clear(keys::SELECTED_PROJECT_ID).unwrap();
        assert!(store.get(keys::SELECTED_PROJECT_ID).unwrap().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("persisted.json");
        {
            let store = FileStore::open(&path);
            store.set(keys::USER_TOKEN, json!("a.b.c")).unwrap();
            store.set(&keys::routes(3), json!([{"id": 1}])).unwrap();
        }
        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get_string(keys::USER_TOKEN).unwrap().as_deref(), Some("a.b.c"));
        reopened.clear_all().unwrap();
        assert!(reopened.get(&keys::routes(3)).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ truncated").unwrap();
        let store = FileStore::open(&path);

        assert!(store.get(keys::DASHBOARD).unwrap().is_none());
        store.clear(keys::DASHBOARD).unwrap();
        store.set(keys::DASHBOARD, json!({"username": "X"})).unwrap();

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({ "dashboardData": { "username": "X" } }));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file renamed over the state file");
    }

    #[test]
    fn unreadable_path_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        let store = FileStore::open(dir.path());
        assert!(matches!(store.get(keys::DASHBOARD), Err(ClientError::Store(_))));
        assert!(matches!(
            store.set(keys::DASHBOARD, json!(1)),
            Err(ClientError::Store(_))
        ));
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("absent.json"));
        assert!(store.get(keys::DASHBOARD).unwrap().is_none());
    }
}
