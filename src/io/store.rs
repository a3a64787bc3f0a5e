use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::model::task::Task;
use crate::model::user::{PublicUser, User};

pub const USERS_KEY: &str = "users";
pub const TASKS_KEY: &str = "tasks";
pub const SESSION_KEY: &str = "current_user";

/// Error type for durable writes
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not write {key}: {source}")]
    Write { key: String, source: io::Error },
    #[error("could not serialize {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },
}

/// Flat string key-value storage. Values are whole JSON documents.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;

    /// Called when the value under `key` could not be decoded.
    /// Stores that can keep a copy of the bad value should do so here.
    fn quarantine(&self, _key: &str) {}
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// One `<key>.json` file per key inside a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(FileStore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        atomic_write(&self.path_for(key), value.as_bytes())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn quarantine(&self, key: &str) {
        let path = self.path_for(key);
        let bak = path.with_extension("json.bak");
        if fs::copy(&path, &bak).is_ok() {
            warn!(path = %path.display(), backup = %bak.display(), "backed up unreadable record");
        }
    }
}

/// Write a file atomically: temp file in the same directory, then rename over
/// the target.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store, handy for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persistence adapter
// ---------------------------------------------------------------------------

/// Typed access to the three durable records (users, tasks, current session).
///
/// Reads never fail: an absent key is an empty collection, and a record that
/// does not decode is logged, quarantined and treated as empty. Writes always
/// replace the whole record.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Persistence { store }
    }

    /// Persistence over a fresh [`MemoryStore`]
    pub fn in_memory() -> Self {
        Persistence::new(Arc::new(MemoryStore::new()))
    }

    pub fn load_tasks(&self) -> Vec<Task> {
        self.load_record(TASKS_KEY).unwrap_or_default()
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        self.save_record(TASKS_KEY, tasks)
    }

    pub fn load_users(&self) -> Vec<User> {
        self.load_record(USERS_KEY).unwrap_or_default()
    }

    pub fn save_users(&self, users: &[User]) -> Result<(), StoreError> {
        self.save_record(USERS_KEY, users)
    }

    pub fn load_session(&self) -> Option<PublicUser> {
        self.load_record(SESSION_KEY)
    }

    pub fn save_session(&self, user: &PublicUser) -> Result<(), StoreError> {
        self.save_record(SESSION_KEY, user)
    }

    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.store.remove(SESSION_KEY).map_err(|e| StoreError::Write {
            key: SESSION_KEY.to_string(),
            source: e,
        })
    }

    fn load_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let content = match self.store.get(key) {
            Ok(Some(content)) => content,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "could not read record, treating as empty");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "corrupt record, treating as empty");
                self.store.quarantine(key);
                None
            }
        }
    }

    fn save_record<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(value).map_err(|e| StoreError::Serialize {
            key: key.to_string(),
            source: e,
        })?;
        self.store.set(key, &content).map_err(|e| StoreError::Write {
            key: key.to_string(),
            source: e,
        })?;
        debug!(key, bytes = content.len(), "record written");
        Ok(())
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskStatus;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn task(id: i64, user_id: i64) -> Task {
        Task {
            id,
            user_id,
            title: format!("task {}", id),
            description: String::new(),
            due_date: None,
            status: TaskStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn missing_records_load_empty() {
        let p = Persistence::in_memory();
        assert!(p.load_tasks().is_empty());
        assert!(p.load_users().is_empty());
        assert!(p.load_session().is_none());
    }

    #[test]
    fn save_replaces_whole_collection() {
        let p = Persistence::in_memory();
        p.save_tasks(&[task(1, 1), task(2, 1)]).unwrap();
        p.save_tasks(&[task(3, 2)]).unwrap();
        assert_eq!(p.load_tasks(), vec![task(3, 2)]);
    }

    #[test]
    fn corrupt_record_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(TASKS_KEY, "not json {{{").unwrap();
        let p = Persistence::new(store);
        assert!(p.load_tasks().is_empty());
    }

    #[test]
    fn session_round_trip_and_clear() {
        let p = Persistence::in_memory();
        let user = PublicUser {
            id: 9,
            name: "Ada".into(),
            email: "ada@example.com".into(),
        };
        p.save_session(&user).unwrap();
        assert_eq!(p.load_session(), Some(user));
        p.clear_session().unwrap();
        assert!(p.load_session().is_none());
        // Clearing twice is fine
        p.clear_session().unwrap();
    }

    #[test]
    fn file_store_writes_one_file_per_key() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(&dir.path().join("data")).unwrap();
        let p = Persistence::new(Arc::new(store.clone()));
        p.save_tasks(&[task(1, 1)]).unwrap();

        let written = fs::read_to_string(store.dir().join("tasks.json")).unwrap();
        assert!(written.contains("\"user_id\": 1"));
        assert_eq!(p.load_tasks(), vec![task(1, 1)]);
    }

    #[test]
    fn file_store_backs_up_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("users.json"), "[{").unwrap();

        let p = Persistence::new(Arc::new(store));
        assert!(p.load_users().is_empty());
        let bak = fs::read_to_string(dir.path().join("users.json.bak")).unwrap();
        assert_eq!(bak, "[{");
    }

    #[test]
    fn file_store_remove_missing_key_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.remove("nothing").is_ok());
        assert_eq!(store.get("nothing").unwrap(), None);
    }
}
