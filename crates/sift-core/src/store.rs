//! Durable key-value store for session snapshots.
//!
//! A snapshot is written as one [`KeyValueStore::commit`] so that readers
//! never observe half of a save. [`FileStore`] keeps the whole map in one
//! JSON object file and replaces it via temp file + rename on every commit.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sift_common::{Error, Result};

/// One change inside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEdit {
    Put { key: String, value: String },
    Remove { key: String },
    /// Remove every key. Applied in order with the other edits.
    Clear,
}

impl StoreEdit {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        StoreEdit::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        StoreEdit::Remove { key: key.into() }
    }

    fn apply(self, map: &mut BTreeMap<String, String>) {
        match self {
            StoreEdit::Put { key, value } => {
                map.insert(key, value);
            }
            StoreEdit::Remove { key } => {
                map.remove(&key);
            }
            StoreEdit::Clear => map.clear(),
        }
    }
}

/// String key-value persistence with atomic multi-key commits.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// All keys, sorted.
    fn keys(&self) -> Vec<String>;

    /// Apply `edits` in order, all or nothing.
    fn commit(&self, edits: Vec<StoreEdit>) -> Result<()>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.commit(vec![StoreEdit::put(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.commit(vec![StoreEdit::remove(key)])
    }

    fn clear(&self) -> Result<()> {
        self.commit(vec![StoreEdit::Clear])
    }
}

fn lock(map: &Mutex<BTreeMap<String, String>>) -> MutexGuard<'_, BTreeMap<String, String>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    fn commit(&self, edits: Vec<StoreEdit>) -> Result<()> {
        let mut entries = lock(&self.entries);
        for edit in edits {
            edit.apply(&mut entries);
        }
        Ok(())
    }
}

/// Store backed by a single JSON object file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, creating parent directories.
    ///
    /// A missing file is an empty store. An unreadable file is logged and
    /// treated as empty; it is overwritten by the next commit.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "store file unreadable; starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let temp_path = temp_path_for(&self.path);
        let json = serde_json::to_vec_pretty(entries)?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::Store(format!(
                "failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store".into());
    name.push(".tmp");
    path.with_file_name(name)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    fn commit(&self, edits: Vec<StoreEdit>) -> Result<()> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        for edit in edits {
            edit.apply(&mut next);
        }
        self.write_file(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_commit_applies_in_order() {
        let store = MemoryStore::new();
        store.put("a", "1").unwrap();
        store
            .commit(vec![
                StoreEdit::Clear,
                StoreEdit::put("b", "2"),
                StoreEdit::put("c", "3"),
                StoreEdit::remove("c"),
            ])
            .unwrap();
        assert_eq!(store.keys(), vec!["b".to_string()]);
        assert_eq!(store.get_or("a", "none"), "none");
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::open(&path).unwrap();
        store
            .commit(vec![StoreEdit::put("config", "{}"), StoreEdit::put("user_id", "u1")])
            .unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("user_id").as_deref(), Some("u1"));
        assert_eq!(reopened.keys(), vec!["config".to_string(), "user_id".to_string()]);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_file_store_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).unwrap();
        store.put("a", "1").unwrap();
        store.put("b", "2").unwrap();
        store.remove("a").unwrap();
        assert_eq!(FileStore::open(&path).unwrap().keys(), vec!["b".to_string()]);

        store.clear().unwrap();
        assert!(FileStore::open(&path).unwrap().keys().is_empty());
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.keys().is_empty());
        store.put("k", "v").unwrap();
        assert_eq!(FileStore::open(&path).unwrap().get("k").as_deref(), Some("v"));
    }
}
