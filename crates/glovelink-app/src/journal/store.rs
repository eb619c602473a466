//! Key/value stores backing the journal
//!
//! The journal only needs `get` and `set` of whole string values. Two
//! implementations are provided: [`MemoryStore`] for tests and embedding, and
//! [`FileStore`], which keeps one JSON file per key in a directory.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;

use glovelink_core::prelude::*;

/// Persistence capability: a string key/value store
#[trait_variant::make(JournalStore: Send)]
pub trait LocalJournalStore {
    /// Value stored under `key`, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// In-memory store; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Raw value without going through the async API
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Seed a value directly (fixtures, corrupt data)
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(key.into(), value.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl JournalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.insert(key, value);
        Ok(())
    }
}

/// Directory-backed store: `<dir>/<key>.json`.
///
/// Writes go to a temp file that is renamed over the target while holding an
/// exclusive lock on `<dir>/.<key>.lock`, so readers never observe a torn
/// file and concurrent processes don't interleave.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::persistence(format!("invalid store key '{key}'")))
    }
}

impl JournalStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        tokio::task::spawn_blocking(move || match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::persistence(format!("read {:?}: {}", path, e))),
        })
        .await
        .map_err(|e| Error::persistence(e.to_string()))?
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key)?;
        let dir = self.dir.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &key, &path, &value))
            .await
            .map_err(|e| Error::persistence(e.to_string()))?
    }
}

fn write_atomic(dir: &Path, key: &str, path: &Path, value: &str) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::persistence(format!("create {:?}: {}", dir, e)))?;

    let lock_path = dir.join(format!(".{key}.lock"));
    let lock = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::persistence(format!("open {:?}: {}", lock_path, e)))?;
    lock.lock_exclusive()
        .map_err(|e| Error::persistence(format!("lock {:?}: {}", lock_path, e)))?;

    let temp_path = dir.join(format!(".{key}.json.tmp"));
    let mut temp = std::fs::File::create(&temp_path)
        .map_err(|e| Error::persistence(format!("create {:?}: {}", temp_path, e)))?;
    temp.write_all(value.as_bytes())
        .and_then(|_| temp.sync_all())
        .map_err(|e| Error::persistence(format!("write {:?}: {}", temp_path, e)))?;
    drop(temp);

    std::fs::rename(&temp_path, path)
        .map_err(|e| Error::persistence(format!("rename to {:?}: {}", path, e)))?;

    trace!("Stored {} bytes under {}", value.len(), key);
    // lock released on drop
    Ok(())
}
