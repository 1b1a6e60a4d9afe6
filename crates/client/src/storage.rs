//! Durable key-value storage behind a minimal capability trait.
//!
//! The session store only needs string get/set/remove. On desktop the backing
//! store is one file per key in the platform config directory:
//! - Linux: `~/.config/linnet/`
//! - macOS: `~/Library/Application Support/linnet/`
//! - Windows: `%APPDATA%\linnet\`
//!
//! Tests and embedders without a filesystem use [`MemoryStore`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// String-keyed, string-valued persistent storage.
pub trait KeyValueStore: Send + Sync {
    /// Returns `None` if the key doesn't exist or can't be read.
    fn get(&self, key: &str) -> Option<String>;

    /// Returns `true` if the value was stored.
    fn set(&self, key: &str, value: &str) -> bool;

    fn remove(&self, key: &str);
}

/// File-per-key store under a fixed directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store under the platform config directory. Fails only when the
    /// directory cannot be created.
    pub fn open() -> Option<Self> {
        let dir = dirs::config_dir()?.join("linnet");
        Self::with_dir(dir)
    }

    /// Store under an explicit directory (tests point this at a temp dir).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Option<Self> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).ok()?;
        }
        Some(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Sanitize the key into a valid filename.
        let safe = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(safe)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        std::fs::write(self.path_for(key), value).is_ok()
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

/// In-memory store, used as the test fake.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys (test helper).
    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        self.values.lock().unwrap().insert(key.to_owned(), value.to_owned());
        true
    }

    fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}
