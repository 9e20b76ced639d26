//! Durable key-value storage for the client session.
//!
//! The session core persists exactly two keys, `token` and `user`. Storage is
//! best-effort: a write or delete that fails is warned about and swallowed so
//! the session store itself never fails. Malformed *contents* are the caller's
//! problem, not the adapter's.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Key-value storage local to the client device.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// File-backed storage: one file per key under a data directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.key_path(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            eprintln!("Warning: failed to create {}: {}", self.dir.display(), e);
            return;
        }
        if let Err(e) = std::fs::write(self.key_path(key), value) {
            eprintln!("Warning: failed to persist '{}': {}", key, e);
        }
    }

    fn remove(&mut self, key: &str) {
        let path = self.key_path(key);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                eprintln!("Warning: failed to remove '{}': {}", key, e);
            }
        }
    }
}

/// In-memory storage for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}
