//! Opaque key-value persistence plus the stores built on top of it.
//!
//! The engine only needs `load(key)` / `save(key, blob)`; blobs are JSON
//! strings produced by [`save_json`].

mod config;
pub mod database;
pub mod task_store;

pub use config::{Config, EstimationConfig, LearningConfig};
pub use database::SqliteStore;
pub use task_store::{resolve_index, TaskStore};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{ConfigError, StorageError};

/// Persistent key-value store consumed by the core.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError>;
}

/// Process-local store (tests, dry runs).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Locked)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Locked)?;
        entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// Load and decode a JSON value.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.load(key)? {
        Some(blob) => serde_json::from_str(&blob)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode a value as JSON and save it.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let blob = serde_json::to_string(value).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.save(key, &blob)
}

/// Returns the data directory, creating it when missing.
///
/// `KANPLAN_DATA_DIR` overrides the location; otherwise `~/.config/kanplan`,
/// or `~/.config/kanplan-dev` when `KANPLAN_ENV=dev`.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("KANPLAN_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("KANPLAN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("kanplan-dev")
            } else {
                base_dir.join("kanplan")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.load("missing").unwrap(), None);
        save_json(&store, "numbers", &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = load_json(&store, "numbers").unwrap().unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn corrupt_blob_is_reported_with_key() {
        let store = MemoryStore::new();
        store.save("tasks", "{not json").unwrap();
        let err = load_json::<Vec<i32>>(&store, "tasks").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { ref key, .. } if key == "tasks"));
    }
}
