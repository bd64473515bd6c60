use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::storage::error::StorageError;
use crate::storage::kv::{BatchEntry, KvBackend};

/// Purely in-memory backend. Used by tests and by tooling that replays
/// history without touching the node's database.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    prepared: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Internal("memory backend lock poisoned".to_string())
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn apply_batch(&self, batch: Vec<BatchEntry>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        for (key, value) in batch {
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn store_prepared(&self, name: &str, blob: &[u8]) -> Result<(), StorageError> {
        let mut prepared = self.prepared.write().map_err(poisoned)?;
        prepared.insert(name.to_string(), blob.to_vec());
        Ok(())
    }

    fn load_prepared(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let prepared = self.prepared.read().map_err(poisoned)?;
        Ok(prepared.get(name).cloned())
    }

    fn remove_prepared(&self, name: &str) -> Result<(), StorageError> {
        let mut prepared = self.prepared.write().map_err(poisoned)?;
        if prepared.remove(name).is_none() {
            return Err(StorageError::NoPreparedState);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.entries.write().map_err(poisoned)?.clear();
        self.prepared.write().map_err(poisoned)?.clear();
        Ok(())
    }
}
