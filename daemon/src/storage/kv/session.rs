use std::collections::BTreeMap;
use std::sync::Arc;

use log::{trace, warn};
use takara_common::serializer::Serializer;

use crate::storage::cache::DatabaseCache;
use crate::storage::error::StorageError;
use crate::storage::kv::{BatchEntry, KvBackend};

type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// One transaction over a [`KvBackend`].
///
/// Reads merge the overlay with the committed base, so a session always sees
/// its own writes. Savepoints snapshot the overlay; rolling back to one also
/// releases it. `prepare` persists the overlay as a named batch which can be
/// committed or rolled back by name later, even after a restart.
pub struct KvSession {
    backend: Arc<dyn KvBackend>,
    overlay: Overlay,
    savepoints: Vec<(String, Overlay)>,
    cache: DatabaseCache<Vec<u8>>,
    active: bool,
}

impl KvSession {
    pub fn new(backend: Arc<dyn KvBackend>, cacheable_paths: &[String]) -> Self {
        Self {
            backend,
            overlay: Overlay::new(),
            savepoints: Vec::new(),
            cache: DatabaseCache::with_paths(cacheable_paths.iter().cloned()),
            active: false,
        }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn begin(&mut self) -> Result<(), StorageError> {
        if self.active {
            return Err(StorageError::TransactionActive);
        }
        self.overlay.clear();
        self.savepoints.clear();
        self.active = true;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), StorageError> {
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        let batch: Vec<BatchEntry> = std::mem::take(&mut self.overlay).into_iter().collect();
        self.backend.apply_batch(batch)?;
        self.savepoints.clear();
        self.active = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), StorageError> {
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        self.overlay.clear();
        self.savepoints.clear();
        self.cache.drop_all();
        self.active = false;
        Ok(())
    }

    pub fn savepoint(&mut self, name: &str) {
        trace!("savepoint {}", name);
        self.savepoints.push((name.to_string(), self.overlay.clone()));
    }

    /// Keeps the changes made since the savepoint and forgets the savepoint.
    pub fn release_savepoint(&mut self, name: &str) -> Result<(), StorageError> {
        trace!("release savepoint {}", name);
        let index = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| StorageError::UnknownSavepoint(name.to_string()))?;
        self.savepoints.truncate(index);
        Ok(())
    }

    /// Discards every change made since the savepoint (releasing it too).
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StorageError> {
        trace!("rollback to savepoint {}", name);
        let index = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| StorageError::UnknownSavepoint(name.to_string()))?;
        self.savepoints.truncate(index + 1);
        let (_, overlay) = self.savepoints.pop().expect("savepoint present");
        self.overlay = overlay;
        self.cache.drop_all();
        Ok(())
    }

    /// Persists the overlay as a named prepared batch and exhausts the
    /// session.
    pub fn prepare(&mut self, name: &str) -> Result<(), StorageError> {
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        let batch: Vec<BatchEntry> = std::mem::take(&mut self.overlay).into_iter().collect();
        self.backend.store_prepared(name, &batch.to_bytes())?;
        self.savepoints.clear();
        self.active = false;
        Ok(())
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(text_key) = cache_key(key) {
            if let Some(value) = self.cache.get(text_key) {
                return Ok(Some(value.clone()));
            }
        }

        let value = match self.overlay.get(key) {
            Some(pending) => pending.clone(),
            None => self.backend.get(key)?,
        };

        if let (Some(text_key), Some(value)) = (cache_key(key), &value) {
            self.cache.set(text_key, value.clone());
        }
        Ok(value)
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        if let Some(text_key) = cache_key(key) {
            self.cache.set(text_key, value.to_vec());
        }
        self.overlay.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    pub fn del(&mut self, key: &[u8]) -> Result<(), StorageError> {
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        if let Some(text_key) = cache_key(key) {
            self.cache.erase(text_key);
        }
        self.overlay.insert(key.to_vec(), None);
        Ok(())
    }

    /// Ordered view of every live entry under `prefix`: committed base merged
    /// with the session overlay.
    pub fn seek(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = self
            .backend
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(key, value)| (key, Some(value)))
            .collect();
        for (key, pending) in self.overlay.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.clone(), pending.clone());
        }
        Ok(merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect())
    }

    /// Tombstones every entry under `prefix` within this session.
    pub fn filter_delete(&mut self, prefix: &[u8]) -> Result<(), StorageError> {
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        for (key, _) in self.seek(prefix)? {
            self.overlay.insert(key, None);
        }
        if let Some(text_prefix) = cache_key(prefix) {
            self.cache.filter_delete(text_prefix);
        }
        Ok(())
    }
}

impl Drop for KvSession {
    fn drop(&mut self) {
        if self.active {
            warn!("KV session dropped with an open transaction, rolling back");
        }
    }
}

// The cache operates on canonical text paths only.
fn cache_key(key: &[u8]) -> Option<&str> {
    std::str::from_utf8(key).ok()
}
