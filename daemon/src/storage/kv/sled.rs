use std::path::Path;

use log::debug;
use sled::Tree;

use crate::storage::error::StorageError;
use crate::storage::kv::{BatchEntry, KvBackend};

const STATE_TREE: &str = "state";
const PREPARED_TREE: &str = "prepared";

/// Durable backend over a sled database.
///
/// The world state lives in one tree; prepared batches in a second one so a
/// keyspace wipe cannot lose an in-flight two-phase commit by accident.
pub struct SledBackend {
    state: Tree,
    prepared: Tree,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, StorageError> {
        debug!("opening state trees");
        Ok(Self {
            state: db.open_tree(STATE_TREE)?,
            prepared: db.open_tree(PREPARED_TREE)?,
        })
    }
}

impl KvBackend for SledBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.state.get(key)?.map(|value| value.to_vec()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut entries = Vec::new();
        for item in self.state.scan_prefix(prefix) {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn apply_batch(&self, batch: Vec<BatchEntry>) -> Result<(), StorageError> {
        let mut sled_batch = sled::Batch::default();
        for (key, value) in batch {
            match value {
                Some(value) => sled_batch.insert(key, value),
                None => sled_batch.remove(key),
            }
        }
        self.state.apply_batch(sled_batch)?;
        self.state.flush()?;
        Ok(())
    }

    fn store_prepared(&self, name: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.prepared.insert(name.as_bytes(), blob)?;
        self.prepared.flush()?;
        Ok(())
    }

    fn load_prepared(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.prepared.get(name.as_bytes())?.map(|value| value.to_vec()))
    }

    fn remove_prepared(&self, name: &str) -> Result<(), StorageError> {
        if self.prepared.remove(name.as_bytes())?.is_none() {
            return Err(StorageError::NoPreparedState);
        }
        self.prepared.flush()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.state.clear()?;
        self.prepared.clear()?;
        self.state.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_sled_backend_roundtrip() {
        let dir = TempDir::new("takara-kv").unwrap();
        let backend = SledBackend::open(dir.path()).unwrap();
        backend
            .apply_batch(vec![
                (b"a/1".to_vec(), Some(b"x".to_vec())),
                (b"a/2".to_vec(), Some(b"y".to_vec())),
                (b"b/1".to_vec(), Some(b"z".to_vec())),
            ])
            .unwrap();

        assert_eq!(backend.get(b"a/1").unwrap(), Some(b"x".to_vec()));
        let scanned = backend.scan_prefix(b"a/").unwrap();
        assert_eq!(scanned.len(), 2);

        backend
            .apply_batch(vec![(b"a/1".to_vec(), None)])
            .unwrap();
        assert_eq!(backend.get(b"a/1").unwrap(), None);
    }

    #[test]
    fn test_prepared_survives_reopen() {
        let dir = TempDir::new("takara-kv").unwrap();
        {
            let backend = SledBackend::open(dir.path()).unwrap();
            backend.store_prepared("block", b"blob").unwrap();
        }
        let backend = SledBackend::open(dir.path()).unwrap();
        assert_eq!(backend.load_prepared("block").unwrap(), Some(b"blob".to_vec()));
        backend.remove_prepared("block").unwrap();
        assert!(backend.load_prepared("block").unwrap().is_none());
    }
}
