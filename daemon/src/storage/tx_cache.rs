//! Answers "was this transaction seen before?" from the block index, with a
//! small memory cache in front since duplicate checks hit the same hashes
//! repeatedly.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use takara_common::crypto::Hash;

use crate::storage::block_index::{self, TxPosition};
use crate::storage::error::StorageError;
use crate::storage::kv::{KvBackend, KvSession};

const CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Committed(TxPosition),
    Rejected(TxPosition),
    Missing,
}

pub struct TxPresenceCache {
    backend: Arc<dyn KvBackend>,
    cache: LruCache<Hash, TxStatus>,
}

impl TxPresenceCache {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            cache: LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).expect("non-zero capacity")),
        }
    }

    pub fn check(&mut self, hash: &Hash) -> Result<TxStatus, StorageError> {
        if let Some(status) = self.cache.get(hash) {
            // a missing transaction may have been committed since
            if !matches!(status, TxStatus::Missing) {
                return Ok(*status);
            }
        }

        let mut session = KvSession::new(self.backend.clone(), &[]);
        let status = if let Some(record) = block_index::get_committed_tx(&mut session, hash)? {
            TxStatus::Committed(record.position)
        } else if let Some(record) = block_index::get_rejected_tx(&mut session, hash)? {
            TxStatus::Rejected(record.position)
        } else {
            TxStatus::Missing
        };
        self.cache.put(hash.clone(), status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_index::BlockIndex;
    use crate::storage::kv::MemoryBackend;
    use takara_common::block::Block;
    use takara_common::transaction::Transaction;

    #[test]
    fn test_status_transitions() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let mut cache = TxPresenceCache::new(backend.clone());

        let tx = Transaction::new("alice@wonderland".parse().unwrap(), 5, Vec::new());
        let hash = tx.hash();
        assert_eq!(cache.check(&hash).unwrap(), TxStatus::Missing);

        let block = Block::new(1, Hash::zero(), 0, vec![tx], Vec::new());
        let mut session = KvSession::new(backend, &[]);
        session.begin().unwrap();
        BlockIndex::new().index(&mut session, &block).unwrap();
        session.commit().unwrap();

        match cache.check(&hash).unwrap() {
            TxStatus::Committed(position) => assert_eq!(position.height, 1),
            other => panic!("unexpected status {:?}", other),
        }
    }
}
