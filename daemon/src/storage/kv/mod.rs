//! Ordered key-value port behind the world state.
//!
//! A [`KvBackend`] provides durable, atomic-batch storage. A [`KvSession`]
//! layers one transaction on top of it: an ordered overlay of pending writes,
//! named savepoints (snapshots of the overlay), and named two-phase prepared
//! batches which survive a restart.
//!
//! Sessions assume a single writer: while a session holds uncommitted writes,
//! nothing else commits into the same keyspace. The storage facade serializes
//! workflows to uphold that.

mod memory;
mod session;
mod sled;

pub use memory::MemoryBackend;
pub use session::KvSession;
pub use sled::SledBackend;

use std::sync::Arc;

use takara_common::serializer::Serializer;

use crate::storage::error::StorageError;

/// One pending write: `None` value is a tombstone.
pub type BatchEntry = (Vec<u8>, Option<Vec<u8>>);

pub trait KvBackend: Send + Sync + 'static {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// All entries whose key starts with `prefix`, ascending by key.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Applies all writes atomically.
    fn apply_batch(&self, batch: Vec<BatchEntry>) -> Result<(), StorageError>;

    /// Durably stores a named prepared batch blob.
    fn store_prepared(&self, name: &str, blob: &[u8]) -> Result<(), StorageError>;

    fn load_prepared(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn remove_prepared(&self, name: &str) -> Result<(), StorageError>;

    /// Drops the whole keyspace (prepared blobs included).
    fn clear(&self) -> Result<(), StorageError>;
}

/// Completes a prepared transaction by name.
pub fn commit_prepared(backend: &Arc<dyn KvBackend>, name: &str) -> Result<(), StorageError> {
    let blob = backend
        .load_prepared(name)?
        .ok_or(StorageError::NoPreparedState)?;
    let batch = Vec::<BatchEntry>::from_bytes(&blob)?;
    backend.apply_batch(batch)?;
    backend.remove_prepared(name)
}

/// Discards a prepared transaction, e.g. on recovery after a crash.
pub fn rollback_prepared(backend: &Arc<dyn KvBackend>, name: &str) -> Result<(), StorageError> {
    backend.remove_prepared(name)
}
