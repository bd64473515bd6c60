//! Append-only block storage keyed by height.
//!
//! Heights are contiguous starting at 1. `insert` refuses duplicates and
//! gaps by returning `false`; iteration always yields blocks in height
//! order.

use std::path::Path;

use log::{trace, warn};
use sled::Tree;
use takara_common::block::Block;
use takara_common::serializer::{Reader, Serializer, Writer};

use crate::storage::error::StorageError;

pub trait BlockStore: Send + Sync {
    /// Appends a block; `false` when its height is already present or does
    /// not extend the chain.
    fn insert(&mut self, block: &Block) -> Result<bool, StorageError>;

    fn fetch(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// Current top height (and the number of stored blocks).
    fn size(&self) -> Result<u64, StorageError>;

    fn clear(&mut self) -> Result<(), StorageError>;

    fn for_each(
        &self,
        visitor: &mut dyn FnMut(Block) -> Result<(), StorageError>,
    ) -> Result<(), StorageError>;
}

/// Volatile store used as the private buffer of a mutable storage and in
/// tests.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: Vec<Block>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn insert(&mut self, block: &Block) -> Result<bool, StorageError> {
        if block.height != self.blocks.len() as u64 + 1 {
            trace!(
                "rejecting block at height {} on top of {}",
                block.height,
                self.blocks.len()
            );
            return Ok(false);
        }
        self.blocks.push(block.clone());
        Ok(true)
    }

    fn fetch(&self, height: u64) -> Result<Option<Block>, StorageError> {
        if height == 0 {
            return Ok(None);
        }
        Ok(self.blocks.get(height as usize - 1).cloned())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.blocks.len() as u64)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.blocks.clear();
        Ok(())
    }

    fn for_each(
        &self,
        visitor: &mut dyn FnMut(Block) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        for block in &self.blocks {
            visitor(block.clone())?;
        }
        Ok(())
    }
}

/// Durable store: one length-prefixed serialized block per height.
pub struct SledBlockStore {
    tree: Tree,
}

impl SledBlockStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self {
            tree: db.open_tree("blocks")?,
        })
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree("blocks")?,
        })
    }

    fn encode(block: &Block) -> Vec<u8> {
        let body = block.to_bytes();
        let mut writer = Writer::with_capacity(4 + body.len());
        writer.write_u32(body.len() as u32);
        writer.write_bytes(&body);
        writer.into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Block, StorageError> {
        let mut reader = Reader::new(bytes);
        let length = reader.read_u32()? as usize;
        let body = reader.read_bytes(length)?;
        Ok(Block::from_bytes(&body)?)
    }
}

impl BlockStore for SledBlockStore {
    fn insert(&mut self, block: &Block) -> Result<bool, StorageError> {
        let expected = self.size()? + 1;
        if block.height != expected {
            warn!(
                "rejecting block at height {}, expected {}",
                block.height, expected
            );
            return Ok(false);
        }
        self.tree
            .insert(block.height.to_be_bytes(), Self::encode(block))?;
        self.tree.flush()?;
        Ok(true)
    }

    fn fetch(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.tree.get(height.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.tree.len() as u64)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }

    fn for_each(
        &self,
        visitor: &mut dyn FnMut(Block) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        for item in self.tree.iter() {
            let (_, bytes) = item?;
            visitor(Self::decode(&bytes)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takara_common::crypto::Hash;
    use tempdir::TempDir;

    fn block(height: u64, prev: Hash) -> Block {
        Block::new(height, prev, height * 1000, Vec::new(), Vec::new())
    }

    fn chain(n: u64) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut prev = Hash::zero();
        for height in 1..=n {
            let b = block(height, prev.clone());
            prev = b.hash();
            blocks.push(b);
        }
        blocks
    }

    fn exercise(store: &mut dyn BlockStore) {
        let blocks = chain(3);
        for b in &blocks {
            assert!(store.insert(b).unwrap());
        }
        assert_eq!(store.size().unwrap(), 3);

        // duplicate height is refused
        assert!(!store.insert(&blocks[2]).unwrap());
        // gap is refused
        assert!(!store.insert(&block(7, Hash::zero())).unwrap());

        assert_eq!(store.fetch(2).unwrap().unwrap(), blocks[1]);
        assert!(store.fetch(9).unwrap().is_none());

        let mut heights = Vec::new();
        store
            .for_each(&mut |b| {
                heights.push(b.height);
                Ok(())
            })
            .unwrap();
        assert_eq!(heights, vec![1, 2, 3]);

        store.clear().unwrap();
        assert_eq!(store.size().unwrap(), 0);
    }

    #[test]
    fn test_memory_store_contract() {
        exercise(&mut MemoryBlockStore::new());
    }

    #[test]
    fn test_sled_store_contract() {
        let dir = TempDir::new("takara-blocks").unwrap();
        exercise(&mut SledBlockStore::open(dir.path()).unwrap());
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = TempDir::new("takara-blocks").unwrap();
        let blocks = chain(2);
        {
            let mut store = SledBlockStore::open(dir.path()).unwrap();
            for b in &blocks {
                store.insert(b).unwrap();
            }
        }
        let store = SledBlockStore::open(dir.path()).unwrap();
        assert_eq!(store.size().unwrap(), 2);
        assert_eq!(store.fetch(1).unwrap().unwrap(), blocks[0]);
    }
}
