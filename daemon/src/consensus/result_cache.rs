//! Latest block this node voted for, kept so an incoming single-block
//! request can be served without touching persistent storage.

use std::sync::{Arc, Mutex};

use takara_common::block::Block;

#[derive(Default)]
pub struct ConsensusResultCache {
    block: Mutex<Option<Arc<Block>>>,
}

impl ConsensusResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block: Arc<Block>) {
        if let Ok(mut guard) = self.block.lock() {
            *guard = Some(block);
        }
    }

    pub fn get(&self) -> Option<Arc<Block>> {
        self.block.lock().ok().and_then(|guard| guard.clone())
    }

    /// Clears the cache, e.g. once the block made it to durable storage.
    pub fn release(&self) {
        if let Ok(mut guard) = self.block.lock() {
            *guard = None;
        }
    }
}
