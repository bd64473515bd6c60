//! Block download from peers.
//!
//! The serving side streams blocks from its store starting after the
//! requested height; a single-block request for the block currently in
//! consensus is answered from the result cache without touching storage.
//! The client side stateless-validates every received block and ends the
//! stream at the first invalid one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, warn};
use takara_common::block::Block;
use takara_common::crypto::PublicKey;

use crate::consensus::result_cache::ConsensusResultCache;
use crate::storage::error::StorageError;
use crate::storage::storage::Storage;

#[async_trait]
pub trait BlockLoader: Send + Sync {
    /// Blocks after `height` from the given peer, ascending. The stream
    /// ends early when the peer runs out of blocks or sends garbage.
    async fn retrieve_blocks(&self, height: u64, peer: &PublicKey) -> BoxStream<'static, Block>;

    /// One block at an exact height.
    async fn retrieve_block(&self, peer: &PublicKey, height: u64) -> Option<Block>;
}

/// A block is acceptable from the wire when all its signatures check out.
pub fn stateless_valid(block: &Block) -> bool {
    if !block.signatures_valid() {
        warn!("block {} carries an invalid signature", block.height);
        return false;
    }
    if !block
        .transactions
        .iter()
        .all(|transaction| transaction.signatures_valid())
    {
        warn!("block {} carries a transaction with bad signatures", block.height);
        return false;
    }
    true
}

/// Serving side, shared by every transport.
pub struct BlockLoaderService {
    storage: Arc<Storage>,
    result_cache: Arc<ConsensusResultCache>,
}

impl BlockLoaderService {
    pub fn new(storage: Arc<Storage>, result_cache: Arc<ConsensusResultCache>) -> Self {
        Self {
            storage,
            result_cache,
        }
    }

    /// Every stored block above `height`, in order.
    pub fn blocks_after(&self, height: u64) -> Result<Vec<Block>, StorageError> {
        let top = self.storage.top_height()?;
        let mut blocks = Vec::new();
        for h in height + 1..=top {
            match self.storage.get_block(h)? {
                Some(block) => blocks.push(block),
                None => break,
            }
        }
        Ok(blocks)
    }

    pub fn get_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        if let Some(cached) = self.result_cache.get() {
            if cached.height == height {
                debug!("block {} served from the consensus cache", height);
                return Ok(Some((*cached).clone()));
            }
        }
        self.storage.get_block(height)
    }
}

/// In-process loader client backed by the serving peers' services.
#[derive(Default)]
pub struct LocalBlockLoader {
    services: Mutex<HashMap<PublicKey, Arc<BlockLoaderService>>>,
}

impl LocalBlockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, public_key: PublicKey, service: Arc<BlockLoaderService>) {
        if let Ok(mut services) = self.services.lock() {
            services.insert(public_key, service);
        }
    }

    fn service(&self, public_key: &PublicKey) -> Option<Arc<BlockLoaderService>> {
        self.services
            .lock()
            .ok()
            .and_then(|services| services.get(public_key).cloned())
    }
}

#[async_trait]
impl BlockLoader for LocalBlockLoader {
    async fn retrieve_blocks(&self, height: u64, peer: &PublicKey) -> BoxStream<'static, Block> {
        let blocks = match self.service(peer) {
            Some(service) => service.blocks_after(height).unwrap_or_else(|e| {
                warn!("peer {} failed to serve blocks: {}", peer, e);
                Vec::new()
            }),
            None => {
                debug!("no loader route to {}", peer);
                Vec::new()
            }
        };
        stream::iter(blocks)
            .take_while(|block| futures::future::ready(stateless_valid(block)))
            .boxed()
    }

    async fn retrieve_block(&self, peer: &PublicKey, height: u64) -> Option<Block> {
        let service = self.service(peer)?;
        match service.get_block(height) {
            Ok(block) => block.filter(stateless_valid),
            Err(e) => {
                warn!("peer {} failed to serve block {}: {}", peer, height, e);
                None
            }
        }
    }
}
