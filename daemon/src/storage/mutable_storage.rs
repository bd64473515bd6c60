//! Accumulates block applications under one top-level KV transaction.

use std::sync::Arc;

use log::{error, info, warn};
use takara_common::block::Block;

use crate::storage::block_index::BlockIndex;
use crate::storage::block_store::{BlockStore, MemoryBlockStore};
use crate::storage::error::StorageError;
use crate::storage::executor::{execute_transaction, CommandExecutor};
use crate::storage::ledger_state::{LedgerState, TopBlockInfo};
use crate::storage::wsv::{command as wsv, query};

const BLOCK_SAVEPOINT: &str = "savepoint_block";

/// Predicate deciding whether a block may be applied on the current state.
pub type ApplyPredicate<'a> = &'a dyn Fn(&Block, &LedgerState) -> bool;

pub struct MutableStorage {
    ledger_state: Option<Arc<LedgerState>>,
    executor: CommandExecutor,
    block_index: BlockIndex,
    block_buffer: MemoryBlockStore,
    committed: bool,
}

impl MutableStorage {
    /// Begins the top-level transaction on the executor's session.
    pub fn new(
        ledger_state: Option<Arc<LedgerState>>,
        mut executor: CommandExecutor,
    ) -> Result<Self, StorageError> {
        executor.session().begin()?;
        Ok(Self {
            ledger_state,
            executor,
            block_index: BlockIndex::new(),
            block_buffer: MemoryBlockStore::new(),
            committed: false,
        })
    }

    pub fn ledger_state(&self) -> Option<Arc<LedgerState>> {
        self.ledger_state.clone()
    }

    /// Applies the block unconditionally.
    pub fn apply(&mut self, block: &Block) -> bool {
        self.apply_if(block, &|_, _| true)
    }

    /// Applies the block when `predicate` accepts it against the current
    /// ledger state. All effects of a failed application are rolled back.
    pub fn apply_if(&mut self, block: &Block, predicate: ApplyPredicate) -> bool {
        if self.committed {
            warn!("apply on an exhausted mutable storage");
            return false;
        }

        self.executor.session().savepoint(BLOCK_SAVEPOINT);
        match self.apply_block_if(block, predicate) {
            Ok(true) => {
                if let Err(e) = self.executor.session().release_savepoint(BLOCK_SAVEPOINT) {
                    error!("failed to release block savepoint: {}", e);
                    return false;
                }
                true
            }
            Ok(false) => {
                self.rollback_block_savepoint();
                false
            }
            Err(e) => {
                warn!("block application failed: {}", e);
                self.rollback_block_savepoint();
                false
            }
        }
    }

    fn rollback_block_savepoint(&mut self) {
        if let Err(e) = self.executor.session().rollback_to_savepoint(BLOCK_SAVEPOINT) {
            error!("failed to roll back block savepoint: {}", e);
        }
    }

    fn apply_block_if(
        &mut self,
        block: &Block,
        predicate: ApplyPredicate,
    ) -> Result<bool, StorageError> {
        info!("applying block: height {}, hash {}", block.height, block.hash());

        if let Some(state) = &self.ledger_state {
            if !predicate(block, state) {
                return Ok(false);
            }
        }

        for transaction in &block.transactions {
            // stateful validation of the whole block happened upstream
            if let Err(e) = execute_transaction(&mut self.executor, transaction, false) {
                error!("{}", e);
                return Ok(false);
            }
        }

        let info = TopBlockInfo::new(block.height, block.hash());
        wsv::set_top_block_info(self.executor.session(), &info)?;

        if !self.block_buffer.insert(block)? {
            return Ok(false);
        }
        self.block_index.index(self.executor.session(), block)?;

        let ledger_peers = query::get_peers(self.executor.session(), false)?;
        let syncing_peers = query::get_peers(self.executor.session(), true)?;
        self.ledger_state = Some(Arc::new(LedgerState::new(ledger_peers, syncing_peers, info)));
        Ok(true)
    }

    /// Moves the buffered blocks into `block_store` and commits the KV
    /// transaction. A second commit fails without touching any state.
    pub fn commit(
        &mut self,
        block_store: &mut dyn BlockStore,
    ) -> Result<Arc<LedgerState>, StorageError> {
        if self.committed {
            return Err(StorageError::Internal(
                "tried to commit mutable storage twice".to_string(),
            ));
        }
        let ledger_state = self.ledger_state.clone().ok_or_else(|| {
            StorageError::Internal("tried to commit mutable storage with no blocks applied".to_string())
        })?;

        let mut insert_error = None;
        self.block_buffer.for_each(&mut |block| {
            if !block_store.insert(&block)? {
                insert_error = Some(format!("failed to insert block {}", block));
            }
            Ok(())
        })?;
        if let Some(message) = insert_error {
            self.executor.session().rollback()?;
            self.committed = true;
            return Err(StorageError::Internal(message));
        }

        self.executor.session().commit()?;
        self.committed = true;
        Ok(ledger_state)
    }
}

impl Drop for MutableStorage {
    fn drop(&mut self) {
        if !self.committed && self.executor.session().is_active() {
            if let Err(e) = self.executor.session().rollback() {
                warn!("mutable storage rollback failed: {}", e);
            }
        }
    }
}
