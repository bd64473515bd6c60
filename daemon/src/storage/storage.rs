//! Storage facade: owns the KV backend and the block store, hands out
//! executors and mutable storages, publishes committed blocks, and drives
//! the prepared-block fast path.

use std::sync::{Arc, Mutex, RwLock};

use log::{info, warn};
use takara_common::block::Block;
use takara_common::crypto::Hash;
use takara_common::model::Peer;

use crate::event_bus::EventBus;
use crate::storage::block_index::{BlockIndex, INDEX_ROOT};
use crate::storage::block_store::BlockStore;
use crate::storage::error::StorageError;
use crate::storage::executor::{CommandExecutor, TemporaryWsv, VmCaller};
use crate::storage::kv::{self, KvBackend, KvSession};
use crate::storage::ledger_state::{LedgerState, TopBlockInfo};
use crate::storage::mutable_storage::MutableStorage;
use crate::storage::wsv::{command as wsv, paths, query};

const PREPARED_BLOCK_NAME: &str = "prepared_block";

#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub prepared_commits_enabled: bool,
    pub cacheable_paths: Vec<String>,
}

pub struct Storage {
    backend: Arc<dyn KvBackend>,
    block_store: Mutex<Box<dyn BlockStore>>,
    ledger_state: RwLock<Option<Arc<LedgerState>>>,
    bus: Arc<EventBus>,
    prepared_blocks_enabled: bool,
    block_is_prepared: Mutex<bool>,
    cacheable_paths: Vec<String>,
    vm_caller: Option<Arc<dyn VmCaller>>,
}

impl Storage {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        block_store: Box<dyn BlockStore>,
        bus: Arc<EventBus>,
        options: StorageOptions,
    ) -> Result<Self, StorageError> {
        // a prepared transaction left over from a crash is unusable
        match kv::rollback_prepared(&backend, PREPARED_BLOCK_NAME) {
            Ok(()) => warn!("discarded a stale prepared transaction"),
            Err(StorageError::NoPreparedState) => {}
            Err(e) => return Err(e),
        }

        let storage = Self {
            backend,
            block_store: Mutex::new(block_store),
            ledger_state: RwLock::new(None),
            bus,
            prepared_blocks_enabled: options.prepared_commits_enabled,
            block_is_prepared: Mutex::new(false),
            cacheable_paths: options.cacheable_paths,
            vm_caller: None,
        };
        storage.reload_ledger_state()?;
        Ok(storage)
    }

    pub fn with_vm_caller(mut self, vm_caller: Arc<dyn VmCaller>) -> Self {
        self.vm_caller = Some(vm_caller);
        self
    }

    pub fn backend(&self) -> Arc<dyn KvBackend> {
        self.backend.clone()
    }

    pub fn ledger_state(&self) -> Option<Arc<LedgerState>> {
        self.ledger_state.read().ok().and_then(|guard| guard.clone())
    }

    pub fn prepared_commit_enabled(&self) -> bool {
        self.prepared_blocks_enabled
    }

    // ------ factories ------

    pub fn create_command_executor(&self) -> CommandExecutor {
        let executor = CommandExecutor::new(self.backend.clone(), &self.cacheable_paths);
        match &self.vm_caller {
            Some(vm_caller) => executor.with_vm_caller(vm_caller.clone()),
            None => executor,
        }
    }

    pub fn create_mutable_storage(&self) -> Result<MutableStorage, StorageError> {
        MutableStorage::new(self.ledger_state(), self.create_command_executor())
    }

    pub fn create_temporary_wsv(&self) -> Result<TemporaryWsv, StorageError> {
        TemporaryWsv::new(self.create_command_executor())
    }

    // ------ commit paths ------

    /// Commits a mutable storage and publishes every newly stored block in
    /// height order.
    pub fn commit(&self, mut mutable: MutableStorage) -> Result<Arc<LedgerState>, StorageError> {
        let mut store = self.lock_block_store()?;
        let old_height = store.size()?;
        let ledger_state = mutable.commit(store.as_mut())?;
        let new_height = store.size()?;

        self.set_ledger_state(ledger_state.clone())?;
        for height in old_height + 1..=new_height {
            let block = store
                .fetch(height)?
                .ok_or_else(|| StorageError::Internal(format!("missing block {}", height)))?;
            self.bus.publish_block(Arc::new(block));
        }
        Ok(ledger_state)
    }

    /// Applies and commits one block through a fresh mutable storage.
    pub fn insert_block(&self, block: &Block) -> Result<Arc<LedgerState>, StorageError> {
        let mut mutable = self.create_mutable_storage()?;
        if !mutable.apply(block) {
            return Err(StorageError::PreconditionFailed(
                "stateful validation failed".to_string(),
            ));
        }
        self.commit(mutable)
    }

    /// Promotes the temporary WSV's pending state to a named durable
    /// prepared transaction.
    pub fn prepare_block(&self, temp_wsv: TemporaryWsv) {
        if !self.prepared_blocks_enabled {
            warn!("prepared blocks are not enabled");
            return;
        }
        let mut prepared = match self.block_is_prepared.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if *prepared {
            warn!("refusing to prepare a state: there already is one");
            return;
        }
        let mut executor = temp_wsv.into_executor();
        match executor.session().prepare(PREPARED_BLOCK_NAME) {
            Ok(()) => {
                *prepared = true;
                info!("state prepared successfully");
            }
            Err(e) => warn!("failed to prepare state: {}", e),
        }
    }

    /// Fast path: completes the prepared transaction for the block the node
    /// voted for, indexes it and publishes the commit.
    pub fn commit_prepared(&self, block: &Block) -> Result<Arc<LedgerState>, StorageError> {
        if !self.prepared_blocks_enabled {
            return Err(StorageError::PreconditionFailed(
                "prepared blocks are not enabled".to_string(),
            ));
        }
        let mut prepared = self
            .block_is_prepared
            .lock()
            .map_err(|_| StorageError::Internal("prepared flag lock poisoned".to_string()))?;
        if !*prepared {
            return Err(StorageError::NoPreparedState);
        }

        info!("applying prepared block {}", block.hash());
        let mut store = self.lock_block_store()?;
        if !store.insert(block)? {
            return Err(StorageError::Internal(format!(
                "failed to insert block {}",
                block
            )));
        }
        kv::commit_prepared(&self.backend, PREPARED_BLOCK_NAME)?;
        *prepared = false;

        let mut session = self.create_session();
        session.begin()?;
        BlockIndex::new().index(&mut session, block)?;
        let info = TopBlockInfo::new(block.height, block.hash());
        wsv::set_top_block_info(&mut session, &info)?;
        session.commit()?;

        let ledger_state = self.snapshot_ledger_state(info)?;
        self.set_ledger_state(ledger_state.clone())?;
        self.bus.publish_block(Arc::new(block.clone()));
        Ok(ledger_state)
    }

    // ------ facets ------

    pub fn top_height(&self) -> Result<u64, StorageError> {
        self.lock_block_store()?.size()
    }

    pub fn get_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        self.lock_block_store()?.fetch(height)
    }

    pub fn peers(&self, syncing: bool) -> Result<Vec<Peer>, StorageError> {
        let mut session = self.create_session();
        query::get_peers(&mut session, syncing)
    }

    pub fn top_block_info(&self) -> Result<Option<TopBlockInfo>, StorageError> {
        let mut session = self.create_session();
        query::get_top_block_info(&mut session)
    }

    pub fn on_commit(&self) -> tokio::sync::broadcast::Receiver<Arc<Block>> {
        self.bus.subscribe_blocks()
    }

    // ------ maintenance ------

    /// Drops the world state and the indices, keeping the block store.
    pub fn reset(&self) -> Result<(), StorageError> {
        info!("reset: dropping world state");
        let mut session = self.create_session();
        session.begin()?;
        session.filter_delete(paths::WSV_ROOT.as_bytes())?;
        session.filter_delete(INDEX_ROOT.as_bytes())?;
        session.commit()?;
        self.clear_ledger_state()
    }

    /// Drops only the stored peer list.
    pub fn reset_peers(&self) -> Result<(), StorageError> {
        info!("reset peers");
        let mut session = self.create_session();
        session.begin()?;
        session.filter_delete(paths::PEERS_PREFIX.as_bytes())?;
        session.commit()
    }

    /// Drops everything: world state, indices and blocks.
    pub fn drop_storage(&self) -> Result<(), StorageError> {
        info!("drop storage");
        self.backend.clear()?;
        self.lock_block_store()?.clear()?;
        self.clear_ledger_state()
    }

    // ------ internals ------

    fn create_session(&self) -> KvSession {
        KvSession::new(self.backend.clone(), &self.cacheable_paths)
    }

    fn lock_block_store(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Box<dyn BlockStore>>, StorageError> {
        self.block_store
            .lock()
            .map_err(|_| StorageError::Internal("block store lock poisoned".to_string()))
    }

    fn set_ledger_state(&self, state: Arc<LedgerState>) -> Result<(), StorageError> {
        let mut guard = self
            .ledger_state
            .write()
            .map_err(|_| StorageError::Internal("ledger state lock poisoned".to_string()))?;
        *guard = Some(state);
        Ok(())
    }

    fn clear_ledger_state(&self) -> Result<(), StorageError> {
        let mut guard = self
            .ledger_state
            .write()
            .map_err(|_| StorageError::Internal("ledger state lock poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }

    fn snapshot_ledger_state(&self, info: TopBlockInfo) -> Result<Arc<LedgerState>, StorageError> {
        let mut session = self.create_session();
        let ledger_peers = query::get_peers(&mut session, false)?;
        let syncing_peers = query::get_peers(&mut session, true)?;
        Ok(Arc::new(LedgerState::new(ledger_peers, syncing_peers, info)))
    }

    fn reload_ledger_state(&self) -> Result<(), StorageError> {
        let mut session = self.create_session();
        if let Some(info) = query::get_top_block_info(&mut session)? {
            info!("recovered ledger state at height {}", info.height);
            let state = self.snapshot_ledger_state(info)?;
            self.set_ledger_state(state)?;
        }
        Ok(())
    }
}

/// Genesis bootstrap: the very first block carries its own authorities, so
/// it is applied without stateful validation on an empty world state.
pub fn insert_genesis(storage: &Storage, genesis: &Block) -> Result<Arc<LedgerState>, StorageError> {
    if genesis.height != takara_common::block::GENESIS_HEIGHT
        || genesis.prev_hash != Hash::zero()
    {
        return Err(StorageError::PreconditionFailed(
            "genesis block must start the chain".to_string(),
        ));
    }
    if storage.top_height()? != 0 {
        return Err(StorageError::AlreadyExists("genesis block".to_string()));
    }
    storage.insert_block(genesis)
}
