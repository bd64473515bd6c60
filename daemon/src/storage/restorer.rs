//! Rebuilds the world state from the block store.
//!
//! Used at startup when the WSV is missing or lags behind the stored chain,
//! e.g. after a database wipe or a partial crash.

use std::sync::Arc;

use log::{info, warn};

use crate::storage::error::StorageError;
use crate::storage::ledger_state::LedgerState;
use crate::storage::storage::Storage;
use crate::storage::wsv::query;

/// Replays every stored block on top of a dropped WSV and commits the
/// result. Returns the restored ledger state, or `None` for an empty chain.
pub fn restore_wsv(storage: &Storage) -> Result<Option<Arc<LedgerState>>, StorageError> {
    let top_height = storage.top_height()?;
    info!("restoring world state from {} blocks", top_height);

    storage.reset()?;

    if top_height == 0 {
        return Ok(None);
    }

    let mut mutable = crate::storage::mutable_storage::MutableStorage::new(
        None,
        storage.create_command_executor(),
    )?;
    for height in 1..=top_height {
        let block = storage
            .get_block(height)?
            .ok_or_else(|| StorageError::NotFound(format!("block {}", height)))?;
        if !mutable.apply(&block) {
            warn!("failed to re-apply block {}", height);
            return Err(StorageError::Internal(format!(
                "world state restoration failed at height {}",
                height
            )));
        }
    }

    let ledger_state = mutable.ledger_state();
    // blocks are already stored, only the KV transaction needs committing
    let mut scratch = crate::storage::block_store::MemoryBlockStore::new();
    let state = mutable.commit(&mut scratch)?;
    debug_assert!(ledger_state.is_some());
    Ok(Some(state))
}

/// True when the WSV's top block lags behind the block store.
pub fn needs_restoration(storage: &Storage) -> Result<bool, StorageError> {
    let mut session =
        crate::storage::kv::KvSession::new(storage.backend(), &[]);
    let wsv_height = query::get_top_block_info(&mut session)?
        .map(|info| info.height)
        .unwrap_or(0);
    Ok(wsv_height < storage.top_height()?)
}
