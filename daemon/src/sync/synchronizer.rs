//! Acts on consensus gate objects: commits the block the node voted for or
//! downloads the missing chain from the peers that signed the outcome.

use std::sync::Arc;

use futures::StreamExt;
use log::{error, info, warn};
use takara_common::block::Block;
use takara_common::crypto::PublicKey;

use crate::consensus::messages::{GateObject, SyncEvent, SyncOutcomeType};
use crate::consensus::round::Round;
use crate::event_bus::EventBus;
use crate::network::block_loader::BlockLoader;
use crate::storage::ledger_state::LedgerState;
use crate::storage::storage::Storage;
use crate::sync::chain_validator::ChainValidator;
use crate::sync::SyncError;

pub struct Synchronizer {
    storage: Arc<Storage>,
    validator: ChainValidator,
    block_loader: Arc<dyn BlockLoader>,
    bus: Arc<EventBus>,
}

impl Synchronizer {
    pub fn new(
        storage: Arc<Storage>,
        validator: ChainValidator,
        block_loader: Arc<dyn BlockLoader>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            validator,
            block_loader,
            bus,
        })
    }

    /// Spawns the gate-object listener.
    pub fn start(self: &Arc<Self>) {
        let synchronizer = self.clone();
        let mut gate_objects = self.bus.subscribe_gate_objects();
        tokio::spawn(async move {
            while let Ok(object) = gate_objects.recv().await {
                synchronizer.process_outcome(object).await;
            }
        });
    }

    pub async fn process_outcome(&self, object: GateObject) {
        info!("processing consensus outcome for round {}", object.round());
        match object {
            GateObject::PairValid {
                round,
                ledger_state: _,
                block,
            } => self.process_next(round, block).await,
            GateObject::VoteOther {
                round,
                ledger_state,
                public_keys,
                ..
            } => {
                self.process_different(round, ledger_state, public_keys, round.block_round)
                    .await
            }
            GateObject::Future {
                round,
                ledger_state,
                public_keys,
            } => {
                // the quorum of round n is unknown to us, so only the blocks
                // up to n−1 can be claimed committed
                self.process_different(round, ledger_state, public_keys, round.block_round - 1)
                    .await
            }
            GateObject::ProposalReject {
                round,
                ledger_state,
                ..
            }
            | GateObject::BlockReject {
                round,
                ledger_state,
                ..
            } => self.emit(SyncOutcomeType::Reject, round, ledger_state),
            GateObject::AgreementOnNone {
                round,
                ledger_state,
                ..
            } => self.emit(SyncOutcomeType::Nothing, round, ledger_state),
        }
    }

    fn emit(&self, outcome: SyncOutcomeType, round: Round, ledger_state: Arc<LedgerState>) {
        self.bus.publish_sync_event(SyncEvent {
            outcome,
            round,
            ledger_state,
        });
    }

    // the node voted for the winning block: commit it locally
    async fn process_next(&self, round: Round, block: Block) {
        if self.storage.prepared_commit_enabled() {
            match self.storage.commit_prepared(&block) {
                Ok(new_state) => {
                    self.emit(SyncOutcomeType::Commit, round, new_state);
                    return;
                }
                Err(e) => warn!("error committing the prepared block: {}", e),
            }
        }

        let mutable = match self.storage.create_mutable_storage() {
            Ok(mutable) => mutable,
            Err(e) => {
                error!("failed to create mutable storage: {}", e);
                return;
            }
        };
        let mut mutable = mutable;
        if !mutable.apply(&block) {
            warn!("block was not committed due to a failure in mutable storage");
            return;
        }
        match self.storage.commit(mutable) {
            Ok(new_state) => self.emit(SyncOutcomeType::Commit, round, new_state),
            Err(e) => error!("failed to commit mutable storage: {}", e),
        }
    }

    // the chain is behind: pull blocks from the peers that signed the outcome
    async fn process_different(
        &self,
        round: Round,
        ledger_state: Arc<LedgerState>,
        public_keys: Vec<PublicKey>,
        target_height: u64,
    ) {
        let start_height = ledger_state.top_block_info.height;
        match self
            .download_and_commit_missing_blocks(start_height, target_height, &public_keys)
            .await
        {
            Ok(new_state) => {
                let new_height = new_state.top_block_info.height;
                let round = if new_height != round.block_round {
                    Round::new(new_height, 0)
                } else {
                    round
                };
                self.emit(SyncOutcomeType::Commit, round, new_state);
            }
            Err(e) => error!("synchronization failed: {}", e),
        }
    }

    /// Tries each candidate peer in turn, chain-validating and applying the
    /// streamed blocks. A block that fails to apply backs the resume height
    /// off by one (never below `start_height`) before the next peer is
    /// asked.
    pub async fn download_and_commit_missing_blocks(
        &self,
        start_height: u64,
        target_height: u64,
        public_keys: &[PublicKey],
    ) -> Result<Arc<LedgerState>, SyncError> {
        let mut mutable = self.storage.create_mutable_storage()?;
        let mut my_height = start_height;

        for public_key in public_keys {
            info!(
                "trying to download blocks {}..={} from peer {}",
                my_height + 1,
                target_height,
                public_key
            );
            let mut chain = self.block_loader.retrieve_blocks(my_height, public_key).await;

            let mut all_applied = true;
            while let Some(block) = chain.next().await {
                my_height = block.height;
                let applied =
                    mutable.apply_if(&block, &|b, s| self.validator.validate_block(b, s));
                if !applied {
                    all_applied = false;
                    break;
                }
            }

            if all_applied {
                if my_height >= target_height {
                    return Ok(self.storage.commit(mutable)?);
                }
                // the peer ran out of blocks early; keep what applied and ask
                // the next one
            } else {
                // the failed block has to be requested again
                my_height = my_height.saturating_sub(1).max(start_height);
            }
        }
        Err(SyncError::PeersExhausted)
    }
}
