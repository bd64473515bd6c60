//! Wires the storage stack, the voting engine, the gate and the
//! synchronizer into one node.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use takara_common::crypto::KeyPair;
use takara_common::model::Peer;
use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::consensus::cluster_order::ClusterOrdering;
use crate::consensus::crypto::VoteCryptoProvider;
use crate::consensus::gate::{DelayFunc, YacGate};
use crate::consensus::messages::{BlockCreatorEvent, RoundData, VoteMessage};
use crate::consensus::result_cache::ConsensusResultCache;
use crate::consensus::round::Round;
use crate::consensus::supermajority::SupermajorityChecker;
use crate::consensus::vote_storage::YacVoteStorage;
use crate::consensus::yac::Yac;
use crate::event_bus::EventBus;
use crate::network::block_loader::BlockLoader;
use crate::network::YacNetwork;
use crate::storage::block_store::BlockStore;
use crate::storage::error::StorageError;
use crate::storage::kv::KvBackend;
use crate::storage::storage::{Storage, StorageOptions};
use crate::sync::chain_validator::ChainValidator;
use crate::sync::synchronizer::Synchronizer;

pub struct Node {
    pub keypair: Arc<KeyPair>,
    pub bus: Arc<EventBus>,
    pub storage: Arc<Storage>,
    pub yac: Arc<Yac>,
    pub gate: Arc<YacGate>,
    pub synchronizer: Arc<Synchronizer>,
    pub result_cache: Arc<ConsensusResultCache>,
}

impl Node {
    pub fn build(
        config: &NodeConfig,
        keypair: Arc<KeyPair>,
        backend: Arc<dyn KvBackend>,
        block_store: Box<dyn BlockStore>,
        network: Arc<dyn YacNetwork>,
        block_loader: Arc<dyn BlockLoader>,
    ) -> Result<Self, StorageError> {
        let bus = Arc::new(EventBus::new());
        let options: StorageOptions = config.storage_options();
        let storage = Arc::new(Storage::new(backend, block_store, bus.clone(), options)?);

        let checker = SupermajorityChecker::new(config.consistency_model);
        let result_cache = Arc::new(ConsensusResultCache::new());

        // before any peer is on the ledger the node orders only itself
        let own_peer = Peer::new(keypair.public_key(), config.listen_address.clone());
        let initial_peers = match storage.peers(false) {
            Ok(peers) if !peers.is_empty() => peers,
            _ => vec![own_peer],
        };
        let initial_round = storage
            .ledger_state()
            .map(|state| Round::new(state.top_block_info.height + 1, 0))
            .unwrap_or_else(|| Round::new(1, 0));
        let order = ClusterOrdering::create(initial_peers)
            .ok_or_else(|| StorageError::Internal("no peers to order".to_string()))?;

        let crypto = Arc::new(VoteCryptoProvider::new(keypair.clone()));
        let yac = Yac::new(
            YacVoteStorage::new(checker),
            network,
            crypto,
            Duration::from_millis(config.vote_delay_ms),
            config.rotate_period,
            order,
            initial_round,
            bus.clone(),
        );

        let delay_func: DelayFunc = Arc::new(|_| Duration::ZERO);
        let gate = YacGate::new(
            yac.clone(),
            keypair.clone(),
            result_cache.clone(),
            bus.clone(),
            delay_func,
        );

        let synchronizer = Synchronizer::new(
            storage.clone(),
            ChainValidator::new(checker),
            block_loader,
            bus.clone(),
        );

        Ok(Self {
            keypair,
            bus,
            storage,
            yac,
            gate,
            synchronizer,
            result_cache,
        })
    }

    /// Spawns the gate and synchronizer listeners.
    pub fn start(&self) {
        self.gate.start();
        self.synchronizer.start();
        info!("node {} started", self.keypair.public_key());
    }

    pub fn stop(&self) {
        self.gate.stop();
    }

    /// Forwards inbound vote batches into the engine.
    pub fn spawn_vote_pump(&self, mut votes: mpsc::UnboundedReceiver<Vec<VoteMessage>>) {
        let yac = self.yac.clone();
        tokio::spawn(async move {
            while let Some(batch) = votes.recv().await {
                yac.on_state(batch);
            }
        });
    }

    /// Block-creator seam: announces the next round's candidate (or the
    /// lack of one) to the gate.
    pub fn propose(&self, round_data: Option<RoundData>) -> Result<(), StorageError> {
        let ledger_state = self
            .storage
            .ledger_state()
            .ok_or_else(|| StorageError::Internal("no ledger state yet".to_string()))?;
        let round = Round::new(ledger_state.top_block_info.height + 1, 0);
        self.bus.publish_block_creator_event(BlockCreatorEvent {
            round,
            ledger_state,
            round_data,
        });
        Ok(())
    }
}
