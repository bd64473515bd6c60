//! Bridges the block creator, the voting engine and the synchronizer.
//!
//! Block-creator events become signed YAC hashes and trigger voting;
//! engine outcomes are delayed per outcome type, then classified into gate
//! objects the synchronizer acts on.

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use takara_common::block::Block;
use takara_common::crypto::{Hash, KeyPair, PublicKey};
use takara_common::transaction::SignatureOf;

use crate::consensus::cluster_order::ClusterOrdering;
use crate::consensus::messages::{
    batch_hash, Answer, BlockCreatorEvent, ConsensusOutcomeType, GateObject, VoteMessage, YacHash,
};
use crate::consensus::orderer::PeerOrderer;
use crate::consensus::result_cache::ConsensusResultCache;
use crate::consensus::round::Round;
use crate::consensus::yac::Yac;
use crate::event_bus::EventBus;
use crate::storage::ledger_state::LedgerState;

pub type DelayFunc = Arc<dyn Fn(ConsensusOutcomeType) -> Duration + Send + Sync>;

struct GateState {
    current_hash: YacHash,
    current_block: Option<Block>,
    current_ledger_state: Option<Arc<LedgerState>>,
    alternative_order: Option<ClusterOrdering>,
}

pub struct YacGate {
    yac: Arc<Yac>,
    orderer: PeerOrderer,
    state: Mutex<GateState>,
    result_cache: Arc<ConsensusResultCache>,
    bus: Arc<EventBus>,
    delay_func: DelayFunc,
    keypair: Arc<KeyPair>,
}

impl YacGate {
    pub fn new(
        yac: Arc<Yac>,
        keypair: Arc<KeyPair>,
        result_cache: Arc<ConsensusResultCache>,
        bus: Arc<EventBus>,
        delay_func: DelayFunc,
    ) -> Arc<Self> {
        Arc::new(Self {
            yac,
            orderer: PeerOrderer::new(),
            state: Mutex::new(GateState {
                current_hash: YacHash::new(Round::default(), "", ""),
                current_block: None,
                current_ledger_state: None,
                alternative_order: None,
            }),
            result_cache,
            bus,
            delay_func,
            keypair,
        })
    }

    /// One-shot alternative order for the next vote, e.g. right after this
    /// node joined and the stored peer list is still behind.
    pub fn set_alternative_order(&self, order: ClusterOrdering) {
        self.lock().alternative_order = Some(order);
    }

    /// Spawns the gate's listeners: block-creator events trigger votes, raw
    /// outcomes get delayed, delayed outcomes become gate objects.
    pub fn start(self: &Arc<Self>) {
        let gate = self.clone();
        let mut events = self.bus.subscribe_block_creator_events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                gate.vote(event);
            }
        });

        let gate = self.clone();
        let mut outcomes = self.bus.subscribe_outcomes_from_yac();
        tokio::spawn(async move {
            while let Ok(outcome) = outcomes.recv().await {
                let delay = (gate.delay_func)(classify(&outcome));
                gate.bus.publish_outcome_delayed_after(delay, outcome);
            }
        });

        let gate = self.clone();
        let mut delayed = self.bus.subscribe_outcomes_delayed();
        tokio::spawn(async move {
            while let Ok(outcome) = delayed.recv().await {
                gate.handle_outcome(outcome);
            }
        });
    }

    pub fn stop(&self) {
        self.yac.stop();
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Builds the YAC hash for the event and starts voting on it.
    pub fn vote(&self, event: BlockCreatorEvent) {
        let (hash, order, alternative) = {
            let mut state = self.lock();
            if state.current_hash.vote_round >= event.round {
                info!(
                    "current round {} is ahead of vote round {}, skipped",
                    state.current_hash.vote_round, event.round
                );
                return;
            }

            let hash = self.make_hash(&event);
            debug_assert_eq!(
                hash.vote_round.block_round,
                event.ledger_state.top_block_info.height + 1
            );

            state.current_ledger_state = Some(event.ledger_state.clone());
            state.current_hash = hash.clone();
            match &event.round_data {
                None => {
                    state.current_block = None;
                    // the previous block reached storage, the cache entry is
                    // stale now
                    self.result_cache.release();
                    debug!("agreed on nothing to commit");
                }
                Some(round_data) => {
                    state.current_block = Some(round_data.block.clone());
                    self.result_cache.insert(Arc::new(round_data.block.clone()));
                    info!(
                        "vote for (proposal: {}, block: {})",
                        hash.proposal_hash, hash.block_hash
                    );
                }
            }

            let Some(order) = self
                .orderer
                .get_ordering(&hash, &event.ledger_state.ledger_peers)
            else {
                error!("ordering provides no peers, passing the round");
                return;
            };
            (hash, order, state.alternative_order.take())
        };

        self.yac.vote(hash, order, alternative);
    }

    fn make_hash(&self, event: &BlockCreatorEvent) -> YacHash {
        match &event.round_data {
            Some(round_data) => {
                let signature = SignatureOf::produce(
                    &self.keypair,
                    &round_data.block.payload_bytes(),
                );
                YacHash::new(
                    event.round,
                    round_data.proposal_hash.clone(),
                    round_data.block.hash().to_hex(),
                )
                .with_block_signature(signature)
            }
            None => YacHash::new(event.round, "", ""),
        }
    }

    fn handle_outcome(&self, outcome: Answer) {
        match outcome {
            Answer::Commit { votes } => self.handle_commit(votes),
            Answer::Reject { votes } => self.handle_reject(votes),
            Answer::Future { votes } => self.handle_future(votes),
        }
    }

    fn handle_commit(&self, votes: Vec<VoteMessage>) {
        let gate_object = {
            let mut state = self.lock();
            let Some(hash) = batch_hash(&votes).cloned() else {
                warn!("commit with diverging votes, dropped");
                return;
            };
            if hash.vote_round < state.current_hash.vote_round {
                info!(
                    "current round {} is ahead of commit round {}, skipped",
                    state.current_hash.vote_round, hash.vote_round
                );
                return;
            }
            let Some(ledger_state) = state.current_ledger_state.clone() else {
                warn!("commit before the first block-creator event, dropped");
                return;
            };

            if hash == state.current_hash && state.current_block.is_some() {
                // we voted for the winner: enrich it with the other voters'
                // block signatures
                let Some(mut block) = state.current_block.take() else {
                    return;
                };
                for vote in &votes {
                    if let Some(signature) = vote.hash.block_signature {
                        block.add_signature(signature);
                    }
                }
                info!(
                    "consensus: commit top block: height {}, hash {}",
                    block.height,
                    block.hash()
                );
                GateObject::PairValid {
                    round: hash.vote_round,
                    ledger_state,
                    block,
                }
            } else if hash.is_empty() {
                info!("consensus skipped the round, voted for nothing");
                state.current_block = None;
                GateObject::AgreementOnNone {
                    round: hash.vote_round,
                    ledger_state,
                    public_keys: public_keys(&votes),
                }
            } else {
                info!("voted for another block, waiting for synchronization");
                state.current_block = None;
                let Ok(block_hash) = Hash::from_str(&hash.block_hash) else {
                    error!("commit on an unparsable block hash {}", hash.block_hash);
                    return;
                };
                GateObject::VoteOther {
                    round: hash.vote_round,
                    ledger_state,
                    public_keys: public_keys(&votes),
                    block_hash,
                }
            }
        };
        self.bus.publish_gate_object(gate_object);
    }

    fn handle_reject(&self, votes: Vec<VoteMessage>) {
        let gate_object = {
            let state = self.lock();
            let Some(round) = votes.first().map(|vote| vote.round()) else {
                return;
            };
            if round < state.current_hash.vote_round {
                info!(
                    "current round {} is ahead of reject round {}, skipped",
                    state.current_hash.vote_round, round
                );
                return;
            }
            let Some(ledger_state) = state.current_ledger_state.clone() else {
                warn!("reject before the first block-creator event, dropped");
                return;
            };

            let same_proposals = votes
                .windows(2)
                .all(|pair| pair[0].hash.proposal_hash == pair[1].hash.proposal_hash);
            if same_proposals {
                info!("block reject: proposals match, blocks disagree");
                GateObject::BlockReject {
                    round,
                    ledger_state,
                    public_keys: public_keys(&votes),
                }
            } else {
                info!("proposal reject: proposal hashes differ");
                GateObject::ProposalReject {
                    round,
                    ledger_state,
                    public_keys: public_keys(&votes),
                }
            }
        };
        self.bus.publish_gate_object(gate_object);
    }

    fn handle_future(&self, votes: Vec<VoteMessage>) {
        let gate_object = {
            let state = self.lock();
            let Some(round) = votes.first().map(|vote| vote.round()) else {
                return;
            };
            if round.block_round <= state.current_hash.vote_round.block_round {
                info!(
                    "current block round {} is not behind future round {}, skipped",
                    state.current_hash.vote_round.block_round, round.block_round
                );
                return;
            }
            let Some(ledger_state) = state.current_ledger_state.clone() else {
                warn!("future outcome before the first block-creator event, dropped");
                return;
            };
            if ledger_state.top_block_info.height + 1 >= round.block_round {
                info!(
                    "top height {} almost caught up with future round {}, skipped",
                    ledger_state.top_block_info.height, round.block_round
                );
                return;
            }

            info!("message from future, waiting for synchronization");
            GateObject::Future {
                round,
                ledger_state,
                public_keys: public_keys(&votes),
            }
        };
        self.bus.publish_gate_object(gate_object);
    }
}

fn public_keys(votes: &[VoteMessage]) -> Vec<PublicKey> {
    votes.iter().map(|vote| vote.public_key()).collect()
}

fn classify(outcome: &Answer) -> ConsensusOutcomeType {
    match outcome {
        Answer::Commit { votes } => match batch_hash(votes) {
            Some(hash) if hash.is_empty() => ConsensusOutcomeType::Nothing,
            _ => ConsensusOutcomeType::Commit,
        },
        Answer::Reject { .. } => ConsensusOutcomeType::Reject,
        Answer::Future { .. } => ConsensusOutcomeType::Future,
    }
}
