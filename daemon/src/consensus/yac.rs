//! The consensus voting engine.
//!
//! One instance drives one node through rounds of voting: it signs and
//! propagates the own vote along the rotating leader order, ingests peer
//! votes, classifies batches from past and future rounds, and surfaces
//! commit/reject/future outcomes on the event bus.
//!
//! Liveness: every `rotate_period` attempts the engine drops its collected
//! votes for the round and re-votes; at exactly `rotate_period` attempts it
//! clears the proposal and block hashes first. That cleared vote is an
//! abstention ("this round will not get my block") and a fresh revote,
//! not an agreement on an empty proposal; peers seeing a supermajority of
//! abstentions conclude the round with nothing to commit.
//!
//! Locking: one mutex guards the engine state (round, orders, vote
//! storage). It is released before any outcome is published or any network
//! send happens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use takara_common::model::Peer;

use crate::consensus::cluster_order::ClusterOrdering;
use crate::consensus::crypto::VoteCryptoProvider;
use crate::consensus::messages::{Answer, VoteMessage};
use crate::consensus::round::Round;
use crate::consensus::timer::Timer;
use crate::consensus::vote_storage::{ProposalState, YacVoteStorage};
use crate::event_bus::EventBus;
use crate::network::YacNetwork;

struct YacState {
    cluster_order: ClusterOrdering,
    alternative_order: Option<ClusterOrdering>,
    round: Round,
    vote_storage: YacVoteStorage,
    last_applied: Option<Round>,
}

impl YacState {
    fn current_order_mut(&mut self) -> &mut ClusterOrdering {
        match self.alternative_order {
            Some(ref mut alternative) => alternative,
            None => &mut self.cluster_order,
        }
    }

    fn current_order(&self) -> &ClusterOrdering {
        self.alternative_order.as_ref().unwrap_or(&self.cluster_order)
    }
}

// side effects collected under the lock, executed after it is released
enum Action {
    Send { to: Peer, state: Vec<VoteMessage> },
    Broadcast { peers: Vec<Peer>, state: Vec<VoteMessage> },
    ApplyState(Round),
    Outcome(Answer),
}

pub struct Yac {
    state: Mutex<YacState>,
    crypto: Arc<VoteCryptoProvider>,
    network: Arc<dyn YacNetwork>,
    timer: Timer,
    bus: Arc<EventBus>,
    stopped: AtomicBool,
    rotate_period: u32,
}

impl Yac {
    pub fn new(
        vote_storage: YacVoteStorage,
        network: Arc<dyn YacNetwork>,
        crypto: Arc<VoteCryptoProvider>,
        vote_delay: Duration,
        rotate_period: u32,
        order: ClusterOrdering,
        round: Round,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(YacState {
                cluster_order: order,
                alternative_order: None,
                round,
                vote_storage,
                last_applied: None,
            }),
            crypto,
            network,
            timer: Timer::new(vote_delay),
            bus,
            stopped: AtomicBool::new(false),
            rotate_period: rotate_period.max(1),
        })
    }

    /// Stops new outgoing activity and new vote schedules.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.network.stop();
    }

    fn lock(&self) -> MutexGuard<'_, YacState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ------ hash gate ------

    /// Starts voting for `hash` with the given leader order. An alternative
    /// order, when provided, is used for this one round's own sends.
    pub fn vote(
        self: &Arc<Self>,
        hash: crate::consensus::messages::YacHash,
        order: ClusterOrdering,
        alternative_order: Option<ClusterOrdering>,
    ) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        info!(
            "order for voting: [{}]",
            order
                .peers()
                .iter()
                .map(|p| p.address.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        {
            let mut state = self.lock();
            state.cluster_order = order;
            state.alternative_order = alternative_order;
            state.round = hash.vote_round;
        }
        self.timer.reset();

        let vote = self.crypto.get_vote(hash);
        self.voting_step(vote, 0);
    }

    fn voting_step(self: &Arc<Self>, vote: VoteMessage, attempt: u32) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        debug!("voting step for {}, attempt {}", vote, attempt);

        let round = vote.round();
        let mut next_vote = vote;
        let mut actions = Vec::new();
        {
            let mut state = self.lock();
            if state.vote_storage.is_committed(round) {
                return;
            }
            if state
                .last_applied
                .map_or(false, |applied| applied >= state.round)
            {
                return;
            }
            if self.timer.is_denied() {
                return;
            }

            if attempt != 0 && attempt % self.rotate_period == 0 {
                state.vote_storage.remove(round);
            }
            if attempt == self.rotate_period {
                let mut hash = next_vote.hash.clone();
                hash.proposal_hash.clear();
                hash.block_hash.clear();
                hash.block_signature = None;
                next_vote = self.crypto.get_vote(hash);
            }

            let peers_in_round = state.current_order().number_of_peers();
            state
                .vote_storage
                .store(vec![next_vote.clone()], peers_in_round);

            let order = state.current_order_mut();
            let leader = order.current_leader().clone();
            order.switch_to_next();
            info!("vote {} to peer {}", next_vote, leader);
            actions.push(Action::Send {
                to: leader,
                state: vec![next_vote.clone()],
            });
        }
        self.perform(actions);

        let engine = self.clone();
        let delay = self.timer.get_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.voting_step(next_vote, attempt + 1);
        });
    }

    // ------ network notifications ------

    /// Ingests a batch of votes received from the network.
    pub fn on_state(&self, mut votes: Vec<VoteMessage>) {
        let mut actions = Vec::new();
        {
            let mut state = self.lock();

            votes.retain(|vote| {
                let known = state.current_order().contains(&vote.public_key());
                if !known {
                    warn!("got a vote from an unknown peer: {}", vote);
                }
                known
            });
            if votes.is_empty() {
                debug!("no votes left in the message");
                return;
            }
            if !self.crypto.verify(&votes) {
                warn!("crypto verification failed for a batch of {} votes", votes.len());
                return;
            }

            let proposal_round = votes[0].round();
            if proposal_round.block_round > state.round.block_round {
                info!("pass state from future round {} upstream", proposal_round);
                actions.push(Action::Outcome(Answer::Future { votes }));
            } else if proposal_round.block_round < state.round.block_round {
                info!("state from past round {}, try to propagate back", proposal_round);
                Self::collect_back_propagation(&mut state, &votes, &mut actions);
            } else {
                if state.alternative_order.is_some() {
                    // an alternative peer may be missing from the cluster
                    // order; its votes must not reach storage
                    votes.retain(|vote| state.cluster_order.contains(&vote.public_key()));
                    if votes.is_empty() {
                        debug!("no votes left in the message");
                        return;
                    }
                }
                self.apply_votes(&mut state, votes, &mut actions);
            }
        }
        self.perform(actions);
    }

    /// Single entry point for a round change. Returns the cached outcome
    /// when the storage already concluded that round.
    pub fn process_round_switch(
        &self,
        round: Round,
        peers: &[Peer],
        sync_peers: &[Peer],
    ) -> Option<Answer> {
        debug!(
            "round switch to {} with {} peers ({} syncing)",
            round,
            peers.len(),
            sync_peers.len()
        );
        let mut state = self.lock();
        state.round = round;
        if let Some(order) = ClusterOrdering::create(peers.to_vec()) {
            state.cluster_order = order;
        }
        state.alternative_order = None;
        self.timer.reset();
        state.vote_storage.get_state(round)
    }

    // ------ private ------

    fn apply_votes(
        &self,
        state: &mut YacState,
        votes: Vec<VoteMessage>,
        actions: &mut Vec<Action>,
    ) {
        let proposal_round = votes[0].round();
        let peers_in_round = state.cluster_order.number_of_peers();
        let answer = state.vote_storage.store(votes.clone(), peers_in_round);

        let Some(answer) = answer else {
            Self::collect_back_propagation(state, &votes, actions);
            return;
        };

        let current_round = state.round;

        // a batch with several votes means some peer already collected this
        // outcome, so our own broadcast would be redundant; the solo-cluster
        // case has nobody else to collect from
        if votes.len() > 1
            || (proposal_round.block_round == current_round.block_round && peers_in_round == 1)
        {
            if state.vote_storage.get_processing_state(proposal_round)
                == ProposalState::NotSentNotProcessed
            {
                state.vote_storage.next_processing_state(proposal_round);
                info!("received supermajority for {}, skip propagation", proposal_round);
            }
        }

        match state.vote_storage.get_processing_state(proposal_round) {
            ProposalState::NotSentNotProcessed => {
                state.vote_storage.next_processing_state(proposal_round);
                info!("propagate state {} to the whole network", proposal_round);
                actions.push(Action::Broadcast {
                    peers: state.cluster_order.peers().to_vec(),
                    state: answer.votes().to_vec(),
                });
            }
            ProposalState::SentNotProcessed => {
                state.vote_storage.next_processing_state(proposal_round);
                info!("pass outcome for {} to the pipeline", proposal_round);
                if proposal_round >= current_round {
                    state.last_applied = Some(
                        state
                            .last_applied
                            .map_or(proposal_round, |applied| applied.max(proposal_round)),
                    );
                    self.timer.deny();
                    actions.push(Action::ApplyState(proposal_round));
                }
                actions.push(Action::Outcome(answer));
            }
            ProposalState::SentProcessed => {
                if current_round > proposal_round {
                    Self::collect_back_propagation(state, &votes, actions);
                }
            }
        }
    }

    // a lone vote from an earlier round: answer the sender with the last
    // finalized state so it can catch up
    fn collect_back_propagation(
        state: &mut YacState,
        votes: &[VoteMessage],
        actions: &mut Vec<Action>,
    ) {
        if votes.len() != 1 {
            // a multi-vote state means its sender already holds an outcome
            return;
        }
        let Some(last_round) = state.vote_storage.last_finalized_round() else {
            return;
        };
        if votes[0].round() > last_round {
            return;
        }
        let Some(final_state) = state.vote_storage.get_state(last_round) else {
            return;
        };
        let Some(peer) = state.cluster_order.find(&votes[0].public_key()).cloned() else {
            return;
        };
        info!("propagate state {} directly to {}", last_round, peer.address);
        actions.push(Action::Send {
            to: peer,
            state: final_state.votes().to_vec(),
        });
    }

    fn perform(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { to, state } => {
                    if self.stopped.load(Ordering::Acquire) {
                        continue;
                    }
                    let network = self.network.clone();
                    tokio::spawn(async move {
                        network.send_state(&to, state).await;
                    });
                }
                Action::Broadcast { peers, state } => {
                    if self.stopped.load(Ordering::Acquire) {
                        continue;
                    }
                    let network = self.network.clone();
                    tokio::spawn(async move {
                        for peer in &peers {
                            network.send_state(peer, state.clone()).await;
                        }
                    });
                }
                Action::ApplyState(round) => self.bus.publish_apply_state(round),
                Action::Outcome(answer) => self.bus.publish_outcome_from_yac(answer),
            }
        }
    }
}
