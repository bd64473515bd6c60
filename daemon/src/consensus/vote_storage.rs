//! Per-round vote collection with supermajority detection and bounded
//! memory.
//!
//! Votes are deduplicated by `(public key, round)`. Each round keeps one
//! group of votes per distinct [`YacHash`]; as soon as one group reaches
//! supermajority the round's outcome is a commit, and once no group can
//! reach it anymore the outcome is a reject carrying every vote seen.
//! Finalized rounds are kept in a fixed-size buffer so stragglers can be
//! served the outcome, older rounds are discarded.

use std::collections::HashMap;
use std::collections::VecDeque;

use log::{debug, trace};

use crate::consensus::messages::{batch_round, Answer, VoteMessage, YacHash};
use crate::consensus::round::Round;
use crate::consensus::supermajority::SupermajorityChecker;

/// How far the propagation of a round's outcome has progressed. Strictly
/// monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProposalState {
    #[default]
    NotSentNotProcessed,
    SentNotProcessed,
    SentProcessed,
}

impl ProposalState {
    fn next(self) -> ProposalState {
        match self {
            ProposalState::NotSentNotProcessed => ProposalState::SentNotProcessed,
            ProposalState::SentNotProcessed | ProposalState::SentProcessed => {
                ProposalState::SentProcessed
            }
        }
    }
}

// votes for one distinct hash within a round
struct BlockVotes {
    hash: YacHash,
    votes: Vec<VoteMessage>,
}

impl BlockVotes {
    fn insert(&mut self, vote: VoteMessage) {
        if !self
            .votes
            .iter()
            .any(|known| known.public_key() == vote.public_key())
        {
            self.votes.push(vote);
        }
    }
}

struct ProposalStorage {
    round: Round,
    peers_in_round: usize,
    groups: Vec<BlockVotes>,
    answer: Option<Answer>,
}

impl ProposalStorage {
    fn new(round: Round, peers_in_round: usize) -> Self {
        Self {
            round,
            peers_in_round,
            groups: Vec::new(),
            answer: None,
        }
    }

    fn has_voted(&self, vote: &VoteMessage) -> bool {
        self.groups.iter().any(|group| {
            group
                .votes
                .iter()
                .any(|known| known.public_key() == vote.public_key())
        })
    }

    fn insert(&mut self, vote: VoteMessage, checker: &SupermajorityChecker) -> Option<Answer> {
        if vote.round() == self.round && !self.has_voted(&vote) {
            let hash = vote.hash.clone();
            match self.groups.iter_mut().find(|group| group.hash == hash) {
                Some(group) => group.insert(vote),
                None => self.groups.push(BlockVotes {
                    hash,
                    votes: vec![vote],
                }),
            }
            self.update_answer(checker);
        }
        self.answer.clone()
    }

    fn update_answer(&mut self, checker: &SupermajorityChecker) {
        // a decided commit keeps absorbing votes for the winning hash
        if matches!(self.answer, None | Some(Answer::Commit { .. })) {
            if let Some(winner) = self
                .groups
                .iter()
                .find(|group| checker.has_supermajority(group.votes.len(), self.peers_in_round))
            {
                self.answer = Some(Answer::Commit {
                    votes: winner.votes.clone(),
                });
                return;
            }
        }
        if self.answer.is_none() {
            let group_sizes: Vec<usize> = self.groups.iter().map(|g| g.votes.len()).collect();
            if !checker.can_have_supermajority(&group_sizes, self.peers_in_round) {
                debug!("no hash can reach supermajority in round {}", self.round);
                self.answer = Some(Answer::Reject {
                    votes: self
                        .groups
                        .iter()
                        .flat_map(|group| group.votes.iter().cloned())
                        .collect(),
                });
            }
        }
    }
}

const FINALIZED_ROUNDS_KEPT: usize = 8;

pub struct YacVoteStorage {
    proposals: HashMap<Round, ProposalStorage>,
    processing: HashMap<Round, ProposalState>,
    finalized: VecDeque<Round>,
    checker: SupermajorityChecker,
}

impl YacVoteStorage {
    pub fn new(checker: SupermajorityChecker) -> Self {
        Self {
            proposals: HashMap::new(),
            processing: HashMap::new(),
            finalized: VecDeque::new(),
            checker,
        }
    }

    /// Ingests a same-round batch of votes. Returns the round's outcome as
    /// soon as (and as long as) one is known.
    pub fn store(&mut self, votes: Vec<VoteMessage>, peers_in_round: usize) -> Option<Answer> {
        let round = batch_round(&votes)?;
        trace!("storing {} votes for round {}", votes.len(), round);

        let storage = self
            .proposals
            .entry(round)
            .or_insert_with(|| ProposalStorage::new(round, peers_in_round));
        let mut answer = None;
        for vote in votes {
            answer = storage.insert(vote, &self.checker);
        }

        if answer.is_some() {
            self.mark_finalized(round);
        }
        answer
    }

    pub fn is_committed(&self, round: Round) -> bool {
        matches!(
            self.proposals.get(&round).and_then(|s| s.answer.as_ref()),
            Some(Answer::Commit { .. })
        )
    }

    pub fn get_state(&self, round: Round) -> Option<Answer> {
        self.proposals.get(&round).and_then(|s| s.answer.clone())
    }

    pub fn get_processing_state(&self, round: Round) -> ProposalState {
        self.processing.get(&round).copied().unwrap_or_default()
    }

    pub fn next_processing_state(&mut self, round: Round) {
        let state = self.get_processing_state(round);
        self.processing.insert(round, state.next());
    }

    /// Greatest finalized round still in the buffer.
    pub fn last_finalized_round(&self) -> Option<Round> {
        self.finalized.iter().max().copied()
    }

    /// Drops everything collected for the round, e.g. before re-voting.
    pub fn remove(&mut self, round: Round) {
        self.proposals.remove(&round);
        self.processing.remove(&round);
        self.finalized.retain(|r| *r != round);
    }

    fn mark_finalized(&mut self, round: Round) {
        if self.finalized.contains(&round) {
            return;
        }
        self.finalized.push_back(round);
        while self.finalized.len() > FINALIZED_ROUNDS_KEPT {
            if let Some(evicted) = self.finalized.pop_front() {
                trace!("evicting round {}", evicted);
                self.proposals.remove(&evicted);
                self.processing.remove(&evicted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::supermajority::ConsistencyModel;
    use takara_common::crypto::KeyPair;
    use takara_common::transaction::SignatureOf;

    fn vote(round: Round, block: &str, keypair: &KeyPair) -> VoteMessage {
        let hash = YacHash::new(round, "proposal", block);
        VoteMessage {
            signature: SignatureOf::produce(keypair, &hash.signable_bytes()),
            hash,
        }
    }

    fn storage() -> YacVoteStorage {
        YacVoteStorage::new(SupermajorityChecker::new(ConsistencyModel::Bft))
    }

    #[test]
    fn test_commit_at_supermajority() {
        let mut storage = storage();
        let keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let round = Round::new(1, 0);

        assert!(storage
            .store(vec![vote(round, "b", &keys[0])], 4)
            .is_none());
        assert!(storage
            .store(vec![vote(round, "b", &keys[1])], 4)
            .is_none());
        let answer = storage.store(vec![vote(round, "b", &keys[2])], 4).unwrap();
        match answer {
            Answer::Commit { votes } => assert_eq!(votes.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert!(storage.is_committed(round));

        // a late vote joins the commit
        let answer = storage.store(vec![vote(round, "b", &keys[3])], 4).unwrap();
        match answer {
            Answer::Commit { votes } => assert_eq!(votes.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_votes_ignored() {
        let mut storage = storage();
        let keypair = KeyPair::generate();
        let round = Round::new(1, 0);
        storage.store(vec![vote(round, "b", &keypair)], 4);
        storage.store(vec![vote(round, "b", &keypair)], 4);

        // a single voter never reaches 3-of-4
        assert!(storage.get_state(round).is_none());
    }

    #[test]
    fn test_reject_on_split() {
        let mut storage = storage();
        let keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let round = Round::new(1, 0);

        storage.store(vec![vote(round, "x", &keys[0])], 4);
        storage.store(vec![vote(round, "x", &keys[1])], 4);
        storage.store(vec![vote(round, "y", &keys[2])], 4);
        let answer = storage.store(vec![vote(round, "y", &keys[3])], 4).unwrap();
        match answer {
            Answer::Reject { votes } => assert_eq!(votes.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!storage.is_committed(round));
    }

    #[test]
    fn test_processing_state_progression() {
        let mut storage = storage();
        let round = Round::new(2, 0);
        assert_eq!(
            storage.get_processing_state(round),
            ProposalState::NotSentNotProcessed
        );
        storage.next_processing_state(round);
        assert_eq!(
            storage.get_processing_state(round),
            ProposalState::SentNotProcessed
        );
        storage.next_processing_state(round);
        storage.next_processing_state(round);
        assert_eq!(
            storage.get_processing_state(round),
            ProposalState::SentProcessed
        );
    }

    #[test]
    fn test_cleanup_keeps_recent_rounds() {
        let mut storage = storage();
        let keypair = KeyPair::generate();
        for i in 0..(FINALIZED_ROUNDS_KEPT as u64 + 3) {
            let round = Round::new(i + 1, 0);
            storage.store(vec![vote(round, "b", &keypair)], 1);
            assert!(storage.is_committed(round));
        }
        // the oldest rounds were evicted
        assert!(storage.get_state(Round::new(1, 0)).is_none());
        let last = storage.last_finalized_round().unwrap();
        assert_eq!(last, Round::new(FINALIZED_ROUNDS_KEPT as u64 + 3, 0));
        assert!(storage.is_committed(last));
    }

    #[test]
    fn test_remove_round() {
        let mut storage = storage();
        let keypair = KeyPair::generate();
        let round = Round::new(1, 0);
        storage.store(vec![vote(round, "b", &keypair)], 1);
        assert!(storage.is_committed(round));
        storage.remove(round);
        assert!(!storage.is_committed(round));
        assert!(storage.last_finalized_round().is_none());
    }
}
