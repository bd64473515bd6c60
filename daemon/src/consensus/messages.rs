//! Message types moving through consensus: votes, outcomes, gate objects and
//! synchronizer events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use takara_common::block::Block;
use takara_common::crypto::{Hash, PublicKey};
use takara_common::serializer::Writer;
use takara_common::transaction::SignatureOf;

use crate::consensus::round::Round;
use crate::storage::ledger_state::LedgerState;

/// What a peer votes for: the round plus the proposal/block hash pair (hex).
/// An empty proposal hash is a vote for nothing. The creator's signature
/// over the block travels along so a committed block can collect the
/// signatures of everyone who voted for it.
///
/// Equality deliberately ignores the block signature: two peers voting for
/// the same hashes agree even though their signatures differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YacHash {
    pub vote_round: Round,
    pub proposal_hash: String,
    pub block_hash: String,
    pub block_signature: Option<SignatureOf>,
}

impl YacHash {
    pub fn new(vote_round: Round, proposal_hash: impl Into<String>, block_hash: impl Into<String>) -> Self {
        Self {
            vote_round,
            proposal_hash: proposal_hash.into(),
            block_hash: block_hash.into(),
            block_signature: None,
        }
    }

    pub fn with_block_signature(mut self, signature: SignatureOf) -> Self {
        self.block_signature = Some(signature);
        self
    }

    /// Empty proposal hash means the vote is for nothing.
    pub fn is_empty(&self) -> bool {
        self.proposal_hash.is_empty()
    }

    /// Bytes covered by the vote signature.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_u64(self.vote_round.block_round);
        writer.write_u64(self.vote_round.reject_round);
        writer.write_string(&self.proposal_hash);
        writer.write_string(&self.block_hash);
        writer.into_bytes()
    }
}

impl PartialEq for YacHash {
    fn eq(&self, other: &Self) -> bool {
        self.vote_round == other.vote_round
            && self.proposal_hash == other.proposal_hash
            && self.block_hash == other.block_hash
    }
}

impl Eq for YacHash {}

impl std::hash::Hash for YacHash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.vote_round.hash(state);
        self.proposal_hash.hash(state);
        self.block_hash.hash(state);
    }
}

impl fmt::Display for YacHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "YacHash(round: {}, proposal: {}, block: {})",
            self.vote_round, self.proposal_hash, self.block_hash
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub hash: YacHash,
    pub signature: SignatureOf,
}

impl VoteMessage {
    pub fn round(&self) -> Round {
        self.hash.vote_round
    }

    pub fn public_key(&self) -> PublicKey {
        self.signature.public_key
    }
}

impl fmt::Display for VoteMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vote({} by {})", self.hash, self.signature.public_key)
    }
}

/// The round every vote of a non-empty batch agrees on, if any.
pub fn batch_round(votes: &[VoteMessage]) -> Option<Round> {
    let first = votes.first()?;
    votes
        .iter()
        .all(|vote| vote.round() == first.round())
        .then(|| first.round())
}

/// The hash every vote of a non-empty batch agrees on, if any.
pub fn batch_hash(votes: &[VoteMessage]) -> Option<&YacHash> {
    let first = votes.first()?;
    votes
        .iter()
        .all(|vote| vote.hash == first.hash)
        .then_some(&first.hash)
}

/// Outcome of a round as determined by vote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Supermajority on one hash.
    Commit { votes: Vec<VoteMessage> },
    /// No hash can reach supermajority anymore.
    Reject { votes: Vec<VoteMessage> },
    /// Votes from a round ahead of ours; the quorum there is unknown.
    Future { votes: Vec<VoteMessage> },
}

impl Answer {
    pub fn votes(&self) -> &[VoteMessage] {
        match self {
            Answer::Commit { votes } | Answer::Reject { votes } | Answer::Future { votes } => votes,
        }
    }

    pub fn round(&self) -> Option<Round> {
        batch_round(self.votes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusOutcomeType {
    Commit,
    Reject,
    Nothing,
    Future,
}

/// Input to the consensus gate from the block creator.
#[derive(Debug, Clone)]
pub struct BlockCreatorEvent {
    pub round: Round,
    pub ledger_state: Arc<LedgerState>,
    pub round_data: Option<RoundData>,
}

#[derive(Debug, Clone)]
pub struct RoundData {
    pub proposal_hash: String,
    pub block: Block,
}

impl RoundData {
    pub fn from_block(block: Block) -> Self {
        Self {
            proposal_hash: block.hash().to_hex(),
            block,
        }
    }
}

/// Consensus decision handed to the synchronizer.
#[derive(Debug, Clone)]
pub enum GateObject {
    /// We voted for the block that won.
    PairValid {
        round: Round,
        ledger_state: Arc<LedgerState>,
        block: Block,
    },
    /// Commit on a block we do not have; it must be downloaded.
    VoteOther {
        round: Round,
        ledger_state: Arc<LedgerState>,
        public_keys: Vec<PublicKey>,
        block_hash: Hash,
    },
    /// Reject with diverging proposals.
    ProposalReject {
        round: Round,
        ledger_state: Arc<LedgerState>,
        public_keys: Vec<PublicKey>,
    },
    /// Reject with matching proposals but block disagreement.
    BlockReject {
        round: Round,
        ledger_state: Arc<LedgerState>,
        public_keys: Vec<PublicKey>,
    },
    /// Commit on an empty proposal.
    AgreementOnNone {
        round: Round,
        ledger_state: Arc<LedgerState>,
        public_keys: Vec<PublicKey>,
    },
    /// Supermajority seen in a future round; we are behind.
    Future {
        round: Round,
        ledger_state: Arc<LedgerState>,
        public_keys: Vec<PublicKey>,
    },
}

impl GateObject {
    pub fn round(&self) -> Round {
        match self {
            GateObject::PairValid { round, .. }
            | GateObject::VoteOther { round, .. }
            | GateObject::ProposalReject { round, .. }
            | GateObject::BlockReject { round, .. }
            | GateObject::AgreementOnNone { round, .. }
            | GateObject::Future { round, .. } => *round,
        }
    }

    pub fn ledger_state(&self) -> &Arc<LedgerState> {
        match self {
            GateObject::PairValid { ledger_state, .. }
            | GateObject::VoteOther { ledger_state, .. }
            | GateObject::ProposalReject { ledger_state, .. }
            | GateObject::BlockReject { ledger_state, .. }
            | GateObject::AgreementOnNone { ledger_state, .. }
            | GateObject::Future { ledger_state, .. } => ledger_state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcomeType {
    Commit,
    Reject,
    Nothing,
}

/// Published by the synchronizer after it acted on a gate object.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub outcome: SyncOutcomeType,
    pub round: Round,
    pub ledger_state: Arc<LedgerState>,
}
