pub mod cluster_order;
pub mod crypto;
pub mod gate;
pub mod messages;
pub mod orderer;
pub mod permutation;
pub mod result_cache;
pub mod round;
pub mod supermajority;
pub mod timer;
pub mod vote_storage;
pub mod yac;

pub use cluster_order::ClusterOrdering;
pub use crypto::VoteCryptoProvider;
pub use gate::YacGate;
pub use messages::{
    Answer, BlockCreatorEvent, ConsensusOutcomeType, GateObject, RoundData, SyncEvent,
    SyncOutcomeType, VoteMessage, YacHash,
};
pub use orderer::PeerOrderer;
pub use result_cache::ConsensusResultCache;
pub use round::Round;
pub use supermajority::{ConsistencyModel, SupermajorityChecker};
pub use vote_storage::{ProposalState, YacVoteStorage};
pub use yac::Yac;
