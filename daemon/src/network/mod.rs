pub mod block_loader;
pub mod local;
pub mod retry;
pub mod tcp;

use async_trait::async_trait;
use takara_common::model::Peer;

use crate::consensus::messages::VoteMessage;

/// Outgoing side of the consensus wire protocol: one call delivers a batch
/// of same-round votes to one peer.
#[async_trait]
pub trait YacNetwork: Send + Sync {
    async fn send_state(&self, to: &Peer, state: Vec<VoteMessage>);

    /// Blocks new outgoing activity. In-flight sends finish normally.
    fn stop(&self) {}
}

/// A vote batch is acceptable when it is non-empty and all votes carry the
/// same round. Receiving sides cancel anything else.
pub fn acceptable_batch(state: &[VoteMessage]) -> bool {
    crate::consensus::messages::batch_round(state).is_some()
}
