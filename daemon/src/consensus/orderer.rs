//! Deterministic peer ordering seeded by the voted block hash.

use log::debug;
use takara_common::model::Peer;

use crate::consensus::cluster_order::ClusterOrdering;
use crate::consensus::messages::YacHash;
use crate::consensus::permutation::{generate_permutation, seeded_engine};

#[derive(Debug, Default)]
pub struct PeerOrderer;

impl PeerOrderer {
    pub fn new() -> Self {
        Self
    }

    /// Permutes `peers` with a PRNG seeded from the block hash, so every
    /// correct node derives the identical leader order for a round.
    pub fn get_ordering(&self, hash: &YacHash, peers: &[Peer]) -> Option<ClusterOrdering> {
        let seed = match hex::decode(&hash.block_hash) {
            Ok(bytes) => bytes,
            // an abstention round seeds from the raw text
            Err(_) => hash.block_hash.clone().into_bytes(),
        };
        let mut engine = seeded_engine(&seed);
        let positions = generate_permutation(&mut engine, peers.len());
        debug!("peer ordering for {}: {:?}", hash, positions);
        ClusterOrdering::with_positions(peers, &positions)
    }
}
