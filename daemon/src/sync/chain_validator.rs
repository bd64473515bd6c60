//! Chain-level validation of downloaded blocks.

use log::info;
use takara_common::block::Block;

use crate::consensus::supermajority::SupermajorityChecker;
use crate::storage::ledger_state::LedgerState;

pub struct ChainValidator {
    checker: SupermajorityChecker,
}

impl ChainValidator {
    pub fn new(checker: SupermajorityChecker) -> Self {
        Self { checker }
    }

    /// A block extends the chain when it points at the current top, sits at
    /// the next height and carries a supermajority of valid signatures from
    /// the ledger peers of that state.
    pub fn validate_block(&self, block: &Block, ledger_state: &LedgerState) -> bool {
        self.validate_previous_hash(block, ledger_state)
            && self.validate_height(block, ledger_state)
            && self.validate_peer_supermajority(block, ledger_state)
    }

    fn validate_previous_hash(&self, block: &Block, ledger_state: &LedgerState) -> bool {
        let same = block.prev_hash == ledger_state.top_block_info.hash;
        if !same {
            info!(
                "previous hash {} of block does not match top block hash {}",
                block.prev_hash, ledger_state.top_block_info.hash
            );
        }
        same
    }

    fn validate_height(&self, block: &Block, ledger_state: &LedgerState) -> bool {
        let valid = block.height == ledger_state.top_block_info.height + 1;
        if !valid {
            info!(
                "block height {} does not follow the top height {}",
                block.height, ledger_state.top_block_info.height
            );
        }
        valid
    }

    fn validate_peer_supermajority(&self, block: &Block, ledger_state: &LedgerState) -> bool {
        let peers = &ledger_state.ledger_peers;
        let signatures_from_peers = block.signatures.iter().all(|signature| {
            peers
                .iter()
                .any(|peer| peer.public_key == signature.public_key)
        });
        let valid = signatures_from_peers
            && self
                .checker
                .has_supermajority(block.signatures.len(), peers.len())
            && block.signatures_valid();
        if !valid {
            info!(
                "block {} does not carry a supermajority of peer signatures ({} of {})",
                block.height,
                block.signatures.len(),
                peers.len()
            );
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::supermajority::ConsistencyModel;
    use crate::storage::ledger_state::TopBlockInfo;
    use takara_common::crypto::{Hash, KeyPair};
    use takara_common::model::Peer;

    fn setup() -> (Vec<KeyPair>, LedgerState) {
        let keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let peers: Vec<Peer> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Peer::new(k.public_key(), format!("peer{}:50541", i)))
            .collect();
        let state = LedgerState::new(peers, Vec::new(), TopBlockInfo::new(1, Hash::zero()));
        (keys, state)
    }

    fn signed_block(keys: &[KeyPair]) -> Block {
        let mut block = Block::new(2, Hash::zero(), 0, Vec::new(), Vec::new());
        for key in keys {
            block = block.sign(key);
        }
        block
    }

    #[test]
    fn test_accepts_valid_block() {
        let (keys, state) = setup();
        let validator = ChainValidator::new(SupermajorityChecker::new(ConsistencyModel::Bft));
        let block = signed_block(&keys[..3]);
        assert!(validator.validate_block(&block, &state));
    }

    #[test]
    fn test_rejects_wrong_prev_hash() {
        let (keys, state) = setup();
        let validator = ChainValidator::new(SupermajorityChecker::new(ConsistencyModel::Bft));
        let mut block = Block::new(2, Hash::max(), 0, Vec::new(), Vec::new());
        for key in &keys[..3] {
            block = block.sign(key);
        }
        assert!(!validator.validate_block(&block, &state));
    }

    #[test]
    fn test_rejects_wrong_height() {
        let (keys, state) = setup();
        let validator = ChainValidator::new(SupermajorityChecker::new(ConsistencyModel::Bft));
        let mut block = Block::new(5, Hash::zero(), 0, Vec::new(), Vec::new());
        for key in &keys[..3] {
            block = block.sign(key);
        }
        assert!(!validator.validate_block(&block, &state));
    }

    #[test]
    fn test_rejects_minority_signatures() {
        let (keys, state) = setup();
        let validator = ChainValidator::new(SupermajorityChecker::new(ConsistencyModel::Bft));
        let block = signed_block(&keys[..2]);
        assert!(!validator.validate_block(&block, &state));
    }

    #[test]
    fn test_rejects_foreign_signer() {
        let (keys, state) = setup();
        let validator = ChainValidator::new(SupermajorityChecker::new(ConsistencyModel::Bft));
        let stranger = KeyPair::generate();
        let mut block = signed_block(&keys[..2]);
        block = block.sign(&stranger);
        assert!(!validator.validate_block(&block, &state));
    }
}
