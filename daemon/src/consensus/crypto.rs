//! Vote signing and verification.

use std::sync::Arc;

use log::warn;
use takara_common::crypto::KeyPair;
use takara_common::transaction::SignatureOf;

use crate::consensus::messages::{VoteMessage, YacHash};

pub struct VoteCryptoProvider {
    keypair: Arc<KeyPair>,
}

impl VoteCryptoProvider {
    pub fn new(keypair: Arc<KeyPair>) -> Self {
        Self { keypair }
    }

    pub fn public_key(&self) -> takara_common::crypto::PublicKey {
        self.keypair.public_key()
    }

    /// Signs the hash with the own key.
    pub fn get_vote(&self, hash: YacHash) -> VoteMessage {
        let signature = SignatureOf::produce(&self.keypair, &hash.signable_bytes());
        VoteMessage {
            hash,
            signature,
        }
    }

    /// Every vote of the batch must carry a valid signature over its hash.
    pub fn verify(&self, votes: &[VoteMessage]) -> bool {
        votes.iter().all(|vote| {
            let valid = vote.signature.verify(&vote.hash.signable_bytes());
            if !valid {
                warn!("crypto verification failed for {}", vote);
            }
            valid
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::round::Round;

    #[test]
    fn test_sign_verify_cycle() {
        let provider = VoteCryptoProvider::new(Arc::new(KeyPair::generate()));
        let vote = provider.get_vote(YacHash::new(Round::new(1, 0), "p", "b"));
        assert!(provider.verify(std::slice::from_ref(&vote)));
    }

    #[test]
    fn test_tampered_vote_rejected() {
        let provider = VoteCryptoProvider::new(Arc::new(KeyPair::generate()));
        let mut vote = provider.get_vote(YacHash::new(Round::new(1, 0), "p", "b"));
        vote.hash.block_hash = "tampered".to_string();
        assert!(!provider.verify(std::slice::from_ref(&vote)));
    }
}
