use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{hash, Hash, KeyPair, PublicKey, Signature};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use crate::transaction::{SignatureOf, Transaction};

pub const GENESIS_HEIGHT: u64 = 1;

/// A height-keyed batch of transactions agreed on by consensus.
///
/// `rejected_tx_hashes` keeps the hashes of transactions that failed stateful
/// validation in this round so their status stays queryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub prev_hash: Hash,
    pub created_ms: u64,
    pub transactions: Vec<Transaction>,
    pub rejected_tx_hashes: Vec<Hash>,
    pub signatures: Vec<SignatureOf>,
}

impl Block {
    pub fn new(
        height: u64,
        prev_hash: Hash,
        created_ms: u64,
        transactions: Vec<Transaction>,
        rejected_tx_hashes: Vec<Hash>,
    ) -> Self {
        Self {
            height,
            prev_hash,
            created_ms,
            transactions,
            rejected_tx_hashes,
            signatures: Vec::new(),
        }
    }

    /// Bytes covered by block signatures and by the block hash.
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_u64(self.height);
        writer.write_hash(&self.prev_hash);
        writer.write_u64(self.created_ms);
        self.transactions.write(&mut writer);
        self.rejected_tx_hashes.write(&mut writer);
        writer.into_bytes()
    }

    pub fn hash(&self) -> Hash {
        hash(&self.payload_bytes())
    }

    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        let payload = self.payload_bytes();
        self.add_signature(SignatureOf::produce(keypair, &payload));
        self
    }

    /// Appends a signature unless the key already signed. Returns whether the
    /// signature was added.
    pub fn add_signature(&mut self, signature: SignatureOf) -> bool {
        if self
            .signatures
            .iter()
            .any(|s| s.public_key == signature.public_key)
        {
            return false;
        }
        self.signatures.push(signature);
        true
    }

    pub fn signed_by(&self, public_key: &PublicKey) -> bool {
        self.signatures.iter().any(|s| s.public_key == *public_key)
    }

    /// Verifies every attached signature against the payload.
    pub fn signatures_valid(&self) -> bool {
        let payload = self.payload_bytes();
        self.signatures.iter().all(|s| s.verify(&payload))
    }
}

impl Serializer for Block {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.height);
        writer.write_hash(&self.prev_hash);
        writer.write_u64(self.created_ms);
        self.transactions.write(writer);
        self.rejected_tx_hashes.write(writer);
        self.signatures.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            height: reader.read_u64()?,
            prev_hash: reader.read_hash()?,
            created_ms: reader.read_u64()?,
            transactions: Vec::read(reader)?,
            rejected_tx_hashes: Vec::read(reader)?,
            signatures: Vec::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        8 + self.prev_hash.size()
            + 8
            + self.transactions.size()
            + self.rejected_tx_hashes.size()
            + self.signatures.size()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block(height: {}, txs: {}, hash: {})",
            self.height,
            self.transactions.len(),
            self.hash()
        )
    }
}

/// Signature over a block produced by a [`KeyPair`], detached from the block
/// itself. Used by consensus votes carrying the creator's block signature.
pub fn sign_block_payload(keypair: &KeyPair, block: &Block) -> Signature {
    keypair.sign(&block.payload_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block::new(1, Hash::zero(), 1_700_000_000_000, Vec::new(), Vec::new())
    }

    #[test]
    fn test_hash_stable_under_signing() {
        let block = sample_block();
        let hash = block.hash();
        let signed = block.sign(&KeyPair::generate());
        assert_eq!(signed.hash(), hash);
        assert!(signed.signatures_valid());
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let keypair = KeyPair::generate();
        let mut block = sample_block().sign(&keypair);
        let payload = block.payload_bytes();
        assert!(!block.add_signature(SignatureOf::produce(&keypair, &payload)));
        assert_eq!(block.signatures.len(), 1);
    }

    #[test]
    fn test_roundtrip() {
        let block = sample_block().sign(&KeyPair::generate());
        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), block.size());
        assert_eq!(Block::from_bytes(&bytes).unwrap(), block);
    }
}
