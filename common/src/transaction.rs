use serde::{Deserialize, Serialize};
use std::fmt;

use crate::command::Command;
use crate::crypto::{hash, Hash, KeyPair, PublicKey, Signature};
use crate::model::AccountId;
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

/// Detached signature: the signing public key travels with the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureOf {
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl SignatureOf {
    pub fn produce(keypair: &KeyPair, payload: &[u8]) -> Self {
        Self {
            public_key: keypair.public_key(),
            signature: keypair.sign(payload),
        }
    }

    pub fn verify(&self, payload: &[u8]) -> bool {
        self.public_key.verify(payload, &self.signature).is_ok()
    }
}

impl Serializer for SignatureOf {
    fn write(&self, writer: &mut Writer) {
        self.public_key.write(writer);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            public_key: PublicKey::read(reader)?,
            signature: Signature::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.public_key.size() + self.signature.size()
    }
}

/// A signed list of commands issued by one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub creator: AccountId,
    pub created_ms: u64,
    pub commands: Vec<Command>,
    pub signatures: Vec<SignatureOf>,
}

impl Transaction {
    pub fn new(creator: AccountId, created_ms: u64, commands: Vec<Command>) -> Self {
        Self {
            creator,
            created_ms,
            commands,
            signatures: Vec::new(),
        }
    }

    /// Bytes covered by the signatures.
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.creator.write(&mut writer);
        writer.write_u64(self.created_ms);
        self.commands.write(&mut writer);
        writer.into_bytes()
    }

    pub fn hash(&self) -> Hash {
        hash(&self.payload_bytes())
    }

    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        let payload = self.payload_bytes();
        self.signatures.push(SignatureOf::produce(keypair, &payload));
        self
    }

    /// True when every attached signature is valid for the payload.
    pub fn signatures_valid(&self) -> bool {
        let payload = self.payload_bytes();
        !self.signatures.is_empty() && self.signatures.iter().all(|s| s.verify(&payload))
    }
}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        self.creator.write(writer);
        writer.write_u64(self.created_ms);
        self.commands.write(writer);
        self.signatures.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            creator: AccountId::read(reader)?,
            created_ms: reader.read_u64()?,
            commands: Vec::read(reader)?,
            signatures: Vec::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.creator.size() + 8 + self.commands.size() + self.signatures.size()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction(creator: {}, commands: {}, hash: {})",
            self.creator,
            self.commands.len(),
            self.hash()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction::new(
            "alice@wonderland".parse().unwrap(),
            1_700_000_000_000,
            vec![Command::SetAccountDetail {
                account_id: "alice@wonderland".parse().unwrap(),
                key: "phone".to_string(),
                value: "123".to_string(),
            }],
        )
    }

    #[test]
    fn test_hash_ignores_signatures() {
        let keypair = KeyPair::generate();
        let tx = sample_tx();
        let unsigned_hash = tx.hash();
        let signed = tx.sign(&keypair);
        assert_eq!(signed.hash(), unsigned_hash);
        assert!(signed.signatures_valid());
    }

    #[test]
    fn test_invalid_signature_detected() {
        let keypair = KeyPair::generate();
        let mut tx = sample_tx().sign(&keypair);
        tx.created_ms += 1;
        assert!(!tx.signatures_valid());
    }

    #[test]
    fn test_roundtrip() {
        let tx = sample_tx().sign(&KeyPair::generate());
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), tx.size());
        assert_eq!(Transaction::from_bytes(&bytes).unwrap(), tx);
    }
}
