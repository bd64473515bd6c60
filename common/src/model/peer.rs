use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::PublicKey;
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

/// Network peer as recorded in the world state.
///
/// Syncing peers replicate the ledger but never take part in consensus, so
/// they are kept out of cluster ordering and supermajority counting.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub public_key: PublicKey,
    pub address: String,
    pub tls_certificate: Option<String>,
    pub syncing: bool,
}

impl Peer {
    pub fn new(public_key: PublicKey, address: impl Into<String>) -> Self {
        Self {
            public_key,
            address: address.into(),
            tls_certificate: None,
            syncing: false,
        }
    }

    pub fn syncing(public_key: PublicKey, address: impl Into<String>) -> Self {
        Self {
            public_key,
            address: address.into(),
            tls_certificate: None,
            syncing: true,
        }
    }
}

impl Serializer for Peer {
    fn write(&self, writer: &mut Writer) {
        self.public_key.write(writer);
        writer.write_string(&self.address);
        self.tls_certificate.write(writer);
        writer.write_bool(self.syncing);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            public_key: PublicKey::read(reader)?,
            address: reader.read_string()?,
            tls_certificate: Option::read(reader)?,
            syncing: reader.read_bool()?,
        })
    }

    fn size(&self) -> usize {
        self.public_key.size()
            + 2
            + self.address.len()
            + self.tls_certificate.size()
            + 1
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.public_key, self.address)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("public_key", &self.public_key)
            .field("address", &self.address)
            .field("syncing", &self.syncing)
            .finish()
    }
}
