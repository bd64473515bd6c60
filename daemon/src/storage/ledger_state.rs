use takara_common::crypto::Hash;
use takara_common::model::Peer;
use takara_common::serializer::{Reader, ReaderError, Serializer, Writer};

/// Height and hash of the current top block; exactly one per world state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopBlockInfo {
    pub height: u64,
    pub hash: Hash,
}

impl TopBlockInfo {
    pub fn new(height: u64, hash: Hash) -> Self {
        Self { height, hash }
    }
}

impl Serializer for TopBlockInfo {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.height);
        writer.write_hash(&self.hash);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            height: reader.read_u64()?,
            hash: reader.read_hash()?,
        })
    }

    fn size(&self) -> usize {
        8 + self.hash.size()
    }
}

/// Immutable snapshot of the ledger taken at each commit.
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub ledger_peers: Vec<Peer>,
    pub syncing_peers: Vec<Peer>,
    pub top_block_info: TopBlockInfo,
}

impl LedgerState {
    pub fn new(ledger_peers: Vec<Peer>, syncing_peers: Vec<Peer>, top_block_info: TopBlockInfo) -> Self {
        Self {
            ledger_peers,
            syncing_peers,
            top_block_info,
        }
    }
}
