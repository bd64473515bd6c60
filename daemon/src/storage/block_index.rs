//! Lookup index derived from committed blocks.
//!
//! For every committed block the index records: the position of each
//! transaction by hash, the rejected transaction hashes, an entry per
//! account that took part in an asset transfer, and a per-creator
//! transaction log. Entries are buffered and flushed into the enclosing KV
//! transaction in one go.

use std::collections::BTreeSet;

use log::trace;
use takara_common::block::Block;
use takara_common::command::Command;
use takara_common::crypto::Hash;
use takara_common::model::{AccountId, AssetId};
use takara_common::serializer::{Reader, ReaderError, Serializer, Writer};

use crate::storage::error::StorageError;
use crate::storage::kv::KvSession;

const COMMITTED_PREFIX: &str = "idx/tx/c/";
const REJECTED_PREFIX: &str = "idx/tx/r/";
pub const INDEX_ROOT: &str = "idx/";

/// Where a transaction sits in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPosition {
    pub height: u64,
    pub index: u64,
}

/// Indexed record: position plus the transaction creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRecord {
    pub position: TxPosition,
    pub created_ms: u64,
}

impl Serializer for TxRecord {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.position.height);
        writer.write_u64(self.position.index);
        writer.write_u64(self.created_ms);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            position: TxPosition {
                height: reader.read_u64()?,
                index: reader.read_u64()?,
            },
            created_ms: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        24
    }
}

/// Buffered writer of index entries.
#[derive(Default)]
pub struct Indexer {
    entries: Vec<(String, Vec<u8>)>,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed_tx_hash(&mut self, position: TxPosition, created_ms: u64, hash: &Hash) {
        let record = TxRecord {
            position,
            created_ms,
        };
        self.entries
            .push((format!("{}{}", COMMITTED_PREFIX, hash.to_hex()), record.to_bytes()));
    }

    pub fn rejected_tx_hash(&mut self, position: TxPosition, created_ms: u64, hash: &Hash) {
        let record = TxRecord {
            position,
            created_ms,
        };
        self.entries
            .push((format!("{}{}", REJECTED_PREFIX, hash.to_hex()), record.to_bytes()));
    }

    /// Account activity entry; `asset_id` keys asset-scoped lookups, `None`
    /// the plain per-creator transaction log.
    pub fn tx_positions(
        &mut self,
        account_id: &AccountId,
        asset_id: Option<&AssetId>,
        created_ms: u64,
        position: TxPosition,
    ) {
        let record = TxRecord {
            position,
            created_ms,
        };
        self.entries
            .push((account_key(account_id, asset_id, position), record.to_bytes()));
    }

    /// Writes every buffered entry into the session at once.
    pub fn flush(&mut self, session: &mut KvSession) -> Result<(), StorageError> {
        trace!("flushing {} index entries", self.entries.len());
        for (key, value) in self.entries.drain(..) {
            session.put(key.as_bytes(), &value)?;
        }
        Ok(())
    }
}

// Heights and indices are zero padded so lexicographic scans walk the chain
// in order.
fn account_key(account_id: &AccountId, asset_id: Option<&AssetId>, position: TxPosition) -> String {
    match asset_id {
        Some(asset_id) => format!(
            "idx/a/{}/ast/{}/{:020}/{:010}",
            account_id, asset_id, position.height, position.index
        ),
        None => format!(
            "idx/a/{}/tx/{:020}/{:010}",
            account_id, position.height, position.index
        ),
    }
}

pub struct BlockIndex {
    indexer: Indexer,
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockIndex {
    pub fn new() -> Self {
        Self {
            indexer: Indexer::new(),
        }
    }

    /// Derives every index entry for the block and flushes them atomically
    /// into the session.
    pub fn index(&mut self, session: &mut KvSession, block: &Block) -> Result<(), StorageError> {
        let height = block.height;
        for (index, transaction) in block.transactions.iter().enumerate() {
            let position = TxPosition {
                height,
                index: index as u64,
            };
            let hash = transaction.hash();
            self.indexer
                .committed_tx_hash(position, transaction.created_ms, &hash);
            self.index_transfers(transaction, position);
            self.indexer
                .tx_positions(&transaction.creator, None, transaction.created_ms, position);
        }

        let rejected_position = TxPosition { height, index: 0 };
        for rejected in &block.rejected_tx_hashes {
            self.indexer.rejected_tx_hash(rejected_position, 0, rejected);
        }

        self.indexer.flush(session)
    }

    // every account touching a transfer gets an asset-scoped entry,
    // deduplicated per command
    fn index_transfers(&mut self, transaction: &takara_common::transaction::Transaction, position: TxPosition) {
        for command in &transaction.commands {
            if let Command::TransferAsset {
                src_account_id,
                dest_account_id,
                asset_id,
                ..
            } = command
            {
                let mut participants = BTreeSet::new();
                participants.insert(src_account_id);
                participants.insert(dest_account_id);
                participants.insert(&transaction.creator);
                for account in participants {
                    self.indexer.tx_positions(
                        account,
                        Some(asset_id),
                        transaction.created_ms,
                        position,
                    );
                }
            }
        }
    }
}

/// Reads back the committed-transaction record for a hash.
pub fn get_committed_tx(
    session: &mut KvSession,
    hash: &Hash,
) -> Result<Option<TxRecord>, StorageError> {
    let key = format!("{}{}", COMMITTED_PREFIX, hash.to_hex());
    match session.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(TxRecord::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

pub fn get_rejected_tx(
    session: &mut KvSession,
    hash: &Hash,
) -> Result<Option<TxRecord>, StorageError> {
    let key = format!("{}{}", REJECTED_PREFIX, hash.to_hex());
    match session.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(TxRecord::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// All positions where the account touched the given asset, chain order.
pub fn get_account_asset_positions(
    session: &mut KvSession,
    account_id: &AccountId,
    asset_id: &AssetId,
) -> Result<Vec<TxRecord>, StorageError> {
    let prefix = format!("idx/a/{}/ast/{}/", account_id, asset_id);
    let mut records = Vec::new();
    for (_, value) in session.seek(prefix.as_bytes())? {
        records.push(TxRecord::from_bytes(&value)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::{KvBackend, MemoryBackend};
    use std::sync::Arc;
    use takara_common::transaction::Transaction;

    fn session() -> KvSession {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let mut session = KvSession::new(backend, &[]);
        session.begin().unwrap();
        session
    }

    #[test]
    fn test_transfer_round_trip() {
        let mut s = session();
        let alice: AccountId = "alice@wonderland".parse().unwrap();
        let bob: AccountId = "bob@wonderland".parse().unwrap();
        let coin: AssetId = "coin#wonderland".parse().unwrap();

        let tx = Transaction::new(
            alice.clone(),
            77,
            vec![Command::TransferAsset {
                src_account_id: alice.clone(),
                dest_account_id: bob.clone(),
                asset_id: coin.clone(),
                description: String::new(),
                amount: "5".parse().unwrap(),
            }],
        );
        let tx_hash = tx.hash();
        let block = Block::new(4, Hash::zero(), 0, vec![tx], vec![Hash::max()]);

        BlockIndex::new().index(&mut s, &block).unwrap();

        let committed = get_committed_tx(&mut s, &tx_hash).unwrap().unwrap();
        assert_eq!(committed.position, TxPosition { height: 4, index: 0 });
        assert_eq!(committed.created_ms, 77);

        for account in [&alice, &bob] {
            let records = get_account_asset_positions(&mut s, account, &coin).unwrap();
            assert_eq!(records.len(), 1, "no entry for {}", account);
            assert_eq!(records[0].position.height, 4);
        }

        let rejected = get_rejected_tx(&mut s, &Hash::max()).unwrap().unwrap();
        assert_eq!(rejected.position, TxPosition { height: 4, index: 0 });
        assert_eq!(rejected.created_ms, 0);
    }

    #[test]
    fn test_creator_log_entry() {
        let mut s = session();
        let alice: AccountId = "alice@wonderland".parse().unwrap();
        let tx = Transaction::new(alice.clone(), 1, Vec::new());
        let block = Block::new(1, Hash::zero(), 0, vec![tx], Vec::new());
        BlockIndex::new().index(&mut s, &block).unwrap();

        let prefix = format!("idx/a/{}/tx/", alice);
        assert_eq!(s.seek(prefix.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn test_positions_sorted_across_heights() {
        let mut s = session();
        let alice: AccountId = "alice@wonderland".parse().unwrap();
        let bob: AccountId = "bob@wonderland".parse().unwrap();
        let coin: AssetId = "coin#wonderland".parse().unwrap();
        let transfer = |h: u64| {
            let tx = Transaction::new(
                alice.clone(),
                h,
                vec![Command::TransferAsset {
                    src_account_id: alice.clone(),
                    dest_account_id: bob.clone(),
                    asset_id: coin.clone(),
                    description: String::new(),
                    amount: "1".parse().unwrap(),
                }],
            );
            Block::new(h, Hash::zero(), 0, vec![tx], Vec::new())
        };

        let mut index = BlockIndex::new();
        // heights around a decimal-width boundary
        for height in [9, 10, 11] {
            index.index(&mut s, &transfer(height)).unwrap();
        }
        let records = get_account_asset_positions(&mut s, &alice, &coin).unwrap();
        let heights: Vec<u64> = records.iter().map(|r| r.position.height).collect();
        assert_eq!(heights, vec![9, 10, 11]);
    }
}
