pub mod block_index;
pub mod block_store;
pub mod cache;
pub mod error;
pub mod executor;
pub mod kv;
pub mod ledger_state;
pub mod mutable_storage;
pub mod radix_tree;
pub mod restorer;
pub mod storage;
pub mod tx_cache;
pub mod wsv;

pub use block_index::BlockIndex;
pub use block_store::{BlockStore, MemoryBlockStore, SledBlockStore};
pub use error::StorageError;
pub use ledger_state::{LedgerState, TopBlockInfo};
pub use mutable_storage::MutableStorage;
pub use storage::{insert_genesis, Storage, StorageOptions};
