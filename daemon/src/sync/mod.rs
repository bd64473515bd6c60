pub mod chain_validator;
pub mod synchronizer;

pub use chain_validator::ChainValidator;
pub use synchronizer::Synchronizer;

use thiserror::Error;

use crate::storage::error::StorageError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to download and commit blocks from the given peers")]
    PeersExhausted,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
