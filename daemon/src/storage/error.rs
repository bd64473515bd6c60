use takara_common::serializer::ReaderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("No active transaction")]
    NoTransaction,

    #[error("Transaction already active")]
    TransactionActive,

    #[error("Unknown savepoint: {0}")]
    UnknownSavepoint(String),

    #[error("There are no prepared blocks")]
    NoPreparedState,

    #[error("Corrupted value at {0}")]
    Corrupted(String),

    #[error("Storage engine failure: {0}")]
    Engine(String),

    #[error("Internal: {0}")]
    Internal(String),
}

impl From<sled::Error> for StorageError {
    fn from(error: sled::Error) -> Self {
        StorageError::Engine(error.to_string())
    }
}

impl From<ReaderError> for StorageError {
    fn from(error: ReaderError) -> Self {
        StorageError::Corrupted(error.to_string())
    }
}
