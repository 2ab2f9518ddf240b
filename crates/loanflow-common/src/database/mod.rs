//! Loanflow Database

use async_trait::async_trait;

mod kvstore;
mod memory;

#[cfg(any(test, feature = "test"))]
pub mod test;

pub use kvstore::{
    validate_kvstore_params, validate_kvstore_string, KVStore, KVStoreDatabase,
    KVStoreTransaction, KVSTORE_NAMESPACE_KEY_ALPHABET, KVSTORE_NAMESPACE_KEY_MAX_LEN,
};
pub use memory::MemoryDatabase;

/// Shared handle to a KV store backend
pub type DynKVStore = std::sync::Arc<dyn KVStore<Err = Error> + Send + Sync>;

/// Loanflow database error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database Error
    #[error(transparent)]
    Database(Box<dyn std::error::Error + Send + Sync>),
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Invalid KV store namespace or key
    #[error("Invalid KV store key or namespace: {0}")]
    KVStoreInvalidKey(String),
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Finishes a database transaction
#[async_trait]
pub trait DbTransactionFinalizer {
    /// Error
    type Err: Into<Error> + From<Error>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<(), Self::Err>;

    /// Discard the transaction
    async fn rollback(self: Box<Self>) -> Result<(), Self::Err>;
}
