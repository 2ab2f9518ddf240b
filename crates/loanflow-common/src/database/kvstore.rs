//! Key-Value Store Database traits and utilities
//!
//! Values live under `(primary_namespace, secondary_namespace, key)`. Flow state is persisted
//! through these traits, so any backend offering namespaced byte values with transactions can
//! hold it.

use std::fmt::Debug;

use async_trait::async_trait;

use super::{DbTransactionFinalizer, Error};

/// Valid ASCII characters for namespace and key strings in KV store
pub const KVSTORE_NAMESPACE_KEY_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";

/// Maximum length for namespace and key strings in KV store
pub const KVSTORE_NAMESPACE_KEY_MAX_LEN: usize = 120;

/// Validates a single namespace or key string
pub fn validate_kvstore_string(s: &str) -> Result<(), Error> {
    if s.len() > KVSTORE_NAMESPACE_KEY_MAX_LEN {
        return Err(Error::KVStoreInvalidKey(format!(
            "`{s}` is longer than {KVSTORE_NAMESPACE_KEY_MAX_LEN} characters"
        )));
    }

    if let Some(c) = s
        .chars()
        .find(|c| !KVSTORE_NAMESPACE_KEY_ALPHABET.contains(*c))
    {
        return Err(Error::KVStoreInvalidKey(format!(
            "`{s}` contains `{c}`, only ASCII letters, digits, `_` and `-` are allowed"
        )));
    }

    Ok(())
}

/// Validates namespace and key parameters for KV store operations
///
/// `key` is `None` for namespace listings.
pub fn validate_kvstore_params(
    primary_namespace: &str,
    secondary_namespace: &str,
    key: Option<&str>,
) -> Result<(), Error> {
    validate_kvstore_string(primary_namespace)?;
    validate_kvstore_string(secondary_namespace)?;

    if primary_namespace.is_empty() && !secondary_namespace.is_empty() {
        return Err(Error::KVStoreInvalidKey(
            "secondary namespace requires a primary namespace".to_string(),
        ));
    }

    if let Some(key) = key {
        validate_kvstore_string(key)?;

        if key.is_empty() {
            return Err(Error::KVStoreInvalidKey("key must not be empty".to_string()));
        }

        if key == primary_namespace || key == secondary_namespace {
            return Err(Error::KVStoreInvalidKey(format!(
                "key `{key}` conflicts with its namespace"
            )));
        }
    }

    Ok(())
}

/// Key-Value Store Transaction trait
#[async_trait]
pub trait KVStoreTransaction<Error>: DbTransactionFinalizer<Err = Error> {
    /// Read value, seeing writes made earlier in this transaction
    async fn kv_read(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, Error>;

    /// Write value
    async fn kv_write(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), Error>;

    /// Remove value, removing a missing key is not an error
    async fn kv_remove(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
    ) -> Result<(), Error>;

    /// List keys in a namespace, sorted
    async fn kv_list(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
    ) -> Result<Vec<String>, Error>;
}

/// Key-Value Store Database trait
#[async_trait]
pub trait KVStoreDatabase: Debug {
    /// KV Store Database Error
    type Err: Into<Error> + From<Error>;

    /// Read committed value
    async fn kv_read(
        &self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, Self::Err>;

    /// List committed keys in a namespace, sorted
    async fn kv_list(
        &self,
        primary_namespace: &str,
        secondary_namespace: &str,
    ) -> Result<Vec<String>, Self::Err>;
}

/// Key-Value Store trait combining read operations with transaction support
#[async_trait]
pub trait KVStore: KVStoreDatabase {
    /// Begins a KV transaction
    async fn begin_transaction(
        &self,
    ) -> Result<Box<dyn KVStoreTransaction<Self::Err> + Send + Sync>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_params() {
        assert!(validate_kvstore_params("loanflow", "flowstate", Some("current")).is_ok());
        assert!(validate_kvstore_params("loanflow", "", None).is_ok());
        assert!(validate_kvstore_params("", "flowstate", Some("current")).is_err());
        assert!(validate_kvstore_params("loanflow", "flowstate", Some("")).is_err());
        assert!(validate_kvstore_params("loanflow", "flowstate", Some("flowstate")).is_err());
        assert!(validate_kvstore_params("loan flow", "", Some("a")).is_err());
    }

    #[test]
    fn test_max_len() {
        let long = "a".repeat(KVSTORE_NAMESPACE_KEY_MAX_LEN + 1);
        assert!(validate_kvstore_string(&long).is_err());
        let ok = "a".repeat(KVSTORE_NAMESPACE_KEY_MAX_LEN);
        assert!(validate_kvstore_string(&ok).is_ok());
    }
}
