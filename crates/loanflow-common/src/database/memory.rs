//! In-memory KV store
//!
//! Writes are buffered in the transaction and applied atomically on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    validate_kvstore_params, DbTransactionFinalizer, Error, KVStore, KVStoreDatabase,
    KVStoreTransaction,
};

type Key = (String, String, String);
type Store = BTreeMap<Key, Vec<u8>>;

fn key(primary_namespace: &str, secondary_namespace: &str, key: &str) -> Key {
    (
        primary_namespace.to_owned(),
        secondary_namespace.to_owned(),
        key.to_owned(),
    )
}

fn list_keys<'a, I>(entries: I, primary_namespace: &str, secondary_namespace: &str) -> Vec<String>
where
    I: Iterator<Item = &'a Key>,
{
    entries
        .filter(|(p, s, _)| p == primary_namespace && s == secondary_namespace)
        .map(|(_, _, k)| k.clone())
        .collect()
}

/// In-memory database
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    store: Arc<RwLock<Store>>,
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transaction over a [`MemoryDatabase`]
#[derive(Debug)]
pub struct MemoryTransaction {
    store: Arc<RwLock<Store>>,
    // `None` marks a removal
    pending: BTreeMap<Key, Option<Vec<u8>>>,
}

#[async_trait]
impl KVStoreDatabase for MemoryDatabase {
    type Err = Error;

    async fn kv_read(
        &self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key_name: &str,
    ) -> Result<Option<Vec<u8>>, Self::Err> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key_name))?;
        Ok(self
            .store
            .read()
            .get(&key(primary_namespace, secondary_namespace, key_name))
            .cloned())
    }

    async fn kv_list(
        &self,
        primary_namespace: &str,
        secondary_namespace: &str,
    ) -> Result<Vec<String>, Self::Err> {
        validate_kvstore_params(primary_namespace, secondary_namespace, None)?;
        let store = self.store.read();
        Ok(list_keys(
            store.keys(),
            primary_namespace,
            secondary_namespace,
        ))
    }
}

#[async_trait]
impl KVStore for MemoryDatabase {
    async fn begin_transaction(
        &self,
    ) -> Result<Box<dyn KVStoreTransaction<Self::Err> + Send + Sync>, Error> {
        Ok(Box::new(MemoryTransaction {
            store: Arc::clone(&self.store),
            pending: BTreeMap::new(),
        }))
    }
}

#[async_trait]
impl KVStoreTransaction<Error> for MemoryTransaction {
    async fn kv_read(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key_name: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key_name))?;
        let k = key(primary_namespace, secondary_namespace, key_name);
        if let Some(pending) = self.pending.get(&k) {
            return Ok(pending.clone());
        }
        Ok(self.store.read().get(&k).cloned())
    }

    async fn kv_write(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key_name: &str,
        value: &[u8],
    ) -> Result<(), Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key_name))?;
        self.pending.insert(
            key(primary_namespace, secondary_namespace, key_name),
            Some(value.to_vec()),
        );
        Ok(())
    }

    async fn kv_remove(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key_name: &str,
    ) -> Result<(), Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key_name))?;
        self.pending
            .insert(key(primary_namespace, secondary_namespace, key_name), None);
        Ok(())
    }

    async fn kv_list(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
    ) -> Result<Vec<String>, Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, None)?;

        let mut merged: BTreeMap<&Key, bool> = BTreeMap::new();
        let store = self.store.read();
        for k in store.keys() {
            merged.insert(k, true);
        }
        for (k, value) in &self.pending {
            merged.insert(k, value.is_some());
        }

        Ok(list_keys(
            merged
                .into_iter()
                .filter_map(|(k, present)| present.then_some(k)),
            primary_namespace,
            secondary_namespace,
        ))
    }
}

#[async_trait]
impl DbTransactionFinalizer for MemoryTransaction {
    type Err = Error;

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let MemoryTransaction { store, pending } = *self;
        let mut store = store.write();
        for (k, value) in pending {
            match value {
                Some(value) => {
                    store.insert(k, value);
                }
                None => {
                    store.remove(&k);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        Ok(())
    }
}
