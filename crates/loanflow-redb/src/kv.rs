//! Redb KV store

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use loanflow_common::database::{
    self, validate_kvstore_params, DbTransactionFinalizer, KVStore, KVStoreDatabase,
    KVStoreTransaction,
};
use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use tracing::instrument;

use crate::error::Error;

type KvKey = (&'static str, &'static str, &'static str);

const CONFIG_TABLE: TableDefinition<&str, &str> = TableDefinition::new("config");
// <(primary_namespace, secondary_namespace, key), value>
const KV_STORE_TABLE: TableDefinition<KvKey, &[u8]> = TableDefinition::new("kv_store");

const DATABASE_VERSION: u32 = 1;

fn read_entry<T>(
    table: &T,
    primary_namespace: &str,
    secondary_namespace: &str,
    key: &str,
) -> Result<Option<Vec<u8>>, Error>
where
    T: ReadableTable<KvKey, &'static [u8]>,
{
    Ok(table
        .get((primary_namespace, secondary_namespace, key))?
        .map(|value| value.value().to_vec()))
}

fn list_keys<T>(
    table: &T,
    primary_namespace: &str,
    secondary_namespace: &str,
) -> Result<Vec<String>, Error>
where
    T: ReadableTable<KvKey, &'static [u8]>,
{
    let mut keys = Vec::new();

    // Keys of a namespace are contiguous and the empty key is never stored
    for entry in table.range((primary_namespace, secondary_namespace, "")..)? {
        let (entry_key, _) = entry?;
        let (primary, secondary, key) = entry_key.value();
        if primary != primary_namespace || secondary != secondary_namespace {
            break;
        }
        keys.push(key.to_string());
    }

    Ok(keys)
}

/// Redb database holding flow state
#[derive(Debug, Clone)]
pub struct FlowRedbDatabase {
    db: Arc<Database>,
}

impl FlowRedbDatabase {
    /// Open or create a database file
    ///
    /// Missing parent directories are created. A file written by another version is refused.
    pub fn new(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)?;

        let db_version = {
            let read_txn = db.begin_read()?;
            match read_txn.open_table(CONFIG_TABLE) {
                Ok(table) => table.get("db_version")?.map(|v| v.value().to_string()),
                Err(TableError::TableDoesNotExist(_)) => None,
                Err(err) => return Err(err.into()),
            }
        };

        match db_version {
            Some(db_version) => {
                let db_version: u32 = db_version.parse()?;
                if db_version != DATABASE_VERSION {
                    tracing::warn!(
                        "Database is at version {} but only {} is supported",
                        db_version,
                        DATABASE_VERSION
                    );
                    return Err(Error::UnknownDatabaseVersion(db_version));
                }
                tracing::debug!("Database is at current version {}", DATABASE_VERSION);
            }
            None => {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(CONFIG_TABLE)?;
                    let _ = write_txn.open_table(KV_STORE_TABLE)?;
                    table.insert("db_version", DATABASE_VERSION.to_string().as_str())?;
                }
                write_txn.commit()?;
                tracing::info!("Created database at {}", path.display());
            }
        }

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl KVStoreDatabase for FlowRedbDatabase {
    type Err = database::Error;

    #[instrument(skip_all)]
    async fn kv_read(
        &self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, Self::Err> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key))?;

        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(KV_STORE_TABLE).map_err(Error::from)?;
        Ok(read_entry(&table, primary_namespace, secondary_namespace, key)?)
    }

    #[instrument(skip_all)]
    async fn kv_list(
        &self,
        primary_namespace: &str,
        secondary_namespace: &str,
    ) -> Result<Vec<String>, Self::Err> {
        validate_kvstore_params(primary_namespace, secondary_namespace, None)?;

        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(KV_STORE_TABLE).map_err(Error::from)?;
        Ok(list_keys(&table, primary_namespace, secondary_namespace)?)
    }
}

#[async_trait]
impl KVStore for FlowRedbDatabase {
    async fn begin_transaction(
        &self,
    ) -> Result<Box<dyn KVStoreTransaction<Self::Err> + Send + Sync>, database::Error> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;
        Ok(Box::new(RedbKvTransaction {
            write_txn: Some(write_txn),
        }))
    }
}

/// Write transaction over a [`FlowRedbDatabase`]
///
/// Dropping it without a commit discards the writes.
struct RedbKvTransaction {
    write_txn: Option<WriteTransaction>,
}

impl RedbKvTransaction {
    fn txn(&mut self) -> Result<&mut WriteTransaction, database::Error> {
        self.write_txn
            .as_mut()
            .ok_or_else(|| database::Error::Internal("Transaction already consumed".to_owned()))
    }
}

#[async_trait]
impl KVStoreTransaction<database::Error> for RedbKvTransaction {
    async fn kv_read(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, database::Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key))?;

        let table = self
            .txn()?
            .open_table(KV_STORE_TABLE)
            .map_err(Error::from)?;
        Ok(read_entry(&table, primary_namespace, secondary_namespace, key)?)
    }

    #[instrument(skip(self, value), fields(len = value.len()))]
    async fn kv_write(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), database::Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key))?;

        let mut table = self
            .txn()?
            .open_table(KV_STORE_TABLE)
            .map_err(Error::from)?;
        table
            .insert((primary_namespace, secondary_namespace, key), value)
            .map_err(Error::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn kv_remove(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
        key: &str,
    ) -> Result<(), database::Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, Some(key))?;

        let mut table = self
            .txn()?
            .open_table(KV_STORE_TABLE)
            .map_err(Error::from)?;
        table
            .remove((primary_namespace, secondary_namespace, key))
            .map_err(Error::from)?;

        Ok(())
    }

    async fn kv_list(
        &mut self,
        primary_namespace: &str,
        secondary_namespace: &str,
    ) -> Result<Vec<String>, database::Error> {
        validate_kvstore_params(primary_namespace, secondary_namespace, None)?;

        let table = self
            .txn()?
            .open_table(KV_STORE_TABLE)
            .map_err(Error::from)?;
        Ok(list_keys(&table, primary_namespace, secondary_namespace)?)
    }
}

#[async_trait]
impl DbTransactionFinalizer for RedbKvTransaction {
    type Err = database::Error;

    async fn commit(mut self: Box<Self>) -> Result<(), database::Error> {
        if let Some(txn) = self.write_txn.take() {
            txn.commit().map_err(Error::from)?;
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), database::Error> {
        if let Some(txn) = self.write_txn.take() {
            txn.abort().map_err(Error::from)?;
        }
        Ok(())
    }
}

impl Drop for RedbKvTransaction {
    fn drop(&mut self) {
        if let Some(txn) = self.write_txn.take() {
            let _ = txn.abort();
        }
    }
}
