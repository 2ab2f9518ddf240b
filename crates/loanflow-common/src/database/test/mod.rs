//! KV Store Database Tests
//!
//! Generic tests for KV store backends. Instantiate them for a backend with the
//! `kvstore_db_test!` macro and a function returning a fresh database for a test id.
#![allow(clippy::unwrap_used)]

use super::{Error, KVStore};

const PRIMARY: &str = "loanflow";
const SECONDARY: &str = "flowstate";

/// Write then read a value
pub async fn kv_write_and_read<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    let mut tx = db.begin_transaction().await.unwrap();
    tx.kv_write(PRIMARY, SECONDARY, "current", b"hello")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let value = db.kv_read(PRIMARY, SECONDARY, "current").await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"hello"[..]));

    let missing = db.kv_read(PRIMARY, SECONDARY, "other").await.unwrap();
    assert!(missing.is_none());
}

/// Overwrite a value
pub async fn kv_overwrite<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    for value in [&b"first"[..], &b"second"[..]] {
        let mut tx = db.begin_transaction().await.unwrap();
        tx.kv_write(PRIMARY, SECONDARY, "current", value)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let value = db.kv_read(PRIMARY, SECONDARY, "current").await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"second"[..]));
}

/// Remove a value
pub async fn kv_remove<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    let mut tx = db.begin_transaction().await.unwrap();
    tx.kv_write(PRIMARY, SECONDARY, "current", b"value")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = db.begin_transaction().await.unwrap();
    tx.kv_remove(PRIMARY, SECONDARY, "current").await.unwrap();
    // Removing twice is fine
    tx.kv_remove(PRIMARY, SECONDARY, "current").await.unwrap();
    tx.commit().await.unwrap();

    assert!(db
        .kv_read(PRIMARY, SECONDARY, "current")
        .await
        .unwrap()
        .is_none());
}

/// Keys are listed per namespace
pub async fn kv_list_namespaces<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    let mut tx = db.begin_transaction().await.unwrap();
    tx.kv_write(PRIMARY, SECONDARY, "b", b"1").await.unwrap();
    tx.kv_write(PRIMARY, SECONDARY, "a", b"2").await.unwrap();
    tx.kv_write(PRIMARY, "other", "c", b"3").await.unwrap();
    tx.commit().await.unwrap();

    let keys = db.kv_list(PRIMARY, SECONDARY).await.unwrap();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

    let keys = db.kv_list(PRIMARY, "other").await.unwrap();
    assert_eq!(keys, vec!["c".to_string()]);

    assert!(db.kv_list("nothing", "").await.unwrap().is_empty());
}

/// Reads inside a transaction see its own writes
pub async fn kv_read_in_transaction<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    let mut tx = db.begin_transaction().await.unwrap();
    tx.kv_write(PRIMARY, SECONDARY, "current", b"pending")
        .await
        .unwrap();

    let value = tx.kv_read(PRIMARY, SECONDARY, "current").await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"pending"[..]));
    assert_eq!(
        tx.kv_list(PRIMARY, SECONDARY).await.unwrap(),
        vec!["current".to_string()]
    );

    tx.kv_remove(PRIMARY, SECONDARY, "current").await.unwrap();
    assert!(tx
        .kv_read(PRIMARY, SECONDARY, "current")
        .await
        .unwrap()
        .is_none());
    tx.commit().await.unwrap();
}

/// Rolled back writes are not visible
pub async fn kv_rollback<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    let mut tx = db.begin_transaction().await.unwrap();
    tx.kv_write(PRIMARY, SECONDARY, "current", b"value")
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(db
        .kv_read(PRIMARY, SECONDARY, "current")
        .await
        .unwrap()
        .is_none());
}

/// Invalid namespaces and keys are rejected
pub async fn kv_invalid_key<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    assert!(db.kv_read(PRIMARY, SECONDARY, "bad key").await.is_err());
    assert!(db.kv_read("", SECONDARY, "key").await.is_err());

    let mut tx = db.begin_transaction().await.unwrap();
    assert!(tx
        .kv_write(PRIMARY, SECONDARY, "bad/key", b"value")
        .await
        .is_err());
    tx.rollback().await.unwrap();
}

/// Large values survive unchanged
pub async fn kv_large_value<DB>(db: DB)
where
    DB: KVStore<Err = Error>,
{
    let value: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

    let mut tx = db.begin_transaction().await.unwrap();
    tx.kv_write(PRIMARY, SECONDARY, "current", &value)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let read = db.kv_read(PRIMARY, SECONDARY, "current").await.unwrap();
    assert_eq!(read, Some(value));
}

/// Unit test that is expected to be passed for a correct KV store implementation
#[macro_export]
macro_rules! kvstore_db_test {
    ($make_db_fn:ident) => {
        $crate::kvstore_db_test!(
            $make_db_fn,
            kv_write_and_read,
            kv_overwrite,
            kv_remove,
            kv_list_namespaces,
            kv_read_in_transaction,
            kv_rollback,
            kv_invalid_key,
            kv_large_value
        );
    };
    ($make_db_fn:ident, $($name:ident),+ $(,)?) => {
        ::paste::paste! {
            $(
                #[tokio::test]
                async fn [<kvstore_ $name>]() {
                    use std::time::{SystemTime, UNIX_EPOCH};
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .expect("Time went backwards");

                    $crate::database::test::$name($make_db_fn(format!("test_{}_{}", now.as_nanos(), stringify!($name))).await).await;
                }
            )+
        }
    };
}
