//! Redb Error

use std::num::ParseIntError;

use loanflow_common::database;
use thiserror::Error;

/// Redb Database Error
#[derive(Debug, Error)]
pub enum Error {
    /// Redb Error
    #[error(transparent)]
    Redb(#[from] redb::Error),
    /// Redb Database Error
    #[error(transparent)]
    Database(#[from] redb::DatabaseError),
    /// Redb Transaction Error
    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),
    /// Redb Commit Error
    #[error(transparent)]
    Commit(#[from] redb::CommitError),
    /// Redb Table Error
    #[error(transparent)]
    Table(#[from] redb::TableError),
    /// Redb Storage Error
    #[error(transparent)]
    Storage(#[from] redb::StorageError),
    /// Parse int Error
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    /// Io Error
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Loanflow Database Error
    #[error(transparent)]
    LoanflowDatabase(#[from] database::Error),
    /// File was written by an unknown version
    #[error("Unknown database version: {0}")]
    UnknownDatabaseVersion(u32),
}

impl From<Error> for database::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::LoanflowDatabase(e) => e,
            e => Self::Database(Box::new(e)),
        }
    }
}
