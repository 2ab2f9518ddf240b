//! Fake Chain Error

use thiserror::Error;

/// Fake Chain Error
#[derive(Debug, Error)]
pub enum Error {
    /// Transaction was never submitted
    #[error("Unknown transaction {0}")]
    UnknownTransaction(String),
    /// Scripted signing rejection
    #[error("User rejected `{0}`")]
    UserRejected(String),
    /// Scripted broadcast failure
    #[error("Could not broadcast `{0}`")]
    SubmissionFailed(String),
    /// Scripted transaction that never confirms
    #[error("Transaction {0} is not confirming")]
    NeverConfirms(String),
    /// Call arguments do not match the function
    #[error("Unexpected arguments for `{0}`")]
    UnexpectedArguments(String),
}

impl From<Error> for loanflow_common::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::UserRejected(_) => Self::UserRejected,
            Error::NeverConfirms(tx_hash) => Self::Timeout(tx_hash),
            e => Self::Chain(e.to_string()),
        }
    }
}
