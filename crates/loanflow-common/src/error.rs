//! Errors

use thiserror::Error;

use crate::flow::{FlowId, ValidationError};
use crate::{Address, Amount};

/// Loanflow Error
#[derive(Debug, Error)]
pub enum Error {
    /// No wallet account connected
    #[error("No account connected")]
    NoAccount,
    /// No declaration for a flow
    #[error("No declaration registered for flow `{0}`")]
    UnknownFlow(FlowId),
    /// Declaration has no such step
    #[error("Unknown step `{0}`")]
    UnknownStep(String),
    /// Deployment has no such branch
    #[error("Unknown collateral branch {0}")]
    UnknownBranch(u32),
    /// Account cannot cover the amount a flow spends
    #[error("Balance {available} of {token} is below {required}")]
    InsufficientBalance {
        /// Token
        token: Address,
        /// Amount the flow spends
        required: Amount,
        /// Current balance
        available: Amount,
    },
    /// Signing prompt rejected by the user
    #[error("User rejected the request")]
    UserRejected,
    /// Chain client failure
    #[error("Chain error: {0}")]
    Chain(String),
    /// Transaction reverted
    #[error("Transaction {0} reverted")]
    Reverted(String),
    /// Gave up waiting for the chain
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    /// Indexer failure
    #[error("Read model error: {0}")]
    ReadModel(String),
    /// Receipt is missing an expected log
    #[error("Receipt of {tx_hash} has no `{event}` log")]
    MissingLog {
        /// Transaction hash
        tx_hash: String,
        /// Event name
        event: String,
    },
    /// Commit produced no artifact
    #[error("Commit returned no transaction")]
    MissingArtifact,
    /// Custom error
    #[error("`{0}`")]
    Custom(String),
    /// Validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Step transition error
    #[error(transparent)]
    StepTransition(#[from] crate::state::Error),
    /// Database error
    #[error(transparent)]
    Database(#[from] crate::database::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
    /// Hex error
    #[error(transparent)]
    Hex(#[from] crate::util::hex::Error),
}
