//! Chain boundary
//!
//! The engine only needs three things from a chain client: read a value, submit a signed call
//! and get back a transaction hash, and wait until a hash is confirmed. Everything about wire
//! formats, signing and transport lives behind [`ChainClient`].

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::{Address, TroveId};
use crate::amount::Amount;
use crate::error::Error;

/// Read call used while planning steps
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ReadCall {
    /// ERC20 allowance `owner -> spender`
    Allowance {
        /// Token
        token: Address,
        /// Token holder
        owner: Address,
        /// Contract allowed to spend
        spender: Address,
    },
    /// ERC20 balance
    Balance {
        /// Token
        token: Address,
        /// Token holder
        owner: Address,
    },
}

/// Argument of a contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum CallArg {
    /// Address
    Address(Address),
    /// Token amount or 18 decimal fixed point value
    Amount(Amount),
    /// Trove id
    TroveId(TroveId),
    /// Small unsigned integer (branch id, index, iteration bound)
    Uint(u64),
    /// Boolean
    Bool(bool),
}

/// State changing contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Target contract
    pub to: Address,
    /// Function name
    pub function: String,
    /// Positional arguments
    pub args: Vec<CallArg>,
    /// Native value sent along
    pub value: Amount,
}

impl ContractCall {
    /// Call without native value
    pub fn new<S: Into<String>>(to: Address, function: S, args: Vec<CallArg>) -> Self {
        Self {
            to,
            function: function.into(),
            args,
            value: Amount::ZERO,
        }
    }
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReceiptStatus {
    /// Executed
    Success,
    /// Reverted
    Reverted,
}

/// Decoded event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Event name
    pub event: String,
    /// Decoded fields
    pub fields: BTreeMap<String, String>,
}

/// Transaction receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Status
    pub status: ReceiptStatus,
    /// Block the transaction was included in
    pub block_number: u64,
    /// Event logs
    pub logs: Vec<Log>,
}

impl Receipt {
    /// First log of an event
    pub fn find_log(&self, event: &str) -> Option<&Log> {
        self.logs.iter().find(|log| log.event == event)
    }
}

/// Chain client
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Read a value
    async fn read(&self, call: ReadCall) -> Result<Amount, Error>;

    /// Ask the wallet to sign and broadcast a call, returns the transaction hash
    ///
    /// A rejected signing prompt is reported as [`Error::UserRejected`].
    async fn submit(&self, from: Address, call: ContractCall) -> Result<String, Error>;

    /// Wait until a transaction is mined and return its receipt
    ///
    /// How long to wait is up to the implementation; giving up is reported as
    /// [`Error::Timeout`].
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Receipt, Error>;

    /// Receipt of an already mined transaction, `None` if not mined
    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, Error>;
}
