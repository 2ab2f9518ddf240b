//! Fake chain for loanflow
//!
//! Used for testing where no node or wallet is available

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loanflow_common::parking_lot::Mutex;
use loanflow_common::{
    Address, Amount, Branch, CallArg, ChainClient, ContractCall, Deployment, IndexedTrove, Log,
    ReadCall, Receipt, ReceiptStatus, TroveId,
};
use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::instrument;

pub mod error;
mod read_model;

pub use error::Error;
pub use read_model::FakeReadModel;

/// Event emitted when a trove is opened
pub const TROVE_OPERATION_EVENT: &str = "TroveOperation";

/// Scripted failure of the next call to a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureMode {
    /// Signing prompt is rejected
    UserRejected,
    /// Broadcast fails
    SubmissionError,
    /// Transaction is mined and reverts
    Revert,
    /// Transaction never confirms
    NeverConfirm,
}

/// Fake chain settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeChainConfig {
    /// Delay before a transaction is mined
    #[serde(with = "loanflow_common::util::duration_millis")]
    pub confirmation_delay: Duration,
    /// Mine hashes this chain never saw, as if they were broadcast before a restart
    pub confirm_unknown_transactions: bool,
    /// Token balance of accounts without an explicit one
    pub default_balance: Amount,
    /// High bits of transaction hashes, keeps hashes of different runs apart
    pub hash_prefix: u64,
}

impl Default for FakeChainConfig {
    fn default() -> Self {
        Self {
            confirmation_delay: Duration::ZERO,
            confirm_unknown_transactions: false,
            default_balance: Amount::new(1_000_000 * Amount::WAD.value()),
            hash_prefix: 0,
        }
    }
}

#[derive(Debug)]
struct PendingTransaction {
    from: Address,
    call: ContractCall,
    failure: Option<FailureMode>,
}

#[derive(Debug, Default)]
pub(crate) struct ChainState {
    pub(crate) block_number: u64,
    pub(crate) indexed_block: u64,
    pub(crate) troves: HashMap<(u32, TroveId), IndexedTrove>,
    nonce: u64,
    allowances: HashMap<(Address, Address, Address), Amount>,
    balances: HashMap<(Address, Address), Amount>,
    pending: HashMap<String, PendingTransaction>,
    receipts: HashMap<String, Receipt>,
    failures: HashMap<String, FailureMode>,
    submitted: Vec<ContractCall>,
}

/// In-process chain
#[derive(Debug, Clone)]
pub struct FakeChain {
    deployment: Arc<Deployment>,
    config: FakeChainConfig,
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    /// Create new [`FakeChain`]
    pub fn new(deployment: Deployment, config: FakeChainConfig) -> Self {
        Self {
            deployment: Arc::new(deployment),
            config,
            state: Arc::new(Mutex::new(ChainState::default())),
        }
    }

    /// Deployment the chain applies call effects for
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Indexer trailing this chain
    pub fn read_model(&self) -> FakeReadModel {
        FakeReadModel::new(self.state.clone())
    }

    /// Latest mined block
    pub fn block_number(&self) -> u64 {
        self.state.lock().block_number
    }

    /// Set an allowance `owner -> spender`
    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: Amount) {
        self.state
            .lock()
            .allowances
            .insert((token, owner, spender), amount);
    }

    /// Current allowance `owner -> spender`
    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
        self.state
            .lock()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Set a token balance
    pub fn set_balance(&self, token: Address, owner: Address, amount: Amount) {
        self.state.lock().balances.insert((token, owner), amount);
    }

    /// Fail the next call to `function`
    pub fn fail_next<S: Into<String>>(&self, function: S, mode: FailureMode) {
        self.state.lock().failures.insert(function.into(), mode);
    }

    /// Every call broadcast so far, in order
    pub fn submitted(&self) -> Vec<ContractCall> {
        self.state.lock().submitted.clone()
    }

    /// Troves opened on this chain
    pub fn troves(&self) -> Vec<IndexedTrove> {
        let mut troves: Vec<_> = self.state.lock().troves.values().cloned().collect();
        troves.sort_by_key(|trove| trove.updated_at_block);
        troves
    }

    fn tx_hash(&self, nonce: u64) -> String {
        format!("0x{:016x}{:048x}", self.config.hash_prefix, nonce)
    }

    fn branch_of(&self, contract: Address) -> Option<&Branch> {
        self.deployment.branches.iter().find(|branch| {
            branch.borrower_operations == contract || branch.leverage_zapper == contract
        })
    }

    /// Mine a pending transaction, applying its effects when it succeeds
    fn mine(&self, state: &mut ChainState, tx_hash: &str) -> Result<Receipt, Error> {
        let Some(pending) = state.pending.remove(tx_hash) else {
            if !self.config.confirm_unknown_transactions {
                return Err(Error::UnknownTransaction(tx_hash.to_string()));
            }
            tracing::info!("Confirming unknown transaction {}", tx_hash);
            return Ok(Self::record_receipt(
                state,
                tx_hash,
                ReceiptStatus::Success,
                vec![],
            ));
        };

        match pending.failure {
            Some(FailureMode::NeverConfirm) => {
                // Stays pending
                state.pending.insert(tx_hash.to_string(), pending);
                return Err(Error::NeverConfirms(tx_hash.to_string()));
            }
            Some(FailureMode::Revert) => {
                tracing::debug!("Reverting `{}` in {}", pending.call.function, tx_hash);
                return Ok(Self::record_receipt(
                    state,
                    tx_hash,
                    ReceiptStatus::Reverted,
                    vec![],
                ));
            }
            _ => (),
        }

        let block_number = state.block_number + 1;
        let logs = self.apply_effects(state, &pending, block_number)?;
        Ok(Self::record_receipt(
            state,
            tx_hash,
            ReceiptStatus::Success,
            logs,
        ))
    }

    fn record_receipt(
        state: &mut ChainState,
        tx_hash: &str,
        status: ReceiptStatus,
        logs: Vec<Log>,
    ) -> Receipt {
        state.block_number += 1;
        let receipt = Receipt {
            tx_hash: tx_hash.to_string(),
            status,
            block_number: state.block_number,
            logs,
        };
        state.receipts.insert(tx_hash.to_string(), receipt.clone());
        receipt
    }

    fn apply_effects(
        &self,
        state: &mut ChainState,
        pending: &PendingTransaction,
        block_number: u64,
    ) -> Result<Vec<Log>, Error> {
        let PendingTransaction { from, call, .. } = pending;
        let unexpected = || Error::UnexpectedArguments(call.function.clone());

        match call.function.as_str() {
            "approve" => {
                let [CallArg::Address(spender), CallArg::Amount(amount)] = call.args.as_slice()
                else {
                    return Err(unexpected());
                };
                state.allowances.insert((call.to, *from, *spender), *amount);
                Ok(vec![])
            }
            "stake" => {
                let [CallArg::Amount(amount)] = call.args.as_slice() else {
                    return Err(unexpected());
                };
                spend_allowance(state, self.deployment.lqty_token, *from, call.to, *amount);
                Ok(vec![])
            }
            function @ ("openTrove" | "openLeveragedTroveWithRawETH") => {
                let branch = self.branch_of(call.to).ok_or_else(unexpected)?;
                let (owner, index, coll, debt) = match call.args.as_slice() {
                    [CallArg::Address(owner), CallArg::Uint(index), CallArg::Amount(coll), CallArg::Amount(debt), ..]
                        if function == "openTrove" =>
                    {
                        (*owner, *index, *coll, *debt)
                    }
                    [CallArg::Address(owner), CallArg::Uint(index), CallArg::Amount(coll), _, CallArg::Amount(debt), ..] => {
                        (*owner, *index, *coll, *debt)
                    }
                    _ => return Err(unexpected()),
                };

                spend_allowance(state, branch.coll_token, *from, call.to, coll);

                let trove_id = TroveId::derive(&owner, index);
                state.troves.insert(
                    (branch.id, trove_id),
                    IndexedTrove {
                        id: trove_id,
                        branch_id: branch.id,
                        owner,
                        coll,
                        debt,
                        updated_at_block: block_number,
                    },
                );
                tracing::debug!("Opened trove {} on branch {}", trove_id, branch.id);

                Ok(vec![Log {
                    address: branch.trove_manager,
                    event: TROVE_OPERATION_EVENT.to_string(),
                    fields: BTreeMap::from([
                        ("troveId".to_string(), trove_id.to_string()),
                        ("operation".to_string(), "openTrove".to_string()),
                    ]),
                }])
            }
            _ => Ok(vec![]),
        }
    }
}

fn spend_allowance(
    state: &mut ChainState,
    token: Address,
    owner: Address,
    spender: Address,
    amount: Amount,
) {
    let allowance = state
        .allowances
        .entry((token, owner, spender))
        .or_default();
    *allowance = allowance.checked_sub(amount).unwrap_or_default();
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn read(&self, call: ReadCall) -> Result<Amount, loanflow_common::Error> {
        let state = self.state.lock();
        Ok(match call {
            ReadCall::Allowance {
                token,
                owner,
                spender,
            } => state
                .allowances
                .get(&(token, owner, spender))
                .copied()
                .unwrap_or_default(),
            ReadCall::Balance { token, owner } => state
                .balances
                .get(&(token, owner))
                .copied()
                .unwrap_or(self.config.default_balance),
        })
    }

    #[instrument(skip(self, call), fields(function = %call.function))]
    async fn submit(
        &self,
        from: Address,
        call: ContractCall,
    ) -> Result<String, loanflow_common::Error> {
        let mut state = self.state.lock();
        let failure = state.failures.remove(&call.function);

        match failure {
            Some(FailureMode::UserRejected) => {
                return Err(Error::UserRejected(call.function).into());
            }
            Some(FailureMode::SubmissionError) => {
                return Err(Error::SubmissionFailed(call.function).into());
            }
            _ => (),
        }

        state.nonce += 1;
        let tx_hash = self.tx_hash(state.nonce);
        tracing::debug!("Broadcast `{}` as {}", call.function, tx_hash);

        state.submitted.push(call.clone());
        state.pending.insert(
            tx_hash.clone(),
            PendingTransaction {
                from,
                call,
                failure,
            },
        );

        Ok(tx_hash)
    }

    #[instrument(skip(self))]
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Receipt, loanflow_common::Error> {
        let mined = self.state.lock().receipts.get(tx_hash).cloned();
        if let Some(receipt) = mined {
            return Ok(receipt);
        }

        if !self.config.confirmation_delay.is_zero() {
            time::sleep(self.config.confirmation_delay).await;
        }

        let mut state = self.state.lock();
        // Mined by a concurrent waiter
        if let Some(receipt) = state.receipts.get(tx_hash) {
            return Ok(receipt.clone());
        }
        Ok(self.mine(&mut state, tx_hash)?)
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, loanflow_common::Error> {
        Ok(self.state.lock().receipts.get(tx_hash).cloned())
    }
}

/// Deployment with an `ETH` and an `rETH` branch at fixed addresses
pub fn deployment() -> Deployment {
    let branch = |id: u32, symbol: &str| {
        let base = 0x10 * (id as u8 + 1);
        Branch {
            id,
            symbol: symbol.to_string(),
            coll_token: Address::repeat_byte(base),
            borrower_operations: Address::repeat_byte(base + 1),
            trove_manager: Address::repeat_byte(base + 2),
            stability_pool: Address::repeat_byte(base + 3),
            leverage_zapper: Address::repeat_byte(base + 4),
        }
    };

    Deployment {
        bold_token: Address::repeat_byte(0x01),
        lqty_token: Address::repeat_byte(0x02),
        lqty_staking: Address::repeat_byte(0x03),
        collateral_registry: Address::repeat_byte(0x04),
        branches: vec![branch(0, "ETH"), branch(1, "rETH")],
    }
}
