#![cfg(test)]
#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loanflow_common::database::{DynKVStore, MemoryDatabase};
use loanflow_common::flow::validation::MIN_DEBT;
use loanflow_common::flow::*;
use loanflow_common::parking_lot::Mutex;
use loanflow_common::{
    Address, Amount, Branch, CallArg, ChainClient, ContractCall, Deployment, Error, FlowRequest,
    IndexedTrove, Log, ReadCall, ReadModel, Receipt, ReceiptStatus, TroveId,
};
use tokio::sync::Notify;

use crate::flows::FlowContext;
use crate::manager::{FlowManager, FlowManagerBuilder};
use crate::orchestrator::PostFlowCheckSettings;

/// Account every test flow belongs to
pub fn test_account() -> Address {
    Address::repeat_byte(0xaa)
}

/// Second account for visibility tests
pub fn other_account() -> Address {
    Address::repeat_byte(0xbb)
}

/// Deployment with a single branch `0`
pub fn test_deployment() -> Deployment {
    Deployment {
        bold_token: Address::repeat_byte(0x01),
        lqty_token: Address::repeat_byte(0x02),
        lqty_staking: Address::repeat_byte(0x03),
        collateral_registry: Address::repeat_byte(0x04),
        branches: vec![Branch {
            id: 0,
            symbol: "ETH".to_string(),
            coll_token: Address::repeat_byte(0x10),
            borrower_operations: Address::repeat_byte(0x11),
            trove_manager: Address::repeat_byte(0x12),
            stability_pool: Address::repeat_byte(0x13),
            leverage_zapper: Address::repeat_byte(0x14),
        }],
    }
}

pub fn test_meta() -> RequestMeta {
    RequestMeta::new("/", "Go to dashboard", "Done")
}

pub fn open_borrow_request(coll_amount: Amount) -> FlowRequest {
    FlowRequest::OpenBorrowPosition(OpenBorrowPositionRequest {
        meta: test_meta(),
        branch_id: 0,
        owner_index: 0,
        coll_amount,
        bold_amount: MIN_DEBT,
        annual_interest_rate: Amount::new(50_000_000_000_000_000),
        max_upfront_fee: Amount::WAD,
        upper_hint: TroveId::default(),
        lower_hint: TroveId::default(),
    })
}

pub fn update_borrow_request(is_coll_increase: bool) -> FlowRequest {
    FlowRequest::UpdateBorrowPosition(UpdateBorrowPositionRequest {
        meta: test_meta(),
        branch_id: 0,
        trove_id: TroveId::derive(&test_account(), 0),
        coll_change: Amount::WAD,
        is_coll_increase,
        debt_change: Amount::ZERO,
        is_debt_increase: false,
        max_upfront_fee: Amount::WAD,
    })
}

pub fn open_leverage_request() -> FlowRequest {
    FlowRequest::OpenLeveragePosition(OpenLeveragePositionRequest {
        meta: test_meta(),
        branch_id: 0,
        owner_index: 1,
        coll_amount: Amount::WAD,
        flash_loan_amount: Amount::WAD,
        bold_amount: MIN_DEBT,
        annual_interest_rate: Amount::new(50_000_000_000_000_000),
        max_upfront_fee: Amount::WAD,
    })
}

pub fn earn_claim_request() -> FlowRequest {
    FlowRequest::EarnClaimRewards(BranchRequest {
        meta: test_meta(),
        branch_id: 0,
    })
}

pub fn stake_request(amount: Amount) -> FlowRequest {
    FlowRequest::StakeDeposit(StakeDepositRequest {
        meta: test_meta(),
        amount,
    })
}

pub fn unstake_request(amount: Amount) -> FlowRequest {
    FlowRequest::StakeWithdraw(StakeWithdrawRequest {
        meta: test_meta(),
        amount,
    })
}

/// Context over a mock chain with a read model that is always caught up
pub fn context(chain: &MockChain, request: FlowRequest) -> FlowContext {
    FlowContext {
        account: test_account(),
        request,
        deployment: Arc::new(test_deployment()),
        chain: Arc::new(chain.clone()),
        read_model: Arc::new(MockReadModel::caught_up()),
    }
}

pub fn fast_post_flow_check() -> PostFlowCheckSettings {
    PostFlowCheckSettings {
        poll_interval: Duration::from_millis(1),
        max_attempts: 3,
    }
}

pub fn test_store() -> DynKVStore {
    Arc::new(MemoryDatabase::new())
}

/// Manager over an in memory store, connected as [`test_account`]
pub async fn test_manager(
    localstore: DynKVStore,
    chain: &MockChain,
    read_model: &MockReadModel,
) -> FlowManager {
    FlowManagerBuilder::new()
        .localstore(localstore)
        .chain(Arc::new(chain.clone()))
        .read_model(Arc::new(read_model.clone()))
        .deployment(test_deployment())
        .post_flow_check(fast_post_flow_check())
        .account(test_account())
        .build()
        .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptFailure {
    Revert,
    Timeout,
}

#[derive(Debug, Default)]
struct MockChainState {
    allowances: HashMap<(Address, Address, Address), Amount>,
    balances: HashMap<(Address, Address), Amount>,
    submitted: Vec<ContractCall>,
    pending: HashMap<String, (Address, ContractCall)>,
    receipts: HashMap<String, Receipt>,
    tx_count: u64,
    block_number: u64,
    reject_next_submit: bool,
    next_receipt_failure: Option<ReceiptFailure>,
    receipt_waits: usize,
}

/// Mock chain client
///
/// Submitted calls stay pending until `wait_for_receipt` mines them. Mined approvals update the
/// allowance.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockChainState>>,
    hold_submits: Arc<AtomicBool>,
    submit_entered: Arc<Notify>,
    submit_release: Arc<Notify>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the allowance of [`test_account`]
    pub fn set_allowance(&self, token: Address, spender: Address, amount: Amount) {
        self.state
            .lock()
            .allowances
            .insert((token, test_account(), spender), amount);
    }

    /// Set the balance of [`test_account`], every other balance is unlimited
    pub fn set_balance(&self, token: Address, amount: Amount) {
        self.state
            .lock()
            .balances
            .insert((token, test_account()), amount);
    }

    pub fn submitted(&self) -> Vec<ContractCall> {
        self.state.lock().submitted.clone()
    }

    pub fn receipt_waits(&self) -> usize {
        self.state.lock().receipt_waits
    }

    pub fn block_number(&self) -> u64 {
        self.state.lock().block_number
    }

    pub fn reject_next_submit(&self) {
        self.state.lock().reject_next_submit = true;
    }

    pub fn fail_next_receipt(&self, failure: ReceiptFailure) {
        self.state.lock().next_receipt_failure = Some(failure);
    }

    /// Park every following `submit` until [`MockChain::release_submit`]
    pub fn hold_submits(&self) {
        self.hold_submits.store(true, Ordering::SeqCst);
    }

    /// Wait until a `submit` is parked
    pub async fn submit_entered(&self) {
        self.submit_entered.notified().await;
    }

    pub fn release_submit(&self) {
        self.hold_submits.store(false, Ordering::SeqCst);
        self.submit_release.notify_one();
    }

    /// Mine a transaction with a single log
    pub fn mine_with_log(&self, tx_hash: &str, event: &str, field: &str, value: &str) {
        let mut state = self.state.lock();
        state.block_number += 1;
        let to = state
            .pending
            .remove(tx_hash)
            .map(|(_, call)| call.to)
            .unwrap_or(Address::ZERO);
        let receipt = Receipt {
            tx_hash: tx_hash.to_string(),
            status: ReceiptStatus::Success,
            block_number: state.block_number,
            logs: vec![Log {
                address: to,
                event: event.to_string(),
                fields: BTreeMap::from([(field.to_string(), value.to_string())]),
            }],
        };
        state.receipts.insert(tx_hash.to_string(), receipt);
    }
}

impl MockChainState {
    fn mine(&mut self, tx_hash: &str, status: ReceiptStatus) -> Option<Receipt> {
        let (from, call) = self.pending.remove(tx_hash)?;
        self.block_number += 1;

        if status == ReceiptStatus::Success && call.function == "approve" {
            if let [CallArg::Address(spender), CallArg::Amount(amount)] = call.args.as_slice() {
                self.allowances.insert((call.to, from, *spender), *amount);
            }
        }

        let receipt = Receipt {
            tx_hash: tx_hash.to_string(),
            status,
            block_number: self.block_number,
            logs: vec![],
        };
        self.receipts.insert(tx_hash.to_string(), receipt.clone());
        Some(receipt)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn read(&self, call: ReadCall) -> Result<Amount, Error> {
        let state = self.state.lock();
        match call {
            ReadCall::Allowance {
                token,
                owner,
                spender,
            } => Ok(state
                .allowances
                .get(&(token, owner, spender))
                .copied()
                .unwrap_or_default()),
            ReadCall::Balance { token, owner } => Ok(state
                .balances
                .get(&(token, owner))
                .copied()
                .unwrap_or(Amount::MAX)),
        }
    }

    async fn submit(&self, from: Address, call: ContractCall) -> Result<String, Error> {
        if self.hold_submits.load(Ordering::SeqCst) {
            self.submit_entered.notify_one();
            self.submit_release.notified().await;
        }

        let mut state = self.state.lock();
        if std::mem::take(&mut state.reject_next_submit) {
            return Err(Error::UserRejected);
        }

        state.tx_count += 1;
        let tx_hash = format!("0x{:064x}", state.tx_count);
        state.submitted.push(call.clone());
        state.pending.insert(tx_hash.clone(), (from, call));
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Receipt, Error> {
        let mut state = self.state.lock();
        state.receipt_waits += 1;

        if let Some(receipt) = state.receipts.get(tx_hash) {
            return Ok(receipt.clone());
        }

        let status = match state.next_receipt_failure.take() {
            Some(ReceiptFailure::Timeout) => return Err(Error::Timeout(tx_hash.to_string())),
            Some(ReceiptFailure::Revert) => ReceiptStatus::Reverted,
            None => ReceiptStatus::Success,
        };

        state
            .mine(tx_hash, status)
            .ok_or_else(|| Error::Chain(format!("Unknown transaction {tx_hash}")))
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, Error> {
        Ok(self.state.lock().receipts.get(tx_hash).cloned())
    }
}

#[derive(Debug, Default)]
struct MockReadModelState {
    indexed_block: u64,
    troves: HashMap<(u32, TroveId), IndexedTrove>,
}

/// Mock indexer
#[derive(Debug, Clone, Default)]
pub struct MockReadModel {
    state: Arc<Mutex<MockReadModelState>>,
}

impl MockReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read model that claims to have indexed every block
    pub fn caught_up() -> Self {
        let read_model = Self::new();
        read_model.set_indexed_block(u64::MAX);
        read_model
    }

    pub fn set_indexed_block(&self, block: u64) {
        self.state.lock().indexed_block = block;
    }

    pub fn add_trove(&self, branch_id: u32, trove: IndexedTrove) {
        self.state
            .lock()
            .troves
            .insert((branch_id, trove.id), trove);
    }
}

#[async_trait]
impl ReadModel for MockReadModel {
    async fn indexed_block(&self) -> Result<u64, Error> {
        Ok(self.state.lock().indexed_block)
    }

    async fn trove(
        &self,
        branch_id: u32,
        trove_id: &TroveId,
    ) -> Result<Option<IndexedTrove>, Error> {
        Ok(self
            .state
            .lock()
            .troves
            .get(&(branch_id, *trove_id))
            .cloned())
    }
}
