//! Setup shared by the end to end tests
//!
//! Every test drives a [`FlowManager`] over a [`FakeChain`] and its trailing indexer, with an
//! in-memory store unless it needs a file.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use loanflow::loanflow_database::{
    DbTransactionFinalizer, DynKVStore, KVStore, KVStoreDatabase, KVStoreTransaction,
    MemoryDatabase,
};
use loanflow::store::{
    PersistedFlowstate, FLOW_KEY, FLOW_PRIMARY_NAMESPACE, FLOW_SECONDARY_NAMESPACE,
    RECORD_VERSION,
};
use loanflow::{
    util, Address, Amount, FlowManager, FlowManagerBuilder, FlowStep, PostFlowCheckSettings,
    StepStatus,
};
use loanflow_fake_chain::{deployment, FakeChain, FakeChainConfig, FakeReadModel};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub fn setup_tracing() {
    let env_filter = EnvFilter::new("debug,redb=warn");

    // Ok if successful, Err if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

pub fn alice() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn bob() -> Address {
    Address::repeat_byte(0xbb)
}

/// Chain, indexer and store a test runs against
#[derive(Debug, Clone)]
pub struct TestEnv {
    pub chain: FakeChain,
    pub read_model: FakeReadModel,
    pub localstore: DynKVStore,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(FakeChainConfig::default())
    }

    pub fn with_config(config: FakeChainConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryDatabase::new()))
    }

    pub fn with_store(config: FakeChainConfig, localstore: DynKVStore) -> Self {
        let chain = FakeChain::new(deployment(), config);
        let read_model = chain.read_model();
        Self {
            chain,
            read_model,
            localstore,
        }
    }

    /// Manager connected as `account`, restored from the store
    pub async fn manager(&self, account: Address) -> Result<FlowManager> {
        let manager = self.build_manager(account)?;
        manager.restore().await?;
        Ok(manager)
    }

    /// Manager connected as `account`, not restored yet
    pub fn build_manager(&self, account: Address) -> Result<FlowManager> {
        Ok(FlowManagerBuilder::new()
            .localstore(self.localstore.clone())
            .chain(Arc::new(self.chain.clone()))
            .read_model(Arc::new(self.read_model.clone()))
            .deployment(deployment())
            .post_flow_check(PostFlowCheckSettings {
                poll_interval: Duration::from_millis(1),
                max_attempts: 20,
            })
            .account(account)
            .build()?)
    }

    /// Write a raw record as if an earlier process had persisted it
    pub async fn persist_record(&self, record: &PersistedFlowstate) -> Result<()> {
        self.write_raw(&serde_json::to_vec(record)?).await
    }

    pub async fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut tx = self.localstore.begin_transaction().await?;
        tx.kv_write(
            FLOW_PRIMARY_NAMESPACE,
            FLOW_SECONDARY_NAMESPACE,
            FLOW_KEY,
            bytes,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn read_record(&self) -> Result<Option<PersistedFlowstate>> {
        let bytes = self
            .localstore
            .kv_read(FLOW_PRIMARY_NAMESPACE, FLOW_SECONDARY_NAMESPACE, FLOW_KEY)
            .await?;
        Ok(bytes
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()?)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Record an earlier process could have written
pub fn record(account: Address, request: Value, steps: Vec<FlowStep>) -> PersistedFlowstate {
    let now = util::unix_time();
    PersistedFlowstate {
        version: RECORD_VERSION,
        id: Uuid::new_v4(),
        account,
        request,
        steps: Some(steps),
        created_at: now,
        updated_at: now,
    }
}

pub fn step(id: &str, status: StepStatus, artifact: Option<&str>) -> FlowStep {
    FlowStep {
        status,
        artifact: artifact.map(str::to_string),
        ..FlowStep::new(id)
    }
}

fn meta(path: &str, message: &str) -> Value {
    json!({
        "successLink": { "path": path, "label": "Done" },
        "successMessage": message,
    })
}

fn with_meta(mut request: Value, path: &str, message: &str) -> Value {
    if let (Some(request), Value::Object(meta)) = (request.as_object_mut(), meta(path, message)) {
        request.extend(meta);
    }
    request
}

pub fn stake_deposit(amount: Amount) -> Value {
    with_meta(
        json!({ "flowId": "stakeDeposit", "amount": amount }),
        "/stake",
        "Staked",
    )
}

pub fn stake_withdraw(amount: Amount) -> Value {
    with_meta(
        json!({ "flowId": "stakeWithdraw", "amount": amount }),
        "/stake",
        "Unstaked",
    )
}

pub fn open_borrow(branch_id: u32, owner_index: u64) -> Value {
    with_meta(
        json!({
            "flowId": "openBorrowPosition",
            "branchId": branch_id,
            "ownerIndex": owner_index,
            "collAmount": Amount::WAD,
            "boldAmount": Amount::new(2_000 * Amount::WAD.value()),
            "annualInterestRate": Amount::new(50_000_000_000_000_000),
            "maxUpfrontFee": Amount::WAD,
        }),
        "/borrow",
        "Loan opened",
    )
}
