//! Flow State Store
//!
//! Owns the single current [`Flowstate`]. Every mutation is written to the KV store before it is
//! published to subscribers, so the persisted record never lags behind what callers observed.

use loanflow_common::database::{
    DbTransactionFinalizer, DynKVStore, KVStore, KVStoreDatabase, KVStoreTransaction,
};
use loanflow_common::{Address, Error, FlowStep, Flowstate, StepStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::instrument;
use uuid::Uuid;

use crate::flows::FlowRegistry;

/// Primary namespace of the persisted record
pub const FLOW_PRIMARY_NAMESPACE: &str = "loanflow";
/// Secondary namespace of the persisted record
pub const FLOW_SECONDARY_NAMESPACE: &str = "flowstate";
/// Key of the persisted record
pub const FLOW_KEY: &str = "current";
/// Version of the persisted record layout
pub const RECORD_VERSION: u32 = 1;

/// Persisted form of a [`Flowstate`]
///
/// The request is kept untyped so it goes through the declaration's validation on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFlowstate {
    /// Record layout version
    pub version: u32,
    /// Flow instance id
    pub id: Uuid,
    /// Owning account
    pub account: Address,
    /// Request as JSON
    pub request: Value,
    /// Steps, `None` until planned
    pub steps: Option<Vec<FlowStep>>,
    /// Creation time
    pub created_at: u64,
    /// Last update time
    pub updated_at: u64,
}

impl TryFrom<&Flowstate> for PersistedFlowstate {
    type Error = Error;

    fn try_from(flow: &Flowstate) -> Result<Self, Self::Error> {
        Ok(Self {
            version: RECORD_VERSION,
            id: flow.id,
            account: flow.account,
            request: serde_json::to_value(&flow.request)?,
            steps: flow.steps.clone(),
            created_at: flow.created_at,
            updated_at: flow.updated_at,
        })
    }
}

/// Result of [`FlowStore::restore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing persisted
    Empty,
    /// Flow restored
    Restored {
        /// Steps reset from `AwaitingCommit` to `Idle`
        normalized: usize,
    },
    /// Persisted record was invalid and has been removed
    Discarded(String),
}

/// Single source of truth for the current flow
#[derive(Debug)]
pub struct FlowStore {
    localstore: DynKVStore,
    state: watch::Sender<Option<Flowstate>>,
    write_lock: Mutex<()>,
}

impl FlowStore {
    /// Store over a KV backend, empty until [`FlowStore::restore`] is called
    pub fn new(localstore: DynKVStore) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            localstore,
            state,
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the current flow
    pub fn get(&self) -> Option<Flowstate> {
        self.state.borrow().clone()
    }

    /// Watch the current flow
    pub fn subscribe(&self) -> watch::Receiver<Option<Flowstate>> {
        self.state.subscribe()
    }

    /// Replace the current flow wholesale
    #[instrument(skip_all, fields(flow = %flow.id))]
    pub async fn set(&self, flow: Flowstate) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        self.persist(Some(&flow)).await?;
        self.state.send_replace(Some(flow));
        Ok(())
    }

    /// Mutate the current flow if it is still the flow `id`
    ///
    /// Returns the updated flow, or `None` if the flow was replaced or cleared. Nothing is
    /// written when `f` fails.
    pub async fn update<F>(&self, id: Uuid, f: F) -> Result<Option<Flowstate>, Error>
    where
        F: FnOnce(&mut Flowstate) -> Result<(), Error> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let current = self.state.borrow().clone();
        let Some(mut flow) = current.filter(|flow| flow.id == id) else {
            return Ok(None);
        };

        f(&mut flow)?;
        flow.touch();

        self.persist(Some(&flow)).await?;
        self.state.send_replace(Some(flow.clone()));
        Ok(Some(flow))
    }

    /// Remove the current flow
    #[instrument(skip_all)]
    pub async fn clear(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        self.persist(None).await?;
        self.state.send_replace(None);
        Ok(())
    }

    /// Load the persisted flow
    ///
    /// The request is re-validated by its declaration. An undecodable or invalid record is
    /// removed. Steps left in `AwaitingCommit` are reset to `Idle`, while steps in
    /// `AwaitingVerify` keep their artifact so verification can resume.
    #[instrument(skip_all)]
    pub async fn restore(&self, registry: &FlowRegistry) -> Result<RestoreOutcome, Error> {
        let _guard = self.write_lock.lock().await;

        let Some(bytes) = self
            .localstore
            .kv_read(FLOW_PRIMARY_NAMESPACE, FLOW_SECONDARY_NAMESPACE, FLOW_KEY)
            .await?
        else {
            self.state.send_replace(None);
            return Ok(RestoreOutcome::Empty);
        };

        let mut flow = match decode(&bytes, registry) {
            Ok(flow) => flow,
            Err(reason) => {
                tracing::warn!("Discarding persisted flow: {}", reason);
                self.persist(None).await?;
                self.state.send_replace(None);
                return Ok(RestoreOutcome::Discarded(reason));
            }
        };

        let normalized = flow
            .steps
            .iter_mut()
            .flatten()
            .map(FlowStep::reset_stale_commit)
            .filter(|reset| *reset)
            .count();

        if normalized > 0 {
            tracing::warn!(
                "Reset {} step(s) of flow {} left awaiting commit",
                normalized,
                flow.id
            );
            flow.touch();
            self.persist(Some(&flow)).await?;
        }

        tracing::info!(
            "Restored {} flow {} for {}",
            flow.flow_id(),
            flow.id,
            flow.account
        );
        self.state.send_replace(Some(flow));

        Ok(RestoreOutcome::Restored { normalized })
    }

    async fn persist(&self, flow: Option<&Flowstate>) -> Result<(), Error> {
        let mut tx = self.localstore.begin_transaction().await?;
        match flow {
            Some(flow) => {
                let record = PersistedFlowstate::try_from(flow)?;
                let bytes = serde_json::to_vec(&record)?;
                tx.kv_write(
                    FLOW_PRIMARY_NAMESPACE,
                    FLOW_SECONDARY_NAMESPACE,
                    FLOW_KEY,
                    &bytes,
                )
                .await?;
            }
            None => {
                tx.kv_remove(FLOW_PRIMARY_NAMESPACE, FLOW_SECONDARY_NAMESPACE, FLOW_KEY)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

fn decode(bytes: &[u8], registry: &FlowRegistry) -> Result<Flowstate, String> {
    let record: PersistedFlowstate =
        serde_json::from_slice(bytes).map_err(|e| format!("undecodable record: {e}"))?;

    if record.version != RECORD_VERSION {
        return Err(format!("unsupported record version {}", record.version));
    }

    let request = registry
        .parse_request(&record.request)
        .map_err(|e| format!("invalid request: {e}"))?;
    let declaration = registry
        .get(request.flow_id())
        .map_err(|e| e.to_string())?;

    if let Some(steps) = &record.steps {
        if steps.is_empty() {
            return Err("empty step list".to_string());
        }
        for step in steps {
            if !declaration.known_steps().contains(&step.id.as_str()) {
                return Err(format!(
                    "unknown step `{}` for {}",
                    step.id,
                    request.flow_id()
                ));
            }
            if step.status == StepStatus::AwaitingVerify && step.artifact.is_none() {
                return Err(format!("step `{}` awaits verify without artifact", step.id));
            }
        }
    }

    Ok(Flowstate {
        id: record.id,
        account: record.account,
        request,
        steps: record.steps,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use loanflow_common::Amount;
    use serde_json::json;

    use super::*;
    use crate::test_utils::*;

    fn planned_flow(statuses: &[(StepStatus, Option<&str>)]) -> Flowstate {
        let mut flow = Flowstate::new(test_account(), stake_request(Amount::WAD));
        let ids = ["approveToken", "stakeDeposit"];
        flow.steps = Some(
            statuses
                .iter()
                .zip(ids)
                .map(|((status, artifact), id)| FlowStep {
                    id: id.to_string(),
                    status: *status,
                    artifact: artifact.map(str::to_string),
                    error: None,
                    output: None,
                })
                .collect(),
        );
        flow
    }

    async fn write_raw(localstore: &DynKVStore, bytes: &[u8]) {
        let mut tx = localstore.begin_transaction().await.unwrap();
        tx.kv_write(
            FLOW_PRIMARY_NAMESPACE,
            FLOW_SECONDARY_NAMESPACE,
            FLOW_KEY,
            bytes,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    async fn read_raw(localstore: &DynKVStore) -> Option<Vec<u8>> {
        localstore
            .kv_read(FLOW_PRIMARY_NAMESPACE, FLOW_SECONDARY_NAMESPACE, FLOW_KEY)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_writes_through() {
        let localstore = test_store();
        let store = FlowStore::new(localstore.clone());
        let flow = planned_flow(&[(StepStatus::Idle, None), (StepStatus::Idle, None)]);
        store.set(flow.clone()).await.unwrap();

        let reopened = FlowStore::new(localstore);
        let outcome = reopened.restore(&FlowRegistry::builtin()).await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Restored { normalized: 0 });
        assert_eq!(reopened.get(), Some(flow));
    }

    #[tokio::test]
    async fn test_restore_normalizes_awaiting_commit() {
        let localstore = test_store();
        let store = FlowStore::new(localstore.clone());
        store
            .set(planned_flow(&[
                (StepStatus::Confirmed, Some("0x111")),
                (StepStatus::AwaitingCommit, None),
            ]))
            .await
            .unwrap();

        let reopened = FlowStore::new(localstore.clone());
        let outcome = reopened.restore(&FlowRegistry::builtin()).await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Restored { normalized: 1 });

        let steps = reopened.get().unwrap().steps.unwrap();
        assert_eq!(steps[0].status, StepStatus::Confirmed);
        assert_eq!(steps[1].status, StepStatus::Idle);

        // The normalized record was written back
        let record: PersistedFlowstate =
            serde_json::from_slice(&read_raw(&localstore).await.unwrap()).unwrap();
        assert_eq!(record.steps.unwrap()[1].status, StepStatus::Idle);
    }

    #[tokio::test]
    async fn test_restore_keeps_awaiting_verify() {
        let localstore = test_store();
        FlowStore::new(localstore.clone())
            .set(planned_flow(&[
                (StepStatus::AwaitingVerify, Some("0x111")),
                (StepStatus::Idle, None),
            ]))
            .await
            .unwrap();

        let reopened = FlowStore::new(localstore);
        reopened.restore(&FlowRegistry::builtin()).await.unwrap();
        let step = reopened.get().unwrap().steps.unwrap().remove(0);
        assert_eq!(step.status, StepStatus::AwaitingVerify);
        assert_eq!(step.artifact.as_deref(), Some("0x111"));
    }

    #[tokio::test]
    async fn test_restore_discards_corrupt_record() {
        let localstore = test_store();
        write_raw(&localstore, b"{not json").await;

        let store = FlowStore::new(localstore.clone());
        let outcome = store.restore(&FlowRegistry::builtin()).await.unwrap();
        assert!(matches!(outcome, RestoreOutcome::Discarded(_)));
        assert!(store.get().is_none());
        assert!(read_raw(&localstore).await.is_none());
    }

    #[tokio::test]
    async fn test_restore_discards_invalid_request() {
        let localstore = test_store();
        let flow = planned_flow(&[(StepStatus::Idle, None), (StepStatus::Idle, None)]);
        let mut record = PersistedFlowstate::try_from(&flow).unwrap();
        record.request = json!({
            "flowId": "stakeDeposit",
            "amount": "0",
            "successLink": { "path": "/", "label": "Dashboard" },
            "successMessage": "Done"
        });
        write_raw(&localstore, &serde_json::to_vec(&record).unwrap()).await;

        let store = FlowStore::new(localstore.clone());
        let outcome = store.restore(&FlowRegistry::builtin()).await.unwrap();
        assert!(matches!(outcome, RestoreOutcome::Discarded(_)));
        assert!(read_raw(&localstore).await.is_none());
    }

    #[tokio::test]
    async fn test_restore_discards_unknown_step_and_version() {
        let flow = planned_flow(&[(StepStatus::Idle, None), (StepStatus::Idle, None)]);

        let mut unknown_step = PersistedFlowstate::try_from(&flow).unwrap();
        if let Some(steps) = unknown_step.steps.as_mut() {
            steps[1].id = "openTrove".to_string();
        }
        let mut newer = PersistedFlowstate::try_from(&flow).unwrap();
        newer.version = RECORD_VERSION + 1;

        for record in [unknown_step, newer] {
            let localstore = test_store();
            write_raw(&localstore, &serde_json::to_vec(&record).unwrap()).await;
            let store = FlowStore::new(localstore);
            let outcome = store.restore(&FlowRegistry::builtin()).await.unwrap();
            assert!(matches!(outcome, RestoreOutcome::Discarded(_)));
        }
    }

    #[tokio::test]
    async fn test_large_amounts_survive_storage() {
        let localstore = test_store();
        let amount = Amount::new(u128::MAX - 1);
        let flow = Flowstate::new(test_account(), unstake_request(amount));
        FlowStore::new(localstore.clone())
            .set(flow.clone())
            .await
            .unwrap();

        let reopened = FlowStore::new(localstore);
        reopened.restore(&FlowRegistry::builtin()).await.unwrap();
        assert_eq!(reopened.get().unwrap().request, flow.request);
    }

    #[tokio::test]
    async fn test_update_ignores_replaced_flow() {
        let store = FlowStore::new(test_store());
        let first = Flowstate::new(test_account(), stake_request(Amount::WAD));
        let second = Flowstate::new(test_account(), stake_request(Amount::ONE));
        store.set(first.clone()).await.unwrap();
        store.set(second.clone()).await.unwrap();

        let updated = store
            .update(first.id, |flow| {
                flow.steps = Some(vec![FlowStep::new("stakeDeposit")]);
                Ok(())
            })
            .await
            .unwrap();
        assert!(updated.is_none());
        assert_eq!(store.get().unwrap().steps, None);
        assert_eq!(store.get().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let store = FlowStore::new(test_store());
        let flow = Flowstate::new(test_account(), stake_request(Amount::WAD));
        store.set(flow.clone()).await.unwrap();

        let result = store
            .update(flow.id, |flow| {
                flow.steps = Some(vec![]);
                Err(Error::Custom("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(), Some(flow));
    }

    #[tokio::test]
    async fn test_clear_removes_record() {
        let localstore = test_store();
        let store = FlowStore::new(localstore.clone());
        let mut rx = store.subscribe();
        store
            .set(Flowstate::new(test_account(), stake_request(Amount::WAD)))
            .await
            .unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.clear().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow().is_none());
        assert!(read_raw(&localstore).await.is_none());
    }
}
