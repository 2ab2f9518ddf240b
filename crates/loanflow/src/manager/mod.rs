//! Flow Manager
//!
//! The façade the rest of a client talks to. It keeps the connected account, hides flows owned
//! by other accounts, and forwards commits to the [`StepOrchestrator`].

use std::sync::Arc;

use loanflow_common::parking_lot::RwLock;
use loanflow_common::{Address, FlowRequest, FlowStep, Flowstate};
use serde_json::Value;
use tokio::sync::watch;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Error;
use crate::flows::{FlowDeclaration, FlowRegistry};
use crate::orchestrator::{CommitOutcome, CommitRejection, StepOrchestrator};
use crate::store::{FlowStore, RestoreOutcome};

mod builder;
mod subscription;

pub use builder::FlowManagerBuilder;
pub use subscription::FlowSubscription;

/// A flow is only visible to the account that started it
pub(crate) fn visible(flow: Option<Flowstate>, account: Option<Address>) -> Option<Flowstate> {
    flow.filter(|flow| Some(flow.account) == account)
}

/// Flow Manager
#[derive(Debug, Clone)]
pub struct FlowManager {
    pub(crate) store: Arc<FlowStore>,
    pub(crate) orchestrator: Arc<StepOrchestrator>,
    pub(crate) registry: Arc<FlowRegistry>,
    pub(crate) account: Arc<watch::Sender<Option<Address>>>,
    pub(crate) planning_error: Arc<RwLock<Option<(Uuid, String)>>>,
}

impl FlowManager {
    /// Connected account
    pub fn account(&self) -> Option<Address> {
        *self.account.borrow()
    }

    /// Change the connected account
    ///
    /// A persisted flow of the new account becomes visible again and is planned if needed.
    #[instrument(skip(self))]
    pub async fn set_account(&self, account: Option<Address>) {
        let previous = self.account.send_replace(account);
        if previous == account {
            return;
        }
        tracing::info!("Account changed");

        if self.flow().is_some_and(|flow| flow.steps.is_none()) {
            // Failures are kept in `planning_error`
            let _ = self.plan().await;
        }
    }

    /// Start a flow, replacing the current one
    ///
    /// The request is validated again by its declaration. Steps are planned right away; a
    /// planning failure does not fail the start, see [`FlowManager::planning_error`].
    #[instrument(skip_all, fields(flow_id = %request.flow_id()))]
    pub async fn start(&self, request: FlowRequest) -> Result<Flowstate, Error> {
        let account = self.account().ok_or(Error::NoAccount)?;
        let declaration = self.registry.get(request.flow_id())?;
        let request = declaration.parse_request(&serde_json::to_value(&request)?)?;
        self.start_validated(account, request).await
    }

    /// Start a flow from an untyped request
    #[instrument(skip_all)]
    pub async fn start_raw(&self, raw: Value) -> Result<Flowstate, Error> {
        let account = self.account().ok_or(Error::NoAccount)?;
        let request = self.registry.parse_request(&raw)?;
        self.start_validated(account, request).await
    }

    async fn start_validated(
        &self,
        account: Address,
        request: FlowRequest,
    ) -> Result<Flowstate, Error> {
        let flow = Flowstate::new(account, request);
        self.store.set(flow.clone()).await?;
        *self.planning_error.write() = None;
        tracing::info!("Started {} flow {}", flow.flow_id(), flow.id);

        let _ = self.plan().await;

        Ok(self
            .store
            .get()
            .filter(|current| current.id == flow.id)
            .unwrap_or(flow))
    }

    /// Plan the steps of the visible flow if they are missing
    ///
    /// Returns the flow after planning, `None` if no flow is visible.
    pub async fn plan(&self) -> Result<Option<Flowstate>, Error> {
        let Some(flow) = self.flow() else {
            return Ok(None);
        };

        match self.orchestrator.plan(flow.id).await {
            Ok(planned) => {
                let mut planning_error = self.planning_error.write();
                if planning_error.as_ref().is_some_and(|(id, _)| *id == flow.id) {
                    *planning_error = None;
                }
                Ok(planned)
            }
            Err(err) => {
                tracing::warn!("Could not plan flow {}: {}", flow.id, err);
                *self.planning_error.write() = Some((flow.id, err.to_string()));
                Err(err)
            }
        }
    }

    /// Drop the current flow, whoever owns it
    #[instrument(skip_all)]
    pub async fn discard(&self) -> Result<(), Error> {
        self.store.clear().await?;
        *self.planning_error.write() = None;
        tracing::info!("Flow discarded");
        Ok(())
    }

    /// Commit the current step of the visible flow
    ///
    /// Never fails: the outcome and the step itself record what happened.
    #[instrument(skip_all)]
    pub async fn commit(&self) -> CommitOutcome {
        match self.flow() {
            Some(flow) => self.orchestrator.commit_step(flow.id).await,
            None => CommitOutcome::Rejected(CommitRejection::NoActiveFlow),
        }
    }

    /// Load the persisted flow and plan it if needed
    #[instrument(skip_all)]
    pub async fn restore(&self) -> Result<RestoreOutcome, Error> {
        let outcome = self.store.restore(&self.registry).await?;
        if self.flow().is_some_and(|flow| flow.steps.is_none()) {
            let _ = self.plan().await;
        }
        Ok(outcome)
    }

    /// Flow visible to the connected account
    pub fn flow(&self) -> Option<Flowstate> {
        visible(self.store.get(), self.account())
    }

    /// First step not yet confirmed
    pub fn current_step(&self) -> Option<FlowStep> {
        self.flow()?.current_step().cloned()
    }

    /// Index of the first step not yet confirmed, the step count once complete
    pub fn current_step_index(&self) -> Option<usize> {
        self.flow()?.current_step_index()
    }

    /// Declaration of the visible flow
    pub fn declaration(&self) -> Option<Arc<dyn FlowDeclaration>> {
        self.registry.get(self.flow()?.flow_id()).ok()
    }

    /// Human readable name of a step of the visible flow
    pub fn step_name(&self, index: usize) -> Option<String> {
        let flow = self.flow()?;
        let step_id = flow.steps.as_ref()?.get(index)?.id.clone();
        let declaration = self.registry.get(flow.flow_id()).ok()?;
        declaration.step_name(&self.orchestrator.context(&flow), &step_id)
    }

    /// Last planning failure of the visible flow
    pub fn planning_error(&self) -> Option<String> {
        let flow = self.flow()?;
        self.planning_error
            .read()
            .as_ref()
            .filter(|(id, _)| *id == flow.id)
            .map(|(_, message)| message.clone())
    }

    /// Registry of flow declarations
    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    /// Subscribe to the visible flow
    pub fn subscribe(&self) -> FlowSubscription {
        FlowSubscription::new(self.store.subscribe(), self.account.subscribe())
    }
}
