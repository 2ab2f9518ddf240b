use std::sync::Arc;

use loanflow_common::database::DynKVStore;
use loanflow_common::parking_lot::RwLock;
use loanflow_common::{Address, ChainClient, Deployment, ReadModel};
use tokio::sync::watch;

use crate::error::Error;
use crate::flows::FlowRegistry;
use crate::manager::FlowManager;
use crate::orchestrator::{PostFlowCheckSettings, StepOrchestrator};
use crate::store::FlowStore;

/// Builder for creating a new [`FlowManager`]
#[derive(Debug, Default)]
pub struct FlowManagerBuilder {
    localstore: Option<DynKVStore>,
    chain: Option<Arc<dyn ChainClient>>,
    read_model: Option<Arc<dyn ReadModel>>,
    deployment: Option<Deployment>,
    registry: Option<FlowRegistry>,
    post_flow_check: PostFlowCheckSettings,
    account: Option<Address>,
}

impl FlowManagerBuilder {
    /// Create a new FlowManagerBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage backend
    pub fn localstore(mut self, localstore: DynKVStore) -> Self {
        self.localstore = Some(localstore);
        self
    }

    /// Set the chain client
    pub fn chain(mut self, chain: Arc<dyn ChainClient>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set the read model
    pub fn read_model(mut self, read_model: Arc<dyn ReadModel>) -> Self {
        self.read_model = Some(read_model);
        self
    }

    /// Set the protocol deployment
    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = Some(deployment);
        self
    }

    /// Use a custom registry instead of [`FlowRegistry::builtin`]
    pub fn registry(mut self, registry: FlowRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set post flow check polling
    pub fn post_flow_check(mut self, settings: PostFlowCheckSettings) -> Self {
        self.post_flow_check = settings;
        self
    }

    /// Connected account at start
    pub fn account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    /// Build the flow manager
    ///
    /// The manager starts empty. Call [`FlowManager::restore`] to load a persisted flow.
    pub fn build(self) -> Result<FlowManager, Error> {
        let localstore = self
            .localstore
            .ok_or(Error::Custom("Localstore required".to_string()))?;
        let chain = self
            .chain
            .ok_or(Error::Custom("Chain client required".to_string()))?;
        let read_model = self
            .read_model
            .ok_or(Error::Custom("Read model required".to_string()))?;
        let deployment = self
            .deployment
            .ok_or(Error::Custom("Deployment required".to_string()))?;

        let registry = Arc::new(self.registry.unwrap_or_else(FlowRegistry::builtin));
        let store = Arc::new(FlowStore::new(localstore));
        let orchestrator = Arc::new(StepOrchestrator::new(
            store.clone(),
            registry.clone(),
            Arc::new(deployment),
            chain,
            read_model,
            self.post_flow_check,
        ));
        let (account, _) = watch::channel(self.account);

        Ok(FlowManager {
            store,
            orchestrator,
            registry,
            account: Arc::new(account),
            planning_error: Arc::new(RwLock::new(None)),
        })
    }
}
