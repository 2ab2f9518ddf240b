//! Step Orchestrator
//!
//! Drives the current step of the current flow through
//! `Idle/Error -> AwaitingCommit -> AwaitingVerify -> Confirmed | Error`, one step per call.
//! Advancing to the next step is always a new call.

use std::sync::Arc;
use std::time::Duration;

use loanflow_common::{
    ChainClient, Deployment, Error, FlowId, FlowStep, Flowstate, ReadModel, StepStatus,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::flows::{FlowContext, FlowRegistry};
use crate::store::FlowStore;

/// Polling of the read model once a flow completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFlowCheckSettings {
    /// Delay between two checks
    #[serde(with = "loanflow_common::util::duration_millis")]
    pub poll_interval: Duration,
    /// Checks before giving up
    pub max_attempts: u32,
}

impl Default for PostFlowCheckSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

/// Why a commit did not run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitRejection {
    /// No flow for the connected account
    #[error("No active flow")]
    NoActiveFlow,
    /// Steps are not planned yet
    #[error("Steps are not derived yet")]
    StepsNotDerived,
    /// Another commit or verify is running
    #[error("A step is already in flight")]
    StepInFlight,
    /// The flow was replaced or discarded while committing
    #[error("Flow was replaced")]
    FlowReplaced,
    /// No declaration for the flow
    #[error("No declaration for flow `{0}`")]
    UnknownFlow(FlowId),
    /// Step progress could not be recorded
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result of one commit call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The step was committed and verified
    Confirmed {
        /// Index of the confirmed step
        step_index: usize,
        /// Id of the confirmed step
        step_id: String,
        /// Transaction hash
        artifact: String,
        /// Identifier parsed from the receipt
        output: Option<String>,
        /// Every step is confirmed
        flow_complete: bool,
        /// Outcome of the post flow check, `None` unless the flow completed
        indexed: Option<bool>,
    },
    /// Commit or verify failed, the step stays current
    Failed {
        /// Index of the failed step
        step_index: usize,
        /// Id of the failed step
        step_id: String,
        /// Error message
        error: String,
        /// Transaction hash if the step was broadcast
        artifact: Option<String>,
    },
    /// Every step is already confirmed, nothing was done
    Complete,
    /// Nothing was done
    Rejected(CommitRejection),
}

impl CommitOutcome {
    /// The call confirmed a step
    pub fn is_confirmed(&self) -> bool {
        matches!(self, CommitOutcome::Confirmed { .. })
    }
}

/// Step Orchestrator
#[derive(Debug)]
pub struct StepOrchestrator {
    store: Arc<FlowStore>,
    registry: Arc<FlowRegistry>,
    deployment: Arc<Deployment>,
    chain: Arc<dyn ChainClient>,
    read_model: Arc<dyn ReadModel>,
    settings: PostFlowCheckSettings,
    in_flight: Mutex<()>,
    planning: Mutex<()>,
}

impl StepOrchestrator {
    /// Create orchestrator
    pub fn new(
        store: Arc<FlowStore>,
        registry: Arc<FlowRegistry>,
        deployment: Arc<Deployment>,
        chain: Arc<dyn ChainClient>,
        read_model: Arc<dyn ReadModel>,
        settings: PostFlowCheckSettings,
    ) -> Self {
        Self {
            store,
            registry,
            deployment,
            chain,
            read_model,
            settings,
            in_flight: Mutex::new(()),
            planning: Mutex::new(()),
        }
    }

    /// Context a declaration plans and executes a flow with
    pub fn context(&self, flow: &Flowstate) -> FlowContext {
        FlowContext {
            account: flow.account,
            request: flow.request.clone(),
            deployment: self.deployment.clone(),
            chain: self.chain.clone(),
            read_model: self.read_model.clone(),
        }
    }

    /// Derive the steps of flow `flow_id` unless they are already derived
    ///
    /// Returns `None` if the flow is no longer current.
    #[instrument(skip(self))]
    pub async fn plan(&self, flow_id: Uuid) -> Result<Option<Flowstate>, Error> {
        let _planning = self.planning.lock().await;

        let Some(flow) = self.store.get().filter(|flow| flow.id == flow_id) else {
            return Ok(None);
        };
        if flow.steps.is_some() {
            return Ok(Some(flow));
        }

        let declaration = self.registry.get(flow.flow_id())?;
        let step_ids = declaration.get_steps(&self.context(&flow)).await?;
        if step_ids.is_empty() {
            return Err(Error::Custom(format!(
                "Flow {} planned no steps",
                flow.flow_id()
            )));
        }

        tracing::debug!("Planned steps {:?} for flow {}", step_ids, flow_id);

        self.store
            .update(flow_id, |flow| {
                if flow.steps.is_none() {
                    flow.steps = Some(step_ids.into_iter().map(FlowStep::new).collect());
                }
                Ok(())
            })
            .await
    }

    /// Commit and verify the current step of flow `flow_id`
    ///
    /// Never returns an error: failures of the step are recorded on the step and reported as
    /// [`CommitOutcome::Failed`]. Once the last step confirms, the read model is polled before
    /// returning. Other commits are accepted again while it is polled.
    #[instrument(skip(self))]
    pub async fn commit_step(&self, flow_id: Uuid) -> CommitOutcome {
        let mut outcome = {
            let Ok(_in_flight) = self.in_flight.try_lock() else {
                tracing::debug!("Commit requested while a step is in flight");
                return CommitOutcome::Rejected(CommitRejection::StepInFlight);
            };

            match self.drive_current_step(flow_id).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!("Could not record progress of flow {}: {}", flow_id, err);
                    return CommitOutcome::Rejected(CommitRejection::Storage(err.to_string()));
                }
            }
        };

        if let CommitOutcome::Confirmed {
            flow_complete: true,
            indexed,
            ..
        } = &mut outcome
        {
            *indexed = Some(self.post_flow_check(flow_id).await);
        }

        outcome
    }

    async fn drive_current_step(&self, flow_id: Uuid) -> Result<CommitOutcome, Error> {
        let Some(flow) = self.store.get() else {
            return Ok(CommitOutcome::Rejected(CommitRejection::NoActiveFlow));
        };
        if flow.id != flow_id {
            return Ok(CommitOutcome::Rejected(CommitRejection::FlowReplaced));
        }
        let Some(index) = flow.current_step_index() else {
            return Ok(CommitOutcome::Rejected(CommitRejection::StepsNotDerived));
        };
        let Some(step) = flow.current_step().cloned() else {
            return Ok(CommitOutcome::Complete);
        };
        let Ok(declaration) = self.registry.get(flow.flow_id()) else {
            return Ok(CommitOutcome::Rejected(CommitRejection::UnknownFlow(
                flow.flow_id(),
            )));
        };
        let ctx = self.context(&flow);

        let artifact = match (step.status, step.artifact) {
            (StepStatus::AwaitingVerify, Some(artifact)) => {
                tracing::info!("Resuming verification of {} ({})", step.id, artifact);
                artifact
            }
            (StepStatus::AwaitingVerify, None) => {
                return self
                    .fail_step(flow_id, index, &step.id, Error::MissingArtifact)
                    .await;
            }
            (status, _) => {
                if status == StepStatus::AwaitingCommit {
                    tracing::warn!("Step {} was left awaiting commit, restarting", step.id);
                }

                // Single write, an interrupted attempt goes through `Error` and never `Idle`
                let begun = self
                    .update_step(flow_id, index, |step| {
                        if step.status == StepStatus::AwaitingCommit {
                            step.fail("Commit interrupted")?;
                        }
                        step.begin_commit()
                    })
                    .await?;
                if begun.is_none() {
                    return Ok(CommitOutcome::Rejected(CommitRejection::FlowReplaced));
                }

                let artifact = match declaration.commit(&ctx, &step.id).await {
                    Ok(artifact) if !artifact.is_empty() => artifact,
                    Ok(_) => {
                        return self
                            .fail_step(flow_id, index, &step.id, Error::MissingArtifact)
                            .await
                    }
                    Err(err) => return self.fail_step(flow_id, index, &step.id, err).await,
                };

                let recorded = self
                    .update_step(flow_id, index, |step| step.await_verify(artifact.clone()))
                    .await?;
                if recorded.is_none() {
                    tracing::warn!(
                        "Flow {} was replaced after broadcasting {}",
                        flow_id,
                        artifact
                    );
                    return Ok(CommitOutcome::Rejected(CommitRejection::FlowReplaced));
                }
                tracing::info!("Step {} broadcast as {}", step.id, artifact);
                artifact
            }
        };

        if let Err(err) = declaration.verify(&ctx, &step.id, &artifact).await {
            return self.fail_step(flow_id, index, &step.id, err).await;
        }

        let output = match declaration.parse_receipt(&ctx, &step.id, &artifact).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!("Could not parse receipt of {}: {}", artifact, err);
                None
            }
        };

        let confirmed_output = output.clone();
        let Some(flow) = self
            .update_step(flow_id, index, move |step| step.confirm(confirmed_output))
            .await?
        else {
            return Ok(CommitOutcome::Rejected(CommitRejection::FlowReplaced));
        };
        tracing::info!("Step {} confirmed", step.id);

        Ok(CommitOutcome::Confirmed {
            step_index: index,
            step_id: step.id,
            artifact,
            output,
            flow_complete: flow.is_complete(),
            indexed: None,
        })
    }

    async fn update_step<F>(
        &self,
        flow_id: Uuid,
        index: usize,
        f: F,
    ) -> Result<Option<Flowstate>, Error>
    where
        F: FnOnce(&mut FlowStep) -> Result<(), loanflow_common::state::Error> + Send,
    {
        self.store
            .update(flow_id, |flow| {
                let step = flow
                    .steps
                    .as_mut()
                    .and_then(|steps| steps.get_mut(index))
                    .ok_or_else(|| Error::Custom(format!("Flow has no step {index}")))?;
                f(step)?;
                Ok(())
            })
            .await
    }

    async fn fail_step(
        &self,
        flow_id: Uuid,
        index: usize,
        step_id: &str,
        err: Error,
    ) -> Result<CommitOutcome, Error> {
        let message = err.to_string();
        tracing::warn!("Step {} failed: {}", step_id, message);

        let failed = self
            .update_step(flow_id, index, |step| step.fail(message.clone()))
            .await
            .inspect_err(|e| tracing::error!("Could not record failure of {}: {}", step_id, e))?;
        let Some(flow) = failed else {
            return Ok(CommitOutcome::Rejected(CommitRejection::FlowReplaced));
        };

        let artifact = flow
            .steps
            .as_ref()
            .and_then(|steps| steps.get(index))
            .and_then(|step| step.artifact.clone());

        Ok(CommitOutcome::Failed {
            step_index: index,
            step_id: step_id.to_string(),
            error: message,
            artifact,
        })
    }

    /// Poll the read model until it reflects flow `flow_id`
    ///
    /// Gives up once the flow is no longer current.
    async fn post_flow_check(&self, flow_id: Uuid) -> bool {
        let max_attempts = self.settings.max_attempts;
        for attempt in 1..=max_attempts {
            let Some(flow) = self.store.get().filter(|flow| flow.id == flow_id) else {
                tracing::debug!("Flow {} was replaced, stopping post flow check", flow_id);
                return false;
            };
            let Ok(declaration) = self.registry.get(flow.flow_id()) else {
                return false;
            };

            match declaration.post_flow_check(&self.context(&flow), &flow).await {
                Ok(true) => return true,
                Ok(false) => tracing::debug!(
                    "Read model behind for flow {} ({}/{})",
                    flow_id,
                    attempt,
                    max_attempts
                ),
                Err(err) => tracing::warn!("Post flow check failed: {}", err),
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        tracing::warn!(
            "Read model did not reflect flow {} after {} checks",
            flow_id,
            max_attempts
        );
        false
    }
}
