//! Flow Declaration Registry
//!
//! A [`FlowDeclaration`] describes one kind of flow: how its request is validated, which steps
//! it needs given the current chain state, and how each step is committed and verified.
//! Planning ([`FlowDeclaration::get_steps`]) only reads, execution only writes, so steps can be
//! re-planned after a restart without resubmitting anything.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use loanflow_common::flow::ValidationError;
use loanflow_common::{
    Address, ChainClient, Deployment, Error, FlowId, FlowRequest, Flowstate, ReadModel,
    ReceiptStatus,
};
use serde_json::Value;

/// Step id used for approvals in single token flows
pub const APPROVE_TOKEN: &str = "approveToken";

/// Extract the request variant a declaration works on
macro_rules! expect_request {
    ($ctx:expr, $variant:ident) => {
        match &$ctx.request {
            ::loanflow_common::FlowRequest::$variant(request) => Ok(request),
            other => Err(::loanflow_common::Error::Validation(
                ::loanflow_common::flow::ValidationError::FlowMismatch {
                    expected: ::loanflow_common::FlowId::$variant,
                    found: other.flow_id().to_string(),
                },
            )),
        }
    };
}

pub(crate) use expect_request;

mod approve;
mod borrow;
mod earn;
mod leverage;
mod redeem;
mod stake;

pub use borrow::{
    CloseLoanPosition, OpenBorrowPosition, UpdateBorrowPosition, UpdateLoanInterestRate,
};
pub use earn::{EarnClaimRewards, EarnDeposit, EarnWithdraw};
pub use leverage::OpenLeveragePosition;
pub use redeem::{ClaimCollateralSurplus, RedeemCollateral};
pub use stake::{StakeClaimRewards, StakeDeposit, StakeWithdraw};

/// Everything a declaration gets to plan and execute steps
#[derive(Debug, Clone)]
pub struct FlowContext {
    /// Owning account, the sender of every transaction
    pub account: Address,
    /// Validated request
    pub request: FlowRequest,
    /// Protocol contracts
    pub deployment: Arc<Deployment>,
    /// Chain client
    pub chain: Arc<dyn ChainClient>,
    /// Indexer
    pub read_model: Arc<dyn ReadModel>,
}

/// Declaration of one kind of flow
#[async_trait]
pub trait FlowDeclaration: Debug + Send + Sync {
    /// Flow this declaration handles
    fn flow_id(&self) -> FlowId;

    /// Human readable flow title
    fn title(&self) -> &'static str;

    /// Validate an untyped request
    ///
    /// Used both when a flow is started and when a persisted flow is restored.
    fn parse_request(&self, raw: &Value) -> Result<FlowRequest, ValidationError> {
        FlowRequest::parse_as(self.flow_id(), raw)
    }

    /// Ordered step ids for the request given the current chain state
    ///
    /// Must only read: calling it again after a partial failure yields a consistent list.
    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error>;

    /// Every step id `get_steps` may return
    fn known_steps(&self) -> &'static [&'static str];

    /// Human readable step name, `None` if the declaration has no such step
    fn step_name(&self, ctx: &FlowContext, step_id: &str) -> Option<String>;

    /// Sign and broadcast a step, returns the transaction hash
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error>;

    /// Wait for a committed step to be confirmed
    async fn verify(
        &self,
        ctx: &FlowContext,
        _step_id: &str,
        artifact: &str,
    ) -> Result<(), Error> {
        let receipt = ctx.chain.wait_for_receipt(artifact).await?;
        match receipt.status {
            ReceiptStatus::Success => Ok(()),
            ReceiptStatus::Reverted => Err(Error::Reverted(artifact.to_string())),
        }
    }

    /// Identifier derived from a confirmed step's receipt
    async fn parse_receipt(
        &self,
        _ctx: &FlowContext,
        _step_id: &str,
        _artifact: &str,
    ) -> Result<Option<String>, Error> {
        Ok(None)
    }

    /// Whether the read model reflects the completed flow
    ///
    /// Defaults to waiting until the indexer passed the block of the last confirmed step.
    async fn post_flow_check(&self, ctx: &FlowContext, flow: &Flowstate) -> Result<bool, Error> {
        indexed_past_last_step(ctx, flow).await
    }
}

/// `true` once the read model indexed the block of the last committed step
pub(crate) async fn indexed_past_last_step(
    ctx: &FlowContext,
    flow: &Flowstate,
) -> Result<bool, Error> {
    let Some(artifact) = flow
        .steps
        .as_ref()
        .and_then(|steps| steps.iter().rev().find_map(|step| step.artifact.as_deref()))
    else {
        return Ok(true);
    };

    let Some(receipt) = ctx.chain.get_receipt(artifact).await? else {
        return Ok(false);
    };

    Ok(ctx.read_model.indexed_block().await? >= receipt.block_number)
}

/// Lookup of flow declarations by flow id
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    declarations: HashMap<FlowId, Arc<dyn FlowDeclaration>>,
}

impl FlowRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built in flow
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenBorrowPosition));
        registry.register(Arc::new(UpdateBorrowPosition));
        registry.register(Arc::new(CloseLoanPosition));
        registry.register(Arc::new(UpdateLoanInterestRate));
        registry.register(Arc::new(OpenLeveragePosition));
        registry.register(Arc::new(EarnDeposit));
        registry.register(Arc::new(EarnWithdraw));
        registry.register(Arc::new(EarnClaimRewards));
        registry.register(Arc::new(StakeDeposit));
        registry.register(Arc::new(StakeWithdraw));
        registry.register(Arc::new(StakeClaimRewards));
        registry.register(Arc::new(RedeemCollateral));
        registry.register(Arc::new(ClaimCollateralSurplus));
        registry
    }

    /// Register a declaration, replacing any previous one for the same flow
    pub fn register(&mut self, declaration: Arc<dyn FlowDeclaration>) {
        self.declarations.insert(declaration.flow_id(), declaration);
    }

    /// Declaration of a flow
    pub fn get(&self, flow_id: FlowId) -> Result<Arc<dyn FlowDeclaration>, Error> {
        self.declarations
            .get(&flow_id)
            .cloned()
            .ok_or(Error::UnknownFlow(flow_id))
    }

    /// Validate an untyped request with the declaration named by its `flowId`
    pub fn parse_request(&self, raw: &Value) -> Result<FlowRequest, Error> {
        let flow_id = FlowRequest::raw_flow_id(raw)?;
        Ok(self.get(flow_id)?.parse_request(raw)?)
    }

    /// Registered flows, sorted
    pub fn flow_ids(&self) -> Vec<FlowId> {
        let mut ids: Vec<FlowId> = self.declarations.keys().copied().collect();
        ids.sort();
        ids
    }
}
