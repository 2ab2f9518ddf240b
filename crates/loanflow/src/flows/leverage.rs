//! Leveraged position flow

use async_trait::async_trait;
use loanflow_common::{CallArg, ContractCall, Error, FlowId, Flowstate};
use tracing::instrument;

use super::approve::Approval;
use super::borrow::{opened_trove_indexed, trove_id_from_receipt};
use super::{expect_request, FlowContext, FlowDeclaration, APPROVE_TOKEN};

const OPEN_LEVERAGED_TROVE: &str = "openLeveragedTrove";

/// Open a leveraged borrow position through the branch's zapper
///
/// The zapper flash loans extra collateral, opens the trove with the combined amount and
/// repays the flash loan with the borrowed stablecoin, all in one transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenLeveragePosition;

impl OpenLeveragePosition {
    fn approval(ctx: &FlowContext) -> Result<Approval, Error> {
        let request = expect_request!(ctx, OpenLeveragePosition)?;
        let branch = ctx.deployment.branch(request.branch_id)?;
        Ok(Approval {
            token: branch.coll_token,
            spender: branch.leverage_zapper,
            amount: request.coll_amount,
        })
    }
}

#[async_trait]
impl FlowDeclaration for OpenLeveragePosition {
    fn flow_id(&self) -> FlowId {
        FlowId::OpenLeveragePosition
    }

    fn title(&self) -> &'static str {
        "Open leveraged position"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[APPROVE_TOKEN, OPEN_LEVERAGED_TROVE]
    }

    #[instrument(skip_all)]
    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let mut steps = Vec::with_capacity(2);
        let approval = Self::approval(ctx)?;
        approval.check_balance(ctx).await?;
        if approval.is_needed(ctx).await? {
            steps.push(APPROVE_TOKEN.to_string());
        }
        steps.push(OPEN_LEVERAGED_TROVE.to_string());
        Ok(steps)
    }

    fn step_name(&self, ctx: &FlowContext, step_id: &str) -> Option<String> {
        match step_id {
            APPROVE_TOKEN => {
                let branch = ctx.deployment.branch(ctx.request.branch_id()?).ok()?;
                Some(format!("Approve {}", branch.symbol))
            }
            OPEN_LEVERAGED_TROVE => Some("Open leveraged loan".to_string()),
            _ => None,
        }
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        match step_id {
            APPROVE_TOKEN => Self::approval(ctx)?.submit(ctx).await,
            OPEN_LEVERAGED_TROVE => {
                let request = expect_request!(ctx, OpenLeveragePosition)?;
                let branch = ctx.deployment.branch(request.branch_id)?;
                let call = ContractCall::new(
                    branch.leverage_zapper,
                    "openLeveragedTroveWithRawETH",
                    vec![
                        CallArg::Address(ctx.account),
                        CallArg::Uint(request.owner_index),
                        CallArg::Amount(request.coll_amount),
                        CallArg::Amount(request.flash_loan_amount),
                        CallArg::Amount(request.bold_amount),
                        CallArg::Amount(request.annual_interest_rate),
                        CallArg::Amount(request.max_upfront_fee),
                    ],
                );
                ctx.chain.submit(ctx.account, call).await
            }
            _ => Err(Error::UnknownStep(step_id.to_string())),
        }
    }

    async fn parse_receipt(
        &self,
        ctx: &FlowContext,
        step_id: &str,
        artifact: &str,
    ) -> Result<Option<String>, Error> {
        match step_id {
            OPEN_LEVERAGED_TROVE => trove_id_from_receipt(ctx, artifact).await,
            _ => Ok(None),
        }
    }

    async fn post_flow_check(&self, ctx: &FlowContext, flow: &Flowstate) -> Result<bool, Error> {
        let request = expect_request!(ctx, OpenLeveragePosition)?;
        opened_trove_indexed(ctx, flow, request.branch_id, OPEN_LEVERAGED_TROVE).await
    }
}
