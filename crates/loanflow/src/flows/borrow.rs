//! Borrow position flows

use std::str::FromStr;

use async_trait::async_trait;
use loanflow_common::{CallArg, ContractCall, Error, FlowId, Flowstate, TroveId};
use tracing::instrument;

use super::approve::Approval;
use super::{
    expect_request, indexed_past_last_step, FlowContext, FlowDeclaration, APPROVE_TOKEN,
};

/// Step opening a trove
pub const OPEN_TROVE: &str = "openTrove";
/// Event emitted for every trove operation
pub const TROVE_OPERATION_EVENT: &str = "TroveOperation";

const APPROVE_COLL: &str = "approveColl";
const ADJUST_TROVE: &str = "adjustTrove";
const CLOSE_TROVE: &str = "closeTrove";
const ADJUST_INTEREST_RATE: &str = "adjustInterestRate";

fn approve_name(ctx: &FlowContext) -> Option<String> {
    let branch = ctx.deployment.branch(ctx.request.branch_id()?).ok()?;
    Some(format!("Approve {}", branch.symbol))
}

/// Read the id of a newly opened trove from its `TroveOperation` log
pub(crate) async fn trove_id_from_receipt(
    ctx: &FlowContext,
    artifact: &str,
) -> Result<Option<String>, Error> {
    let Some(receipt) = ctx.chain.get_receipt(artifact).await? else {
        return Ok(None);
    };

    let trove_id = receipt
        .find_log(TROVE_OPERATION_EVENT)
        .and_then(|log| log.fields.get("troveId"))
        .ok_or_else(|| Error::MissingLog {
            tx_hash: artifact.to_string(),
            event: TROVE_OPERATION_EVENT.to_string(),
        })?;

    // Normalize the representation
    Ok(Some(TroveId::from_str(trove_id)?.to_string()))
}

/// Wait until the indexer lists the trove opened by `step_id`
pub(crate) async fn opened_trove_indexed(
    ctx: &FlowContext,
    flow: &Flowstate,
    branch_id: u32,
    step_id: &str,
) -> Result<bool, Error> {
    let output = flow
        .steps
        .as_ref()
        .and_then(|steps| steps.iter().find(|step| step.id == step_id))
        .and_then(|step| step.output.as_deref());

    match output {
        Some(trove_id) => {
            let trove_id = TroveId::from_str(trove_id)?;
            Ok(ctx.read_model.trove(branch_id, &trove_id).await?.is_some())
        }
        None => indexed_past_last_step(ctx, flow).await,
    }
}

/// Open a borrow position
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenBorrowPosition;

impl OpenBorrowPosition {
    fn approval(ctx: &FlowContext) -> Result<Approval, Error> {
        let request = expect_request!(ctx, OpenBorrowPosition)?;
        let branch = ctx.deployment.branch(request.branch_id)?;
        Ok(Approval {
            token: branch.coll_token,
            spender: branch.borrower_operations,
            amount: request.coll_amount,
        })
    }
}

#[async_trait]
impl FlowDeclaration for OpenBorrowPosition {
    fn flow_id(&self) -> FlowId {
        FlowId::OpenBorrowPosition
    }

    fn title(&self) -> &'static str {
        "Open borrow position"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[APPROVE_TOKEN, OPEN_TROVE]
    }

    #[instrument(skip_all)]
    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let mut steps = Vec::with_capacity(2);
        let approval = Self::approval(ctx)?;
        approval.check_balance(ctx).await?;
        if approval.is_needed(ctx).await? {
            steps.push(APPROVE_TOKEN.to_string());
        }
        steps.push(OPEN_TROVE.to_string());
        Ok(steps)
    }

    fn step_name(&self, ctx: &FlowContext, step_id: &str) -> Option<String> {
        match step_id {
            APPROVE_TOKEN => approve_name(ctx),
            OPEN_TROVE => Some("Open loan".to_string()),
            _ => None,
        }
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        match step_id {
            APPROVE_TOKEN => Self::approval(ctx)?.submit(ctx).await,
            OPEN_TROVE => {
                let request = expect_request!(ctx, OpenBorrowPosition)?;
                let branch = ctx.deployment.branch(request.branch_id)?;
                let call = ContractCall::new(
                    branch.borrower_operations,
                    "openTrove",
                    vec![
                        CallArg::Address(ctx.account),
                        CallArg::Uint(request.owner_index),
                        CallArg::Amount(request.coll_amount),
                        CallArg::Amount(request.bold_amount),
                        CallArg::TroveId(request.upper_hint),
                        CallArg::TroveId(request.lower_hint),
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
            OPEN_TROVE => trove_id_from_receipt(ctx, artifact).await,
            _ => Ok(None),
        }
    }

    async fn post_flow_check(&self, ctx: &FlowContext, flow: &Flowstate) -> Result<bool, Error> {
        let request = expect_request!(ctx, OpenBorrowPosition)?;
        opened_trove_indexed(ctx, flow, request.branch_id, OPEN_TROVE).await
    }
}

/// Adjust collateral and debt of a borrow position
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateBorrowPosition;

#[async_trait]
impl FlowDeclaration for UpdateBorrowPosition {
    fn flow_id(&self) -> FlowId {
        FlowId::UpdateBorrowPosition
    }

    fn title(&self) -> &'static str {
        "Update borrow position"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[APPROVE_COLL, ADJUST_TROVE]
    }

    #[instrument(skip_all)]
    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let request = expect_request!(ctx, UpdateBorrowPosition)?;
        let branch = ctx.deployment.branch(request.branch_id)?;

        let mut steps = Vec::with_capacity(2);
        if request.is_coll_increase {
            let approval = Approval {
                token: branch.coll_token,
                spender: branch.borrower_operations,
                amount: request.coll_change,
            };
            approval.check_balance(ctx).await?;
            if approval.is_needed(ctx).await? {
                steps.push(APPROVE_COLL.to_string());
            }
        }
        steps.push(ADJUST_TROVE.to_string());
        Ok(steps)
    }

    fn step_name(&self, ctx: &FlowContext, step_id: &str) -> Option<String> {
        match step_id {
            APPROVE_COLL => approve_name(ctx),
            ADJUST_TROVE => Some("Update position".to_string()),
            _ => None,
        }
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        let request = expect_request!(ctx, UpdateBorrowPosition)?;
        let branch = ctx.deployment.branch(request.branch_id)?;

        let call = match step_id {
            APPROVE_COLL => Approval {
                token: branch.coll_token,
                spender: branch.borrower_operations,
                amount: request.coll_change,
            }
            .call(),
            ADJUST_TROVE => ContractCall::new(
                branch.borrower_operations,
                "adjustTrove",
                vec![
                    CallArg::TroveId(request.trove_id),
                    CallArg::Amount(request.coll_change),
                    CallArg::Bool(request.is_coll_increase),
                    CallArg::Amount(request.debt_change),
                    CallArg::Bool(request.is_debt_increase),
                    CallArg::Amount(request.max_upfront_fee),
                ],
            ),
            _ => return Err(Error::UnknownStep(step_id.to_string())),
        };

        ctx.chain.submit(ctx.account, call).await
    }
}

/// Repay and close a borrow position
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseLoanPosition;

#[async_trait]
impl FlowDeclaration for CloseLoanPosition {
    fn flow_id(&self) -> FlowId {
        FlowId::CloseLoanPosition
    }

    fn title(&self) -> &'static str {
        "Close loan position"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[CLOSE_TROVE]
    }

    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let request = expect_request!(ctx, CloseLoanPosition)?;
        ctx.deployment.branch(request.branch_id)?;
        Ok(vec![CLOSE_TROVE.to_string()])
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        (step_id == CLOSE_TROVE).then(|| "Close loan".to_string())
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != CLOSE_TROVE {
            return Err(Error::UnknownStep(step_id.to_string()));
        }

        let request = expect_request!(ctx, CloseLoanPosition)?;
        let branch = ctx.deployment.branch(request.branch_id)?;
        let call = ContractCall::new(
            branch.borrower_operations,
            "closeTrove",
            vec![CallArg::TroveId(request.trove_id)],
        );
        ctx.chain.submit(ctx.account, call).await
    }
}

/// Change the interest rate of a borrow position
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateLoanInterestRate;

#[async_trait]
impl FlowDeclaration for UpdateLoanInterestRate {
    fn flow_id(&self) -> FlowId {
        FlowId::UpdateLoanInterestRate
    }

    fn title(&self) -> &'static str {
        "Update interest rate"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[ADJUST_INTEREST_RATE]
    }

    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let request = expect_request!(ctx, UpdateLoanInterestRate)?;
        ctx.deployment.branch(request.branch_id)?;
        Ok(vec![ADJUST_INTEREST_RATE.to_string()])
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        (step_id == ADJUST_INTEREST_RATE).then(|| "Update interest rate".to_string())
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != ADJUST_INTEREST_RATE {
            return Err(Error::UnknownStep(step_id.to_string()));
        }

        let request = expect_request!(ctx, UpdateLoanInterestRate)?;
        let branch = ctx.deployment.branch(request.branch_id)?;
        let call = ContractCall::new(
            branch.borrower_operations,
            "adjustTroveInterestRate",
            vec![
                CallArg::TroveId(request.trove_id),
                CallArg::Amount(request.annual_interest_rate),
                CallArg::TroveId(request.upper_hint),
                CallArg::TroveId(request.lower_hint),
                CallArg::Amount(request.max_upfront_fee),
            ],
        );
        ctx.chain.submit(ctx.account, call).await
    }
}
