//! Redemption and collateral surplus flows

use async_trait::async_trait;
use loanflow_common::{CallArg, ContractCall, Error, FlowId};
use tracing::instrument;

use super::{expect_request, FlowContext, FlowDeclaration};

const REDEEM_COLLATERAL: &str = "redeemCollateral";
const CLAIM_COLLATERAL: &str = "claimCollateral";

/// Redeem stablecoins for collateral across every branch
#[derive(Debug, Clone, Copy, Default)]
pub struct RedeemCollateral;

#[async_trait]
impl FlowDeclaration for RedeemCollateral {
    fn flow_id(&self) -> FlowId {
        FlowId::RedeemCollateral
    }

    fn title(&self) -> &'static str {
        "Redeem BOLD"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[REDEEM_COLLATERAL]
    }

    // Redeemed stablecoins are burned by the registry, no allowance involved
    async fn get_steps(&self, _ctx: &FlowContext) -> Result<Vec<String>, Error> {
        Ok(vec![REDEEM_COLLATERAL.to_string()])
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        (step_id == REDEEM_COLLATERAL).then(|| "Redeem".to_string())
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != REDEEM_COLLATERAL {
            return Err(Error::UnknownStep(step_id.to_string()));
        }
        let request = expect_request!(ctx, RedeemCollateral)?;
        let call = ContractCall::new(
            ctx.deployment.collateral_registry,
            "redeemCollateral",
            vec![
                CallArg::Amount(request.amount),
                CallArg::Uint(request.max_iterations_per_collateral.into()),
                CallArg::Amount(request.max_fee_percentage),
            ],
        );
        ctx.chain.submit(ctx.account, call).await
    }
}

/// Claim collateral left over after a position was liquidated or redeemed
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimCollateralSurplus;

#[async_trait]
impl FlowDeclaration for ClaimCollateralSurplus {
    fn flow_id(&self) -> FlowId {
        FlowId::ClaimCollateralSurplus
    }

    fn title(&self) -> &'static str {
        "Claim collateral surplus"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[CLAIM_COLLATERAL]
    }

    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let request = expect_request!(ctx, ClaimCollateralSurplus)?;
        ctx.deployment.branch(request.branch_id)?;
        Ok(vec![CLAIM_COLLATERAL.to_string()])
    }

    fn step_name(&self, ctx: &FlowContext, step_id: &str) -> Option<String> {
        if step_id != CLAIM_COLLATERAL {
            return None;
        }
        let symbol = ctx
            .request
            .branch_id()
            .and_then(|id| ctx.deployment.branch(id).ok())
            .map(|branch| branch.symbol.as_str())
            .unwrap_or("collateral");
        Some(format!("Claim {symbol}"))
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != CLAIM_COLLATERAL {
            return Err(Error::UnknownStep(step_id.to_string()));
        }
        let request = expect_request!(ctx, ClaimCollateralSurplus)?;
        let branch = ctx.deployment.branch(request.branch_id)?;
        let call = ContractCall::new(branch.borrower_operations, "claimCollateral", vec![]);
        ctx.chain.submit(ctx.account, call).await
    }
}
