//! Stability pool flows

use async_trait::async_trait;
use loanflow_common::{Amount, CallArg, ContractCall, Error, FlowId};
use tracing::instrument;

use super::{expect_request, FlowContext, FlowDeclaration};

const PROVIDE_TO_STABILITY_POOL: &str = "provideToStabilityPool";
const WITHDRAW_FROM_STABILITY_POOL: &str = "withdrawFromStabilityPool";
const CLAIM_REWARDS: &str = "claimRewards";

async fn submit_pool_call(
    ctx: &FlowContext,
    branch_id: u32,
    function: &str,
    amount: Amount,
    claim_rewards: bool,
) -> Result<String, Error> {
    let branch = ctx.deployment.branch(branch_id)?;
    let call = ContractCall::new(
        branch.stability_pool,
        function,
        vec![CallArg::Amount(amount), CallArg::Bool(claim_rewards)],
    );
    ctx.chain.submit(ctx.account, call).await
}

/// Deposit stablecoins into a stability pool
#[derive(Debug, Clone, Copy, Default)]
pub struct EarnDeposit;

#[async_trait]
impl FlowDeclaration for EarnDeposit {
    fn flow_id(&self) -> FlowId {
        FlowId::EarnDeposit
    }

    fn title(&self) -> &'static str {
        "Deposit to stability pool"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[PROVIDE_TO_STABILITY_POOL]
    }

    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let request = expect_request!(ctx, EarnDeposit)?;
        ctx.deployment.branch(request.branch_id)?;
        Ok(vec![PROVIDE_TO_STABILITY_POOL.to_string()])
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        (step_id == PROVIDE_TO_STABILITY_POOL).then(|| "Deposit".to_string())
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != PROVIDE_TO_STABILITY_POOL {
            return Err(Error::UnknownStep(step_id.to_string()));
        }
        let request = expect_request!(ctx, EarnDeposit)?;
        submit_pool_call(
            ctx,
            request.branch_id,
            "provideToSP",
            request.amount,
            request.claim_rewards,
        )
        .await
    }
}

/// Withdraw stablecoins from a stability pool
#[derive(Debug, Clone, Copy, Default)]
pub struct EarnWithdraw;

#[async_trait]
impl FlowDeclaration for EarnWithdraw {
    fn flow_id(&self) -> FlowId {
        FlowId::EarnWithdraw
    }

    fn title(&self) -> &'static str {
        "Withdraw from stability pool"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[WITHDRAW_FROM_STABILITY_POOL]
    }

    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let request = expect_request!(ctx, EarnWithdraw)?;
        ctx.deployment.branch(request.branch_id)?;
        Ok(vec![WITHDRAW_FROM_STABILITY_POOL.to_string()])
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        (step_id == WITHDRAW_FROM_STABILITY_POOL).then(|| "Withdraw".to_string())
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != WITHDRAW_FROM_STABILITY_POOL {
            return Err(Error::UnknownStep(step_id.to_string()));
        }
        let request = expect_request!(ctx, EarnWithdraw)?;
        submit_pool_call(
            ctx,
            request.branch_id,
            "withdrawFromSP",
            request.amount,
            request.claim_rewards,
        )
        .await
    }
}

/// Claim stability pool rewards without moving the deposit
#[derive(Debug, Clone, Copy, Default)]
pub struct EarnClaimRewards;

#[async_trait]
impl FlowDeclaration for EarnClaimRewards {
    fn flow_id(&self) -> FlowId {
        FlowId::EarnClaimRewards
    }

    fn title(&self) -> &'static str {
        "Claim stability pool rewards"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[CLAIM_REWARDS]
    }

    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let request = expect_request!(ctx, EarnClaimRewards)?;
        ctx.deployment.branch(request.branch_id)?;
        Ok(vec![CLAIM_REWARDS.to_string()])
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        (step_id == CLAIM_REWARDS).then(|| "Claim rewards".to_string())
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != CLAIM_REWARDS {
            return Err(Error::UnknownStep(step_id.to_string()));
        }
        let request = expect_request!(ctx, EarnClaimRewards)?;
        // Withdrawing nothing with the claim flag set only pays out rewards
        submit_pool_call(ctx, request.branch_id, "withdrawFromSP", Amount::ZERO, true).await
    }
}
