//! Governance staking flows

use async_trait::async_trait;
use loanflow_common::{Amount, CallArg, ContractCall, Error, FlowId};
use tracing::instrument;

use super::approve::Approval;
use super::{expect_request, FlowContext, FlowDeclaration, APPROVE_TOKEN};

const STAKE_DEPOSIT: &str = "stakeDeposit";
const UNSTAKE: &str = "unstake";
const CLAIM_REWARDS: &str = "claimRewards";

/// Stake governance tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct StakeDeposit;

impl StakeDeposit {
    fn approval(ctx: &FlowContext) -> Result<Approval, Error> {
        let request = expect_request!(ctx, StakeDeposit)?;
        Ok(Approval {
            token: ctx.deployment.lqty_token,
            spender: ctx.deployment.lqty_staking,
            amount: request.amount,
        })
    }
}

#[async_trait]
impl FlowDeclaration for StakeDeposit {
    fn flow_id(&self) -> FlowId {
        FlowId::StakeDeposit
    }

    fn title(&self) -> &'static str {
        "Stake LQTY"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[APPROVE_TOKEN, STAKE_DEPOSIT]
    }

    #[instrument(skip_all)]
    async fn get_steps(&self, ctx: &FlowContext) -> Result<Vec<String>, Error> {
        let mut steps = Vec::with_capacity(2);
        let approval = Self::approval(ctx)?;
        approval.check_balance(ctx).await?;
        if approval.is_needed(ctx).await? {
            steps.push(APPROVE_TOKEN.to_string());
        }
        steps.push(STAKE_DEPOSIT.to_string());
        Ok(steps)
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        match step_id {
            APPROVE_TOKEN => Some("Approve LQTY".to_string()),
            STAKE_DEPOSIT => Some("Stake".to_string()),
            _ => None,
        }
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        match step_id {
            APPROVE_TOKEN => Self::approval(ctx)?.submit(ctx).await,
            STAKE_DEPOSIT => {
                let request = expect_request!(ctx, StakeDeposit)?;
                let call = ContractCall::new(
                    ctx.deployment.lqty_staking,
                    "stake",
                    vec![CallArg::Amount(request.amount)],
                );
                ctx.chain.submit(ctx.account, call).await
            }
            _ => Err(Error::UnknownStep(step_id.to_string())),
        }
    }
}

/// Unstake governance tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct StakeWithdraw;

#[async_trait]
impl FlowDeclaration for StakeWithdraw {
    fn flow_id(&self) -> FlowId {
        FlowId::StakeWithdraw
    }

    fn title(&self) -> &'static str {
        "Unstake LQTY"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[UNSTAKE]
    }

    async fn get_steps(&self, _ctx: &FlowContext) -> Result<Vec<String>, Error> {
        Ok(vec![UNSTAKE.to_string()])
    }

    fn step_name(&self, _ctx: &FlowContext, step_id: &str) -> Option<String> {
        (step_id == UNSTAKE).then(|| "Unstake".to_string())
    }

    #[instrument(skip(self, ctx))]
    async fn commit(&self, ctx: &FlowContext, step_id: &str) -> Result<String, Error> {
        if step_id != UNSTAKE {
            return Err(Error::UnknownStep(step_id.to_string()));
        }
        let request = expect_request!(ctx, StakeWithdraw)?;
        let call = ContractCall::new(
            ctx.deployment.lqty_staking,
            "unstake",
            vec![CallArg::Amount(request.amount)],
        );
        ctx.chain.submit(ctx.account, call).await
    }
}

/// Claim staking rewards
#[derive(Debug, Clone, Copy, Default)]
pub struct StakeClaimRewards;

#[async_trait]
impl FlowDeclaration for StakeClaimRewards {
    fn flow_id(&self) -> FlowId {
        FlowId::StakeClaimRewards
    }

    fn title(&self) -> &'static str {
        "Claim staking rewards"
    }

    fn known_steps(&self) -> &'static [&'static str] {
        &[CLAIM_REWARDS]
    }

    async fn get_steps(&self, _ctx: &FlowContext) -> Result<Vec<String>, Error> {
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
        // Unstaking zero pays out accumulated rewards
        let call = ContractCall::new(
            ctx.deployment.lqty_staking,
            "unstake",
            vec![CallArg::Amount(Amount::ZERO)],
        );
        ctx.chain.submit(ctx.account, call).await
    }
}
