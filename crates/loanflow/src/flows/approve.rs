//! Token approvals shared by the flows that spend tokens

use loanflow_common::{Address, Amount, CallArg, ContractCall, Error, ReadCall};
use tracing::instrument;

use super::FlowContext;

/// Allowance a flow needs before its main step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Approval {
    pub(crate) token: Address,
    pub(crate) spender: Address,
    pub(crate) amount: Amount,
}

impl Approval {
    /// Fail planning if the account holds less than the amount
    #[instrument(skip(ctx))]
    pub(crate) async fn check_balance(&self, ctx: &FlowContext) -> Result<(), Error> {
        let available = ctx
            .chain
            .read(ReadCall::Balance {
                token: self.token,
                owner: ctx.account,
            })
            .await?;

        if available < self.amount {
            return Err(Error::InsufficientBalance {
                token: self.token,
                required: self.amount,
                available,
            });
        }
        Ok(())
    }

    /// `true` if the current allowance does not cover the amount
    #[instrument(skip(ctx))]
    pub(crate) async fn is_needed(&self, ctx: &FlowContext) -> Result<bool, Error> {
        if self.amount.is_zero() {
            return Ok(false);
        }

        let allowance = ctx
            .chain
            .read(ReadCall::Allowance {
                token: self.token,
                owner: ctx.account,
                spender: self.spender,
            })
            .await?;

        tracing::debug!("Allowance {} for required {}", allowance, self.amount);

        Ok(allowance < self.amount)
    }

    /// `approve(spender, amount)` on the token
    pub(crate) fn call(&self) -> ContractCall {
        ContractCall::new(
            self.token,
            "approve",
            vec![CallArg::Address(self.spender), CallArg::Amount(self.amount)],
        )
    }

    /// Submit the approval
    pub(crate) async fn submit(&self, ctx: &FlowContext) -> Result<String, Error> {
        ctx.chain.submit(ctx.account, self.call()).await
    }
}
