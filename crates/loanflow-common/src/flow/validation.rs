//! Request validation

use thiserror::Error;

use super::request::*;
use super::FlowId;
use crate::amount::Amount;

/// Lowest annual interest rate accepted (0.5%)
pub const MIN_ANNUAL_INTEREST_RATE: Amount = Amount::new(5_000_000_000_000_000);

/// Highest annual interest rate accepted (250%)
pub const MAX_ANNUAL_INTEREST_RATE: Amount = Amount::new(2_500_000_000_000_000_000);

/// Smallest debt a position may be opened with (2000 BOLD)
pub const MIN_DEBT: Amount = Amount::new(2_000_000_000_000_000_000_000);

/// 100% in 18 decimal fixed point
pub const MAX_FEE_PERCENTAGE: Amount = Amount::WAD;

/// Request or persisted payload failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Payload could not be decoded
    #[error("Malformed request: {0}")]
    Malformed(String),
    /// Missing `flowId`
    #[error("Request has no flowId")]
    MissingFlowId,
    /// Unknown `flowId`
    #[error("Unknown flow `{0}`")]
    UnknownFlow(String),
    /// `flowId` does not belong to the declaration
    #[error("Expected a `{expected}` request, got `{found}`")]
    FlowMismatch {
        /// Declaration flow
        expected: FlowId,
        /// Request flow
        found: String,
    },
    /// Required amount is zero
    #[error("`{0}` must be greater than zero")]
    ZeroAmount(&'static str),
    /// Required text is empty
    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),
    /// Interest rate out of the accepted range
    #[error("Interest rate {0} is outside of the accepted range")]
    InterestRateOutOfRange(Amount),
    /// Debt below the minimum
    #[error("Debt {actual} is below the minimum of {minimum}")]
    DebtBelowMinimum {
        /// Minimum debt
        minimum: Amount,
        /// Requested debt
        actual: Amount,
    },
    /// Fee ceiling above 100%
    #[error("Fee percentage {0} exceeds 100%")]
    FeeAboveMaximum(Amount),
    /// Adjustment changes nothing
    #[error("Adjustment changes neither collateral nor debt")]
    NoChange,
}

/// Validation of a decoded value
pub trait Validate {
    /// Check constraints the type system cannot express
    fn validate(&self) -> Result<(), ValidationError>;
}

fn non_zero(amount: Amount, field: &'static str) -> Result<(), ValidationError> {
    if amount.is_zero() {
        return Err(ValidationError::ZeroAmount(field));
    }
    Ok(())
}

fn interest_rate(rate: Amount) -> Result<(), ValidationError> {
    if rate < MIN_ANNUAL_INTEREST_RATE || rate > MAX_ANNUAL_INTEREST_RATE {
        return Err(ValidationError::InterestRateOutOfRange(rate));
    }
    Ok(())
}

fn minimum_debt(debt: Amount) -> Result<(), ValidationError> {
    if debt < MIN_DEBT {
        return Err(ValidationError::DebtBelowMinimum {
            minimum: MIN_DEBT,
            actual: debt,
        });
    }
    Ok(())
}

impl Validate for RequestMeta {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.success_link.path.trim().is_empty() {
            return Err(ValidationError::EmptyField("successLink.path"));
        }
        if self.success_message.trim().is_empty() {
            return Err(ValidationError::EmptyField("successMessage"));
        }
        if let Some(back) = &self.back_link {
            if back.path.trim().is_empty() {
                return Err(ValidationError::EmptyField("backLink.path"));
            }
        }
        Ok(())
    }
}

impl Validate for FlowRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        self.meta().validate()?;

        match self {
            FlowRequest::OpenBorrowPosition(r) => {
                non_zero(r.coll_amount, "collAmount")?;
                minimum_debt(r.bold_amount)?;
                interest_rate(r.annual_interest_rate)?;
            }
            FlowRequest::UpdateBorrowPosition(r) => {
                if r.coll_change.is_zero() && r.debt_change.is_zero() {
                    return Err(ValidationError::NoChange);
                }
            }
            FlowRequest::CloseLoanPosition(_) => {}
            FlowRequest::UpdateLoanInterestRate(r) => interest_rate(r.annual_interest_rate)?,
            FlowRequest::OpenLeveragePosition(r) => {
                non_zero(r.coll_amount, "collAmount")?;
                non_zero(r.flash_loan_amount, "flashLoanAmount")?;
                minimum_debt(r.bold_amount)?;
                interest_rate(r.annual_interest_rate)?;
            }
            FlowRequest::EarnDeposit(r) | FlowRequest::EarnWithdraw(r) => {
                non_zero(r.amount, "amount")?
            }
            FlowRequest::EarnClaimRewards(_) | FlowRequest::ClaimCollateralSurplus(_) => {}
            FlowRequest::StakeDeposit(r) => non_zero(r.amount, "amount")?,
            FlowRequest::StakeWithdraw(r) => non_zero(r.amount, "amount")?,
            FlowRequest::StakeClaimRewards(_) => {}
            FlowRequest::RedeemCollateral(r) => {
                non_zero(r.amount, "amount")?;
                if r.max_fee_percentage > MAX_FEE_PERCENTAGE {
                    return Err(ValidationError::FeeAboveMaximum(r.max_fee_percentage));
                }
            }
        }

        Ok(())
    }
}
