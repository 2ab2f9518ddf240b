//! Flow requests
//!
//! A request is the immutable input of a flow. It is tagged by `flowId` on the wire and every
//! kind carries the navigation targets the client shows once the flow is done.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::{Validate, ValidationError};
use super::FlowId;
use crate::address::TroveId;
use crate::amount::Amount;

/// Navigation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Route path
    pub path: String,
    /// Button label
    pub label: String,
}

/// Fields shared by every request kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Where "back" leads while the flow is in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_link: Option<Link>,
    /// Where to go once the flow succeeded
    pub success_link: Link,
    /// Message shown once the flow succeeded
    pub success_message: String,
}

impl RequestMeta {
    /// Meta without a back link
    pub fn new<P, L, M>(success_path: P, success_label: L, success_message: M) -> Self
    where
        P: Into<String>,
        L: Into<String>,
        M: Into<String>,
    {
        Self {
            back_link: None,
            success_link: Link {
                path: success_path.into(),
                label: success_label.into(),
            },
            success_message: success_message.into(),
        }
    }

    /// Set the back link
    pub fn with_back_link<P: Into<String>, L: Into<String>>(mut self, path: P, label: L) -> Self {
        self.back_link = Some(Link {
            path: path.into(),
            label: label.into(),
        });
        self
    }
}

/// Open a borrow position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenBorrowPositionRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Collateral branch
    pub branch_id: u32,
    /// Owner index, distinguishes several troves of one owner
    pub owner_index: u64,
    /// Collateral deposited
    pub coll_amount: Amount,
    /// Stablecoin borrowed
    pub bold_amount: Amount,
    /// Annual interest rate (18 decimals)
    pub annual_interest_rate: Amount,
    /// Upper bound on the upfront fee
    pub max_upfront_fee: Amount,
    /// Sorted list insertion hint
    #[serde(default)]
    pub upper_hint: TroveId,
    /// Sorted list insertion hint
    #[serde(default)]
    pub lower_hint: TroveId,
}

/// Adjust collateral and/or debt of a borrow position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBorrowPositionRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Collateral branch
    pub branch_id: u32,
    /// Position
    pub trove_id: TroveId,
    /// Collateral change
    pub coll_change: Amount,
    /// Add collateral if `true`, withdraw otherwise
    pub is_coll_increase: bool,
    /// Debt change
    pub debt_change: Amount,
    /// Borrow more if `true`, repay otherwise
    pub is_debt_increase: bool,
    /// Upper bound on the upfront fee
    pub max_upfront_fee: Amount,
}

/// Repay and close a borrow position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseLoanPositionRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Collateral branch
    pub branch_id: u32,
    /// Position
    pub trove_id: TroveId,
}

/// Change the interest rate of a borrow position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoanInterestRateRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Collateral branch
    pub branch_id: u32,
    /// Position
    pub trove_id: TroveId,
    /// New annual interest rate (18 decimals)
    pub annual_interest_rate: Amount,
    /// Upper bound on the upfront fee
    pub max_upfront_fee: Amount,
    /// Sorted list insertion hint
    #[serde(default)]
    pub upper_hint: TroveId,
    /// Sorted list insertion hint
    #[serde(default)]
    pub lower_hint: TroveId,
}

/// Open a leveraged borrow position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLeveragePositionRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Collateral branch
    pub branch_id: u32,
    /// Owner index
    pub owner_index: u64,
    /// Collateral supplied by the user
    pub coll_amount: Amount,
    /// Collateral flash loaned and added to the position
    pub flash_loan_amount: Amount,
    /// Stablecoin borrowed to repay the flash loan
    pub bold_amount: Amount,
    /// Annual interest rate (18 decimals)
    pub annual_interest_rate: Amount,
    /// Upper bound on the upfront fee
    pub max_upfront_fee: Amount,
}

/// Deposit into or withdraw from a stability pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnPositionRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Collateral branch whose pool is used
    pub branch_id: u32,
    /// Stablecoin amount
    pub amount: Amount,
    /// Claim pending rewards in the same transaction
    #[serde(default)]
    pub claim_rewards: bool,
}

/// Operations addressing a whole collateral branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Collateral branch
    pub branch_id: u32,
}

/// Stake governance tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeDepositRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Amount staked
    pub amount: Amount,
}

/// Unstake governance tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeWithdrawRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Amount unstaked
    pub amount: Amount,
}

/// Claim staking rewards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeClaimRewardsRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
}

/// Redeem stablecoins against every collateral branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemCollateralRequest {
    /// Common fields
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Stablecoin redeemed
    pub amount: Amount,
    /// Upper bound on troves visited per branch
    pub max_iterations_per_collateral: u32,
    /// Upper bound on the redemption fee (18 decimals, 1e18 = 100%)
    pub max_fee_percentage: Amount,
}

/// Request of a flow, tagged by `flowId`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flowId", rename_all = "camelCase")]
pub enum FlowRequest {
    /// Open a borrow position
    OpenBorrowPosition(OpenBorrowPositionRequest),
    /// Adjust a borrow position
    UpdateBorrowPosition(UpdateBorrowPositionRequest),
    /// Close a borrow position
    CloseLoanPosition(CloseLoanPositionRequest),
    /// Change interest rate
    UpdateLoanInterestRate(UpdateLoanInterestRateRequest),
    /// Open a leveraged position
    OpenLeveragePosition(OpenLeveragePositionRequest),
    /// Stability pool deposit
    EarnDeposit(EarnPositionRequest),
    /// Stability pool withdrawal
    EarnWithdraw(EarnPositionRequest),
    /// Stability pool rewards
    EarnClaimRewards(BranchRequest),
    /// Stake
    StakeDeposit(StakeDepositRequest),
    /// Unstake
    StakeWithdraw(StakeWithdrawRequest),
    /// Staking rewards
    StakeClaimRewards(StakeClaimRewardsRequest),
    /// Redemption
    RedeemCollateral(RedeemCollateralRequest),
    /// Collateral surplus
    ClaimCollateralSurplus(BranchRequest),
}

impl FlowRequest {
    /// Flow kind of this request
    pub fn flow_id(&self) -> FlowId {
        match self {
            FlowRequest::OpenBorrowPosition(_) => FlowId::OpenBorrowPosition,
            FlowRequest::UpdateBorrowPosition(_) => FlowId::UpdateBorrowPosition,
            FlowRequest::CloseLoanPosition(_) => FlowId::CloseLoanPosition,
            FlowRequest::UpdateLoanInterestRate(_) => FlowId::UpdateLoanInterestRate,
            FlowRequest::OpenLeveragePosition(_) => FlowId::OpenLeveragePosition,
            FlowRequest::EarnDeposit(_) => FlowId::EarnDeposit,
            FlowRequest::EarnWithdraw(_) => FlowId::EarnWithdraw,
            FlowRequest::EarnClaimRewards(_) => FlowId::EarnClaimRewards,
            FlowRequest::StakeDeposit(_) => FlowId::StakeDeposit,
            FlowRequest::StakeWithdraw(_) => FlowId::StakeWithdraw,
            FlowRequest::StakeClaimRewards(_) => FlowId::StakeClaimRewards,
            FlowRequest::RedeemCollateral(_) => FlowId::RedeemCollateral,
            FlowRequest::ClaimCollateralSurplus(_) => FlowId::ClaimCollateralSurplus,
        }
    }

    /// Common fields
    pub fn meta(&self) -> &RequestMeta {
        match self {
            FlowRequest::OpenBorrowPosition(r) => &r.meta,
            FlowRequest::UpdateBorrowPosition(r) => &r.meta,
            FlowRequest::CloseLoanPosition(r) => &r.meta,
            FlowRequest::UpdateLoanInterestRate(r) => &r.meta,
            FlowRequest::OpenLeveragePosition(r) => &r.meta,
            FlowRequest::EarnDeposit(r) | FlowRequest::EarnWithdraw(r) => &r.meta,
            FlowRequest::EarnClaimRewards(r) | FlowRequest::ClaimCollateralSurplus(r) => &r.meta,
            FlowRequest::StakeDeposit(r) => &r.meta,
            FlowRequest::StakeWithdraw(r) => &r.meta,
            FlowRequest::StakeClaimRewards(r) => &r.meta,
            FlowRequest::RedeemCollateral(r) => &r.meta,
        }
    }

    /// Collateral branch the request targets, if any
    pub fn branch_id(&self) -> Option<u32> {
        match self {
            FlowRequest::OpenBorrowPosition(r) => Some(r.branch_id),
            FlowRequest::UpdateBorrowPosition(r) => Some(r.branch_id),
            FlowRequest::CloseLoanPosition(r) => Some(r.branch_id),
            FlowRequest::UpdateLoanInterestRate(r) => Some(r.branch_id),
            FlowRequest::OpenLeveragePosition(r) => Some(r.branch_id),
            FlowRequest::EarnDeposit(r) | FlowRequest::EarnWithdraw(r) => Some(r.branch_id),
            FlowRequest::EarnClaimRewards(r) | FlowRequest::ClaimCollateralSurplus(r) => {
                Some(r.branch_id)
            }
            FlowRequest::StakeDeposit(_)
            | FlowRequest::StakeWithdraw(_)
            | FlowRequest::StakeClaimRewards(_)
            | FlowRequest::RedeemCollateral(_) => None,
        }
    }

    /// Parse and validate an untyped request of the `expected` kind
    ///
    /// The tag is checked before the payload so a request for another flow reports a mismatch
    /// instead of a confusing field error.
    pub fn parse_as(expected: FlowId, raw: &Value) -> Result<Self, ValidationError> {
        let found = Self::raw_flow_id(raw)?;
        if found != expected {
            return Err(ValidationError::FlowMismatch {
                expected,
                found: found.to_string(),
            });
        }

        let request: FlowRequest = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        request.validate()?;

        Ok(request)
    }

    /// Read the `flowId` tag of an untyped request
    pub fn raw_flow_id(raw: &Value) -> Result<FlowId, ValidationError> {
        let tag = raw
            .get("flowId")
            .ok_or(ValidationError::MissingFlowId)?
            .as_str()
            .ok_or(ValidationError::MissingFlowId)?;
        tag.parse()
    }
}
