//! Flows
//!
//! A flow is one user initiated multi step operation (open a loan, stake, redeem, ...). The
//! persisted [`Flowstate`] records who owns the flow, the validated request that drives it and
//! the ordered steps with their lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;
use crate::state::{self, check_step_transition};
use crate::util::unix_time;

pub mod request;
pub mod validation;

pub use request::*;
pub use validation::{Validate, ValidationError};

/// Identifier of a flow kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowId {
    /// Open a new borrow position
    OpenBorrowPosition,
    /// Adjust collateral and/or debt of a borrow position
    UpdateBorrowPosition,
    /// Repay and close a borrow position
    CloseLoanPosition,
    /// Change the interest rate of a borrow position
    UpdateLoanInterestRate,
    /// Open a leveraged borrow position through a zapper
    OpenLeveragePosition,
    /// Deposit into a stability pool
    EarnDeposit,
    /// Withdraw from a stability pool
    EarnWithdraw,
    /// Claim stability pool rewards
    EarnClaimRewards,
    /// Stake governance tokens
    StakeDeposit,
    /// Unstake governance tokens
    StakeWithdraw,
    /// Claim staking rewards
    StakeClaimRewards,
    /// Redeem stablecoins for collateral
    RedeemCollateral,
    /// Claim collateral surplus left after a liquidation
    ClaimCollateralSurplus,
}

impl FlowId {
    /// Every known flow
    pub const ALL: [FlowId; 13] = [
        FlowId::OpenBorrowPosition,
        FlowId::UpdateBorrowPosition,
        FlowId::CloseLoanPosition,
        FlowId::UpdateLoanInterestRate,
        FlowId::OpenLeveragePosition,
        FlowId::EarnDeposit,
        FlowId::EarnWithdraw,
        FlowId::EarnClaimRewards,
        FlowId::StakeDeposit,
        FlowId::StakeWithdraw,
        FlowId::StakeClaimRewards,
        FlowId::RedeemCollateral,
        FlowId::ClaimCollateralSurplus,
    ];

    /// Wire name of the flow
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowId::OpenBorrowPosition => "openBorrowPosition",
            FlowId::UpdateBorrowPosition => "updateBorrowPosition",
            FlowId::CloseLoanPosition => "closeLoanPosition",
            FlowId::UpdateLoanInterestRate => "updateLoanInterestRate",
            FlowId::OpenLeveragePosition => "openLeveragePosition",
            FlowId::EarnDeposit => "earnDeposit",
            FlowId::EarnWithdraw => "earnWithdraw",
            FlowId::EarnClaimRewards => "earnClaimRewards",
            FlowId::StakeDeposit => "stakeDeposit",
            FlowId::StakeWithdraw => "stakeWithdraw",
            FlowId::StakeClaimRewards => "stakeClaimRewards",
            FlowId::RedeemCollateral => "redeemCollateral",
            FlowId::ClaimCollateralSurplus => "claimCollateralSurplus",
        }
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlowId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownFlow(s.to_string()))
    }
}

/// Lifecycle status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Not started, or reset after an interrupted signing request
    Idle,
    /// Waiting for the wallet to sign and broadcast
    AwaitingCommit,
    /// Broadcast, waiting for confirmation
    AwaitingVerify,
    /// Confirmed on chain
    Confirmed,
    /// Commit or verify failed
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Idle => "idle",
            StepStatus::AwaitingCommit => "awaiting-commit",
            StepStatus::AwaitingVerify => "awaiting-verify",
            StepStatus::Confirmed => "confirmed",
            StepStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One sign, broadcast and confirm unit of a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    /// Semantic step name (`approveToken`, `openTrove`, ...)
    pub id: String,
    /// Lifecycle status
    pub status: StepStatus,
    /// Transaction hash once broadcast
    pub artifact: Option<String>,
    /// Error message of the last failed attempt
    pub error: Option<String>,
    /// Identifier extracted from the confirmed receipt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl FlowStep {
    /// New idle step
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            status: StepStatus::Idle,
            artifact: None,
            error: None,
            output: None,
        }
    }

    /// Step is confirmed
    pub fn is_confirmed(&self) -> bool {
        self.status == StepStatus::Confirmed
    }

    /// Begin a commit attempt, clearing the previous attempt's artifact and error
    pub fn begin_commit(&mut self) -> Result<(), state::Error> {
        check_step_transition(self.status, StepStatus::AwaitingCommit)?;
        self.status = StepStatus::AwaitingCommit;
        self.artifact = None;
        self.error = None;
        self.output = None;
        Ok(())
    }

    /// Record the broadcast artifact
    pub fn await_verify(&mut self, artifact: String) -> Result<(), state::Error> {
        check_step_transition(self.status, StepStatus::AwaitingVerify)?;
        self.status = StepStatus::AwaitingVerify;
        self.artifact = Some(artifact);
        Ok(())
    }

    /// Mark the step confirmed
    pub fn confirm(&mut self, output: Option<String>) -> Result<(), state::Error> {
        check_step_transition(self.status, StepStatus::Confirmed)?;
        self.status = StepStatus::Confirmed;
        self.output = output;
        Ok(())
    }

    /// Mark the step failed. The artifact, if any, is kept.
    pub fn fail<S: Into<String>>(&mut self, message: S) -> Result<(), state::Error> {
        check_step_transition(self.status, StepStatus::Error)?;
        self.status = StepStatus::Error;
        self.error = Some(message.into());
        Ok(())
    }

    /// Reset a step frozen in `AwaitingCommit` to `Idle`
    ///
    /// Only used when a flow is recovered and no signing request can still be pending.
    /// Returns `true` if the step was reset.
    pub fn reset_stale_commit(&mut self) -> bool {
        if self.status == StepStatus::AwaitingCommit {
            self.status = StepStatus::Idle;
            self.artifact = None;
            self.error = None;
            true
        } else {
            false
        }
    }
}

/// The current flow: owner, request and step progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flowstate {
    /// Flow instance id
    pub id: Uuid,
    /// Owning account
    pub account: Address,
    /// Validated request
    pub request: FlowRequest,
    /// Steps, `None` until planned
    pub steps: Option<Vec<FlowStep>>,
    /// Creation time
    pub created_at: u64,
    /// Last update time
    pub updated_at: u64,
}

impl Flowstate {
    /// Create a new unplanned flow
    pub fn new(account: Address, request: FlowRequest) -> Self {
        let now = unix_time();
        Self {
            id: Uuid::new_v4(),
            account,
            request,
            steps: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Flow kind
    pub fn flow_id(&self) -> FlowId {
        self.request.flow_id()
    }

    /// Index of the first step not yet confirmed
    ///
    /// Equals the number of steps once every step is confirmed. `None` while steps are not
    /// planned.
    pub fn current_step_index(&self) -> Option<usize> {
        self.steps.as_ref().map(|steps| {
            steps
                .iter()
                .position(|step| !step.is_confirmed())
                .unwrap_or(steps.len())
        })
    }

    /// First step not yet confirmed
    pub fn current_step(&self) -> Option<&FlowStep> {
        let index = self.current_step_index()?;
        self.steps.as_ref().and_then(|steps| steps.get(index))
    }

    /// Every step is confirmed
    pub fn is_complete(&self) -> bool {
        match &self.steps {
            Some(steps) => steps.iter().all(FlowStep::is_confirmed),
            None => false,
        }
    }

    /// Bump `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = unix_time();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;

    fn stake_request() -> FlowRequest {
        FlowRequest::StakeDeposit(StakeDepositRequest {
            meta: RequestMeta::new("/stake", "Go to staking", "Staked"),
            amount: Amount::WAD,
        })
    }

    #[test]
    fn test_flow_id_names() {
        for id in FlowId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
            assert_eq!(FlowId::from_str(id.as_str()).unwrap(), id);
        }
        assert!(FlowId::from_str("borrow").is_err());
    }

    #[test]
    fn test_step_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&StepStatus::AwaitingCommit).unwrap(),
            "\"awaiting-commit\""
        );
        let status: StepStatus = serde_json::from_str("\"awaiting-verify\"").unwrap();
        assert_eq!(status, StepStatus::AwaitingVerify);
    }

    #[test]
    fn test_current_step_index() {
        let mut flow = Flowstate::new(Address::repeat_byte(1), stake_request());
        assert_eq!(flow.current_step_index(), None);
        assert!(flow.current_step().is_none());

        flow.steps = Some(vec![FlowStep::new("approveToken"), FlowStep::new("stakeDeposit")]);
        assert_eq!(flow.current_step_index(), Some(0));

        if let Some(steps) = flow.steps.as_mut() {
            steps[0].status = StepStatus::Confirmed;
        }
        assert_eq!(flow.current_step_index(), Some(1));
        assert_eq!(flow.current_step().map(|s| s.id.as_str()), Some("stakeDeposit"));

        if let Some(steps) = flow.steps.as_mut() {
            steps[1].status = StepStatus::Confirmed;
        }
        assert_eq!(flow.current_step_index(), Some(2));
        assert!(flow.current_step().is_none());
        assert!(flow.is_complete());
    }

    #[test]
    fn test_fail_keeps_artifact() {
        let mut step = FlowStep::new("stakeDeposit");
        step.begin_commit().unwrap();
        step.await_verify("0x222".to_string()).unwrap();
        step.fail("reverted").unwrap();
        assert_eq!(step.status, StepStatus::Error);
        assert_eq!(step.artifact.as_deref(), Some("0x222"));

        // Retrying starts from scratch
        step.begin_commit().unwrap();
        assert_eq!(step.artifact, None);
        assert_eq!(step.error, None);
    }

    #[test]
    fn test_begin_commit_rejects_in_flight() {
        let mut step = FlowStep::new("approveToken");
        step.begin_commit().unwrap();
        assert!(step.begin_commit().is_err());
        assert!(step.reset_stale_commit());
        assert_eq!(step.status, StepStatus::Idle);
        assert!(!step.reset_stale_commit());
    }
}
