//! Step state transition rules

use crate::flow::StepStatus;

/// State transition Error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Step already in flight
    #[error("Step is already in flight ({0})")]
    InFlight(StepStatus),
    /// Step already confirmed
    #[error("Step already confirmed")]
    AlreadyConfirmed,
    /// Invalid transition
    #[error("Invalid transition: From {0} to {1}")]
    InvalidTransition(StepStatus, StepStatus),
}

#[inline]
/// Check if the step status transition is allowed
///
/// Valid transitions:
/// - Idle -> AwaitingCommit
/// - Error -> AwaitingCommit
/// - AwaitingCommit -> AwaitingVerify, Error
/// - AwaitingVerify -> Confirmed, Error
/// - Confirmed -> (no transitions allowed)
///
/// The `AwaitingCommit -> Idle` normalization done while restoring a persisted flow is not an
/// ordinary transition and is not accepted here.
pub fn check_step_transition(current: StepStatus, new: StepStatus) -> Result<(), Error> {
    let is_valid_transition = match current {
        StepStatus::Idle | StepStatus::Error => matches!(new, StepStatus::AwaitingCommit),
        StepStatus::AwaitingCommit => {
            matches!(new, StepStatus::AwaitingVerify | StepStatus::Error)
        }
        StepStatus::AwaitingVerify => matches!(new, StepStatus::Confirmed | StepStatus::Error),
        StepStatus::Confirmed => false,
    };

    if !is_valid_transition {
        Err(match (current, new) {
            (StepStatus::Confirmed, _) => Error::AlreadyConfirmed,
            (StepStatus::AwaitingCommit | StepStatus::AwaitingVerify, StepStatus::AwaitingCommit) => {
                Error::InFlight(current)
            }
            _ => Error::InvalidTransition(current, new),
        })
    } else {
        Ok(())
    }
}
