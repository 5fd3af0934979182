//! Campaign lifecycle state machine.
//!
//! ```text
//!            Schedule            Activate
//!   Draft ─────────────▶ Scheduled ─────────┐
//!     │                                      ▼
//!     └──────────── Launch ────────────▶ Running ──Complete──▶ Completed
//!                                        │    ▲
//!                                   Pause│    │Launch
//!                                        ▼    │
//!                                        Paused
//! ```
//!
//! Transitions here are pure. Materializing recipients, quota checks and
//! timestamps live in the dispatch crate's lifecycle service.

use core::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::{model::CampaignStatus, traits::fsm::FiniteStateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CampaignAction {
    Schedule,
    Launch,
    /// A scheduled campaign whose start time has arrived
    Activate,
    Pause,
    /// Issued by the dispatch engine when no pending work remains
    Complete,
}

impl Display for CampaignAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Schedule => "schedule",
            Self::Launch => "launch",
            Self::Activate => "activate",
            Self::Pause => "pause",
            Self::Complete => "complete",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Cannot {action} a campaign that is {current}")]
    Conflict {
        current: CampaignStatus,
        action: CampaignAction,
    },
}

impl FiniteStateMachine for CampaignStatus {
    type Input = CampaignAction;
    type Error = LifecycleError;

    fn transition(self, input: Self::Input) -> Result<Self, Self::Error> {
        match (self, input) {
            (Self::Draft, CampaignAction::Schedule) => Ok(Self::Scheduled),
            (Self::Draft | Self::Paused, CampaignAction::Launch)
            | (Self::Scheduled, CampaignAction::Activate) => Ok(Self::Running),
            (Self::Running, CampaignAction::Pause) => Ok(Self::Paused),
            (Self::Running, CampaignAction::Complete) => Ok(Self::Completed),
            (current, action) => Err(LifecycleError::Conflict { current, action }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_legal_transitions() {
        let cases = [
            (CampaignStatus::Draft, CampaignAction::Schedule, CampaignStatus::Scheduled),
            (CampaignStatus::Draft, CampaignAction::Launch, CampaignStatus::Running),
            (CampaignStatus::Paused, CampaignAction::Launch, CampaignStatus::Running),
            (CampaignStatus::Scheduled, CampaignAction::Activate, CampaignStatus::Running),
            (CampaignStatus::Running, CampaignAction::Pause, CampaignStatus::Paused),
            (CampaignStatus::Running, CampaignAction::Complete, CampaignStatus::Completed),
        ];

        for (from, action, to) in cases {
            assert_eq!(from.transition(action), Ok(to), "{from} --{action}-->");
        }
    }

    #[test]
    fn test_pause_on_draft_names_current_status() {
        let err = CampaignStatus::Draft
            .transition(CampaignAction::Pause)
            .unwrap_err();

        assert_eq!(
            err,
            LifecycleError::Conflict {
                current: CampaignStatus::Draft,
                action: CampaignAction::Pause,
            }
        );
        assert_eq!(err.to_string(), "Cannot pause a campaign that is draft");
    }

    #[test]
    fn test_completed_is_terminal() {
        for action in [
            CampaignAction::Schedule,
            CampaignAction::Launch,
            CampaignAction::Activate,
            CampaignAction::Pause,
            CampaignAction::Complete,
        ] {
            assert!(CampaignStatus::Completed.transition(action).is_err());
        }
    }

    #[test]
    fn test_launch_is_not_allowed_while_running_or_scheduled() {
        assert!(CampaignStatus::Running.transition(CampaignAction::Launch).is_err());
        assert!(CampaignStatus::Scheduled.transition(CampaignAction::Launch).is_err());
    }
}
