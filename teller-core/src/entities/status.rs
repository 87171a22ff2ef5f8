//! Deposit status progression.
//!
//! A deposit record moves forward through a linear path determined by its
//! buy method; there are no back-edges. Same-status updates are always
//! allowed so fields can be mutated without advancing the machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected status change, reported without mutating the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: DepositStatus,
    pub to: DepositStatus,
}

/// Processing state of a deposit record.
///
/// `WaitDeposit` is the conceptual pre-creation state; persisted records
/// start at `WaitSend` (direct buy) or `WaitDecide` (passthrough).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositStatus {
    #[serde(rename = "waiting_deposit")]
    WaitDeposit,
    #[serde(rename = "waiting_decide")]
    WaitDecide,
    #[serde(rename = "waiting_passthrough")]
    WaitPassthrough,
    #[serde(rename = "waiting_passthrough_order_complete")]
    WaitPassthroughOrderComplete,
    #[serde(rename = "waiting_send")]
    WaitSend,
    #[serde(rename = "waiting_confirm")]
    WaitConfirm,
    #[serde(rename = "done")]
    Done,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::WaitDeposit => "waiting_deposit",
            DepositStatus::WaitDecide => "waiting_decide",
            DepositStatus::WaitPassthrough => "waiting_passthrough",
            DepositStatus::WaitPassthroughOrderComplete => "waiting_passthrough_order_complete",
            DepositStatus::WaitSend => "waiting_send",
            DepositStatus::WaitConfirm => "waiting_confirm",
            DepositStatus::Done => "done",
        }
    }

    /// Whether a record may move from `self` to `to`.
    pub fn can_transition_to(&self, to: DepositStatus) -> bool {
        use DepositStatus::*;

        if *self == to {
            return true;
        }

        matches!(
            (*self, to),
            (WaitDeposit, WaitSend)
                | (WaitDeposit, WaitDecide)
                | (WaitDecide, WaitPassthrough)
                | (WaitPassthrough, WaitPassthroughOrderComplete)
                | (WaitPassthroughOrderComplete, WaitSend)
                | (WaitSend, WaitConfirm)
                | (WaitConfirm, Done)
        )
    }

    /// Validate a transition, returning the offending pair on rejection.
    pub fn validate_transition(&self, to: DepositStatus) -> Result<(), InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(InvalidTransition { from: *self, to })
        }
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
