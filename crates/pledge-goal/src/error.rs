// error.rs — Error types for the goal engine.
//
// Validation failures (deadline, stake, blank text, self-vote) are raised
// before anything is written. Store failures are always propagated.

use pledge_ledger::{GoalId, GoalStatus, LedgerError, UserId};
use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The stake exceeds the owner's current balance.
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    /// The goal is not in the status the operation requires.
    #[error("cannot {operation} goal {goal_id} while it is {status}")]
    InvalidState {
        goal_id: GoalId,
        status: GoalStatus,
        operation: &'static str,
    },

    /// Owners cannot vote on their own goals.
    #[error("owner cannot vote on own goal {0}")]
    SelfVoteForbidden(GoalId),

    /// Only the owner can submit proof for a goal.
    #[error("goal {0} belongs to someone else")]
    NotGoalOwner(GoalId),

    /// Nobody besides the owner can receive the penalty. The goal is left
    /// awaiting votes.
    #[error("no group members to receive the penalty for goal {0}")]
    NoRecipients(GoalId),

    #[error("invalid deadline {0:?}: expected YYYY-MM-DD or a positive number of days")]
    InvalidDeadline(String),

    #[error("invalid stake {0:?}: expected a positive whole number")]
    InvalidStake(String),

    /// A required text field was blank.
    #[error("{0} cannot be empty")]
    EmptyText(&'static str),

    #[error("goal not found: {0}")]
    GoalNotFound(GoalId),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Penalty transactions exist for a goal that never reached `failed`.
    /// Needs manual reconciliation; never retried.
    #[error("goal {goal_id} has {transactions} penalty transactions but is still awaiting votes")]
    PartialSettlement { goal_id: GoalId, transactions: usize },

    /// Opaque backing-store failure.
    #[error("store failure: {0}")]
    Store(#[source] LedgerError),
}

impl EngineError {
    /// True for failures detected before any mutation, which the caller may
    /// retry with corrected input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidDeadline(_)
                | EngineError::InvalidStake(_)
                | EngineError::EmptyText(_)
                | EngineError::SelfVoteForbidden(_)
                | EngineError::InsufficientBalance { .. }
        )
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::GoalNotFound(id) => EngineError::GoalNotFound(id),
            LedgerError::UserNotFound(id) => EngineError::UserNotFound(id),
            LedgerError::InsufficientBalance {
                balance, required, ..
            } => EngineError::InsufficientBalance { balance, required },
            LedgerError::NoRecipients(id) => EngineError::NoRecipients(id),
            LedgerError::StatusMismatch {
                goal_id, actual, ..
            } => EngineError::InvalidState {
                goal_id,
                status: actual,
                operation: "update",
            },
            other => EngineError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_to_engine_kinds() {
        let id = GoalId::new();
        assert!(matches!(
            EngineError::from(LedgerError::GoalNotFound(id)),
            EngineError::GoalNotFound(g) if g == id
        ));
        assert!(matches!(
            EngineError::from(LedgerError::StatusMismatch {
                goal_id: id,
                expected: GoalStatus::DonePending,
                actual: GoalStatus::Success,
            }),
            EngineError::InvalidState { status: GoalStatus::Success, .. }
        ));
        assert!(matches!(
            EngineError::from(LedgerError::Poisoned),
            EngineError::Store(LedgerError::Poisoned)
        ));
    }

    #[test]
    fn validation_errors_are_flagged() {
        assert!(EngineError::InvalidStake("x".into()).is_validation());
        assert!(EngineError::SelfVoteForbidden(GoalId::new()).is_validation());
        assert!(!EngineError::NoRecipients(GoalId::new()).is_validation());
        assert!(!EngineError::Store(LedgerError::Poisoned).is_validation());
    }
}
