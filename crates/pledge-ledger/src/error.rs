// error.rs — Error types for the ledger store.

use thiserror::Error;

use crate::model::{GoalId, GoalStatus, UserId};

/// Errors that can occur while reading or mutating the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The requested user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// The requested goal does not exist.
    #[error("goal not found: {0}")]
    GoalNotFound(GoalId),

    /// A conditional insert found the owner's balance below the stake.
    #[error("insufficient balance for {user_id}: have {balance}, need {required}")]
    InsufficientBalance {
        user_id: UserId,
        balance: i64,
        required: i64,
    },

    /// A compare-and-swap found the goal in a different status.
    #[error("goal {goal_id} is {actual}, expected {expected}")]
    StatusMismatch {
        goal_id: GoalId,
        expected: GoalStatus,
        actual: GoalStatus,
    },

    /// The requested status change is not an edge of the lifecycle graph.
    #[error("invalid transition from {from} to {to} for goal {goal_id}")]
    InvalidTransition {
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
    },

    /// No group member other than the owner can receive the penalty.
    #[error("no recipients for the penalty of goal {0}")]
    NoRecipients(GoalId),

    /// A penalty plan does not match the goal it claims to settle.
    #[error("penalty plan does not match goal {goal_id}: {reason}")]
    PlanMismatch { goal_id: GoalId, reason: String },

    /// A balance update would overflow.
    #[error("balance overflow for user {0}")]
    BalanceOverflow(UserId),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize the ledger document.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A thread panicked while holding the store lock.
    #[error("ledger lock poisoned")]
    Poisoned,
}
