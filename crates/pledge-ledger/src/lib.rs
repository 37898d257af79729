//! # pledge-ledger
//!
//! Balances, goals, votes and the penalty distribution ledger for Pledge.
//!
//! The engine in `pledge-goal` talks to storage only through the
//! [`LedgerStore`] trait. Two implementations ship here:
//!
//! - [`MemoryStore`] — everything behind one `RwLock`, for tests and embedding
//! - [`JsonFileStore`] — one JSON document, replaced atomically on every write
//!
//! [`PenaltyPlan`] computes the integer-exact split of a failed goal's stake;
//! [`LedgerStore::settle_penalty`] applies it as a single unit.

pub mod error;
pub mod file;
pub mod memory;
pub mod model;
pub mod penalty;
mod state;
pub mod store;

pub use error::LedgerError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use model::{
    ChatIdentity, Goal, GoalId, GoalStatus, GroupId, GroupMember, NewGoal, Transaction,
    TransactionReason, User, UserId, Vote, VoteCount, DEFAULT_STARTING_BALANCE,
};
pub use penalty::{split_stake, PenaltyPlan, PenaltyShare};
pub use store::LedgerStore;
