//! # pledge-goal
//!
//! Goal lifecycle, voting and penalty resolution for Pledge, a group
//! accountability engine where members stake credits on their goals.
//!
//! A goal moves through a small state machine:
//!
//! ```text
//! active ──submit_proof──▶ done_pending ──finalize──▶ success
//!                                       └───────────▶ failed (stake split)
//! ```
//!
//! - [`GoalEngine`] — create goals, accept proofs, record votes, finalize
//! - [`DialogEngine`] — the per-user conversations that collect a goal or a proof
//! - [`PledgeEvent`] / [`EventDispatcher`] — lifecycle notifications
//! - [`PledgeConfig`] — `.pledge/config.toml`
//!
//! Storage lives behind [`pledge_ledger::LedgerStore`].

pub mod clock;
pub mod config;
pub mod deadline;
pub mod dialog;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod voting;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DialogConfig, EventsConfig, LedgerConfig, PledgeConfig};
pub use deadline::parse_deadline;
pub use dialog::{DialogEngine, DialogPrompt, DialogReply, DialogStates, DialogStep, Sender};
pub use error::EngineError;
pub use events::{EventDispatcher, LogSink, NotificationSink, PledgeEvent, SinkError};
pub use lifecycle::{GoalEngine, UserStats};
pub use voting::{required_votes, Decision, FinalizeOutcome, Tally};
