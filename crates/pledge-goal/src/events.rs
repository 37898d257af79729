// events.rs — Event model and notification dispatch.
//
// The engine emits an event at every lifecycle point. The chat transport
// subscribes to these to announce results (a new goal, a proof awaiting
// votes, the outcome of a vote); the always-on LogSink keeps a JSONL trail.
// Dispatch is synchronous, and a failing sink never fails the operation
// that emitted the event.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pledge_ledger::{Goal, GoalId, GroupId, PenaltyShare, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::voting::Tally;

/// Events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PledgeEvent {
    /// A goal was committed with its stake.
    GoalCreated {
        goal_id: GoalId,
        owner: UserId,
        group: GroupId,
        title: String,
        stake: i64,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A proof was submitted and voting opened.
    ProofSubmitted {
        goal_id: GoalId,
        owner: UserId,
        group: GroupId,
        proof: String,
        voting_started_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A vote was recorded (or overwritten).
    VoteCast {
        goal_id: GoalId,
        voter: UserId,
        approve: bool,
        timestamp: DateTime<Utc>,
    },

    /// The group confirmed the goal.
    GoalSucceeded {
        goal_id: GoalId,
        tally: Tally,
        timestamp: DateTime<Utc>,
    },

    /// The group rejected the goal and the stake was distributed.
    GoalFailed {
        goal_id: GoalId,
        tally: Tally,
        shares: Vec<PenaltyShare>,
        timestamp: DateTime<Utc>,
    },

    /// An administrator changed a balance.
    CreditsGranted {
        user_id: UserId,
        amount: i64,
        balance: i64,
        timestamp: DateTime<Utc>,
    },
}

impl PledgeEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            PledgeEvent::GoalCreated { .. } => "goal_created",
            PledgeEvent::ProofSubmitted { .. } => "proof_submitted",
            PledgeEvent::VoteCast { .. } => "vote_cast",
            PledgeEvent::GoalSucceeded { .. } => "goal_succeeded",
            PledgeEvent::GoalFailed { .. } => "goal_failed",
            PledgeEvent::CreditsGranted { .. } => "credits_granted",
        }
    }

    pub fn goal_created(goal: &Goal) -> Self {
        PledgeEvent::GoalCreated {
            goal_id: goal.goal_id,
            owner: goal.owner,
            group: goal.group,
            title: goal.title.clone(),
            stake: goal.stake,
            deadline: goal.deadline,
            timestamp: Utc::now(),
        }
    }

    pub fn proof_submitted(goal: &Goal) -> Self {
        let now = Utc::now();
        PledgeEvent::ProofSubmitted {
            goal_id: goal.goal_id,
            owner: goal.owner,
            group: goal.group,
            proof: goal.proof.clone().unwrap_or_default(),
            voting_started_at: goal.voting_started_at.unwrap_or(now),
            timestamp: now,
        }
    }
}

/// Failure inside a notification sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Trait for receiving engine events.
pub trait NotificationSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the engine.
    fn send(&self, event: &PledgeEvent) -> Result<(), SinkError>;
}

/// Appends events as JSONL to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl NotificationSink for LogSink {
    fn send(&self, event: &PledgeEvent) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| SinkError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Dispatches events to every registered sink.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&self, event: &PledgeEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(event = event.event_type(), "notification sink error: {}", e);
            }
        }
    }
}
