// model.rs — Users, goals, votes, transactions and group memberships.
//
// Goal lifecycle:
//   Active → DonePending → Success
//                        → Failed
//
// Success and Failed are terminal. There is no way back to Active once a
// proof has been submitted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Balance every user receives on first contact.
pub const DEFAULT_STARTING_BALANCE: i64 = 100;

/// Internal user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Goal identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for GoalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(GoalId)
    }
}

/// Identity of a participant as seen by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatIdentity(pub i64);

impl fmt::Display for ChatIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A chat or group in which goals are created and voted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A participant and their credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub identity: ChatIdentity,
    pub display_name: String,
    /// Can go negative after a penalty larger than the balance.
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Accepting a proof.
    Active,
    /// Proof submitted, votes being collected.
    DonePending,
    /// Confirmed by the group; the stake stays with the owner.
    Success,
    /// Rejected by the group; the stake was distributed.
    Failed,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStatus::Active => write!(f, "active"),
            GoalStatus::DonePending => write!(f, "done_pending"),
            GoalStatus::Success => write!(f, "success"),
            GoalStatus::Failed => write!(f, "failed"),
        }
    }
}

impl GoalStatus {
    /// Check whether moving from this status to `next` is allowed.
    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        matches!(
            (self, next),
            (GoalStatus::Active, GoalStatus::DonePending)
                | (GoalStatus::DonePending, GoalStatus::Success)
                | (GoalStatus::DonePending, GoalStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            GoalStatus::Success | GoalStatus::Failed => true,
            GoalStatus::Active | GoalStatus::DonePending => false,
        }
    }

    /// Active and awaiting-vote goals are the ones listed to users.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

/// A goal with credits at stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: GoalId,
    pub owner: UserId,
    pub group: GroupId,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    /// Fixed at creation.
    pub stake: i64,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

/// Parameters for a goal that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGoal {
    pub owner: UserId,
    pub group: GroupId,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub stake: i64,
}

impl NewGoal {
    pub(crate) fn into_goal(self, now: DateTime<Utc>) -> Goal {
        Goal {
            goal_id: GoalId::new(),
            owner: self.owner,
            group: self.group,
            title: self.title,
            description: self.description,
            deadline: self.deadline,
            stake: self.stake,
            status: GoalStatus::Active,
            created_at: now,
            voting_started_at: None,
            proof: None,
        }
    }
}

/// One voter's decision on a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub goal_id: GoalId,
    pub voter: UserId,
    pub approve: bool,
    pub cast_at: DateTime<Utc>,
}

/// Yes/no totals for one goal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub yes: u32,
    pub no: u32,
}

/// Why credits moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionReason {
    PenaltyDistribution,
    AdminGrant,
}

impl fmt::Display for TransactionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionReason::PenaltyDistribution => write!(f, "penalty_distribution"),
            TransactionReason::AdminGrant => write!(f, "admin_grant"),
        }
    }
}

/// An append-only record of a credit movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Absent for credits minted by an administrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    pub to: UserId,
    pub amount: i64,
    pub reason: TransactionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<GoalId>,
    pub created_at: DateTime<Utc>,
}

/// A user's membership in a group. `seq` orders members by join time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group: GroupId,
    pub user_id: UserId,
    pub seq: u64,
    pub joined_at: DateTime<Utc>,
}
