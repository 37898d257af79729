// penalty.rs — Splitting a failed goal's stake across the rest of the group.
//
// The split is integer-exact: every recipient gets `stake / n`, and the
// first `stake % n` recipients in join order get one extra credit. The same
// membership always yields the same plan, so a plan can be recomputed and
// compared when reconciling a goal.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{Goal, GoalId, GroupMember, UserId};

/// Credits one recipient receives from a penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyShare {
    pub recipient: UserId,
    pub amount: i64,
}

/// The full set of balance movements for one failed goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyPlan {
    pub goal_id: GoalId,
    pub owner: UserId,
    pub stake: i64,
    pub shares: Vec<PenaltyShare>,
}

impl PenaltyPlan {
    /// Build the plan for `goal` from its group's membership.
    ///
    /// Recipients are every member except the owner, ordered by join
    /// sequence. Fails with [`LedgerError::NoRecipients`] when nobody else
    /// is in the group.
    pub fn for_goal(goal: &Goal, members: &[GroupMember]) -> Result<Self, LedgerError> {
        let mut eligible: Vec<&GroupMember> = members
            .iter()
            .filter(|m| m.group == goal.group && m.user_id != goal.owner)
            .collect();
        eligible.sort_by_key(|m| m.seq);

        let mut seen = HashSet::new();
        let recipients: Vec<UserId> = eligible
            .iter()
            .map(|m| m.user_id)
            .filter(|u| seen.insert(*u))
            .collect();
        if recipients.is_empty() {
            return Err(LedgerError::NoRecipients(goal.goal_id));
        }

        Ok(Self {
            goal_id: goal.goal_id,
            owner: goal.owner,
            stake: goal.stake,
            shares: split_stake(goal.stake, &recipients),
        })
    }

    /// Sum of all shares. Always equals `stake`.
    pub fn total(&self) -> i64 {
        self.shares.iter().map(|s| s.amount).sum()
    }
}

/// Split `stake` across `recipients` in order, handing the remainder out one
/// credit at a time from the front. Returns an empty split for no recipients.
pub fn split_stake(stake: i64, recipients: &[UserId]) -> Vec<PenaltyShare> {
    if recipients.is_empty() {
        return Vec::new();
    }
    let n = recipients.len() as i64;
    let base = stake / n;
    let remainder = stake % n;

    recipients
        .iter()
        .enumerate()
        .map(|(i, recipient)| PenaltyShare {
            recipient: *recipient,
            amount: if (i as i64) < remainder { base + 1 } else { base },
        })
        .collect()
}
