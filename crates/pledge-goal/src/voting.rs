// voting.rs — Vote intake and the running quorum check.
//
// Quorum rules, evaluated in order every time finalize runs:
//   1. yes >= required                       → success
//   2. no  >  total_voters - required        → failed (yes can no longer win)
//   3. otherwise                             → pending
// where total_voters is every group member except the owner and
// required = ceil(total_voters / 2).

use chrono::Utc;
use pledge_ledger::{
    Goal, GoalId, GoalStatus, GroupId, GroupMember, LedgerStore, PenaltyPlan, PenaltyShare,
    TransactionReason, UserId, VoteCount,
};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::events::PledgeEvent;
use crate::lifecycle::{state_error, GoalEngine};

/// Vote totals and the threshold they are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
    pub total_voters: u32,
    pub required: u32,
}

/// What the current votes decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Success,
    Failed,
    Pending,
}

impl Tally {
    pub fn new(count: VoteCount, total_voters: u32) -> Self {
        Self {
            yes: count.yes,
            no: count.no,
            total_voters,
            required: required_votes(total_voters),
        }
    }

    pub fn decide(&self) -> Decision {
        if self.yes >= self.required {
            return Decision::Success;
        }
        let outstanding = i64::from(self.total_voters) - i64::from(self.required);
        if i64::from(self.no) > outstanding {
            Decision::Failed
        } else {
            Decision::Pending
        }
    }
}

/// Majority threshold for `total_voters` eligible voters. With nobody else
/// in the group the threshold is zero and the goal succeeds.
pub fn required_votes(total_voters: u32) -> u32 {
    total_voters.div_ceil(2)
}

/// Result of a finalize call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The group confirmed the goal; no balance changed.
    Succeeded { goal: Goal, tally: Tally },
    /// The group rejected the goal; the stake was distributed.
    Failed {
        goal: Goal,
        tally: Tally,
        shares: Vec<PenaltyShare>,
    },
    /// Not decided yet.
    Pending { tally: Tally },
}

impl FinalizeOutcome {
    pub fn tally(&self) -> Tally {
        match self {
            FinalizeOutcome::Succeeded { tally, .. }
            | FinalizeOutcome::Failed { tally, .. }
            | FinalizeOutcome::Pending { tally } => *tally,
        }
    }
}

impl<S: LedgerStore> GoalEngine<S> {
    /// Record `voter`'s decision on a goal awaiting votes. Voting again
    /// replaces the earlier decision.
    pub fn cast_vote(
        &self,
        goal_id: GoalId,
        voter: UserId,
        approve: bool,
    ) -> Result<(), EngineError> {
        let goal = self.store().goal(goal_id)?;
        if goal.status != GoalStatus::DonePending {
            return Err(EngineError::InvalidState {
                goal_id,
                status: goal.status,
                operation: "vote on",
            });
        }
        if goal.owner == voter {
            tracing::warn!(goal_id = %goal_id, "owner tried to vote on own goal");
            return Err(EngineError::SelfVoteForbidden(goal_id));
        }

        // Voting is an interaction with the goal's group.
        self.store().add_group_member(goal.group, voter)?;
        self.store()
            .upsert_vote(goal_id, voter, approve)
            .map_err(|e| state_error(e, "vote on"))?;

        tracing::debug!(goal_id = %goal_id, voter = %voter, approve, "vote recorded");
        self.emit(PledgeEvent::VoteCast {
            goal_id,
            voter,
            approve,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Evaluate the quorum for a goal awaiting votes and resolve it if the
    /// outcome is already certain. Safe to call redundantly: `Pending` has
    /// no side effects, and a resolved goal yields `InvalidState`.
    pub fn finalize(
        &self,
        goal_id: GoalId,
        group: GroupId,
    ) -> Result<FinalizeOutcome, EngineError> {
        let goal = self.store().goal(goal_id)?;
        if goal.group != group {
            return Err(EngineError::GoalNotFound(goal_id));
        }
        if goal.status != GoalStatus::DonePending {
            return Err(EngineError::InvalidState {
                goal_id,
                status: goal.status,
                operation: "finalize",
            });
        }

        let members = self.store().group_members(group)?;
        let total_voters = members.iter().filter(|m| m.user_id != goal.owner).count() as u32;
        let tally = Tally::new(self.store().count_votes(goal_id)?, total_voters);
        tracing::debug!(goal_id = %goal_id, ?tally, "quorum check");

        match tally.decide() {
            Decision::Success => {
                let goal = self
                    .store()
                    .transition_goal(goal_id, GoalStatus::DonePending, GoalStatus::Success)
                    .map_err(|e| state_error(e, "finalize"))?;
                tracing::info!(
                    goal_id = %goal_id,
                    yes = tally.yes,
                    no = tally.no,
                    "goal succeeded"
                );
                self.emit(PledgeEvent::GoalSucceeded {
                    goal_id,
                    tally,
                    timestamp: Utc::now(),
                });
                Ok(FinalizeOutcome::Succeeded { goal, tally })
            }
            Decision::Failed => {
                let (goal, shares) = self.distribute_penalty(&goal, &members)?;
                tracing::info!(
                    goal_id = %goal_id,
                    yes = tally.yes,
                    no = tally.no,
                    stake = goal.stake,
                    recipients = shares.len(),
                    "goal failed, stake distributed"
                );
                self.emit(PledgeEvent::GoalFailed {
                    goal_id,
                    tally,
                    shares: shares.clone(),
                    timestamp: Utc::now(),
                });
                Ok(FinalizeOutcome::Failed {
                    goal,
                    tally,
                    shares,
                })
            }
            Decision::Pending => Ok(FinalizeOutcome::Pending { tally }),
        }
    }

    /// Cast a vote from inside `group` and immediately run the quorum
    /// check, as a vote button does. A goal from another group is reported
    /// as not found, so outsiders cannot join its voter pool. Returns `None`
    /// when the goal was resolved by someone else between the two steps.
    pub fn vote_and_finalize(
        &self,
        goal_id: GoalId,
        group: GroupId,
        voter: UserId,
        approve: bool,
    ) -> Result<Option<FinalizeOutcome>, EngineError> {
        if self.store().goal(goal_id)?.group != group {
            tracing::warn!(goal_id = %goal_id, group = %group, "vote from another group");
            return Err(EngineError::GoalNotFound(goal_id));
        }
        self.cast_vote(goal_id, voter, approve)?;
        match self.finalize(goal_id, group) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(EngineError::InvalidState { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Debit the owner and credit the rest of the group in one store call.
    fn distribute_penalty(
        &self,
        goal: &Goal,
        members: &[GroupMember],
    ) -> Result<(Goal, Vec<PenaltyShare>), EngineError> {
        // Penalty rows on a goal that never reached `failed` mean an earlier
        // settlement was partially applied by a non-atomic store.
        let prior = self
            .store()
            .transactions_for_goal(goal.goal_id)?
            .into_iter()
            .filter(|t| t.reason == TransactionReason::PenaltyDistribution)
            .count();
        if prior > 0 {
            // Settlement writes its rows and the status together, so rows
            // next to a resolved goal only mean another finalize won.
            let current = self.store().goal(goal.goal_id)?;
            if current.status != GoalStatus::DonePending {
                return Err(EngineError::InvalidState {
                    goal_id: goal.goal_id,
                    status: current.status,
                    operation: "finalize",
                });
            }
            tracing::error!(
                goal_id = %goal.goal_id,
                transactions = prior,
                "refusing to re-run penalty distribution"
            );
            return Err(EngineError::PartialSettlement {
                goal_id: goal.goal_id,
                transactions: prior,
            });
        }

        let plan = PenaltyPlan::for_goal(goal, members).map_err(|e| {
            tracing::warn!(goal_id = %goal.goal_id, "{}", e);
            EngineError::from(e)
        })?;
        let settled = self
            .store()
            .settle_penalty(&plan)
            .map_err(|e| state_error(e, "finalize"))?;
        Ok((settled, plan.shares))
    }
}
