// lifecycle.rs — GoalEngine: goal creation, proof intake and queries.
//
// The engine owns no goal state of its own. Every decision that depends on
// stored state (balance covers stake, goal is still active) is made inside
// a single store call, so concurrent engines sharing one store cannot
// interleave a check with someone else's write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pledge_ledger::{
    ChatIdentity, Goal, GoalId, GoalStatus, GroupId, LedgerError, LedgerStore, NewGoal, User,
    UserId,
};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::error::EngineError;
use crate::events::{EventDispatcher, PledgeEvent};

/// Balance and open-goal summary for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub display_name: String,
    pub balance: i64,
    pub active_goals: usize,
}

/// Entry point for every goal operation.
pub struct GoalEngine<S> {
    store: Arc<S>,
    events: EventDispatcher,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore> GoalEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            events: EventDispatcher::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn emit(&self, event: PledgeEvent) {
        self.events.dispatch(&event);
    }

    /// Get-or-create the user behind `identity` and record that they are
    /// part of `group`. The transport calls this for every inbound message.
    pub fn register_member(
        &self,
        identity: ChatIdentity,
        display_name: &str,
        group: GroupId,
    ) -> Result<User, EngineError> {
        let user = self.store.get_or_create_user(identity, display_name)?;
        self.store.add_group_member(group, user.user_id)?;
        Ok(user)
    }

    /// Commit a goal. The balance is checked, not debited.
    pub fn create_goal(&self, new_goal: NewGoal) -> Result<Goal, EngineError> {
        if new_goal.title.trim().is_empty() {
            return Err(EngineError::EmptyText("title"));
        }
        if new_goal.description.trim().is_empty() {
            return Err(EngineError::EmptyText("description"));
        }
        if new_goal.stake <= 0 {
            return Err(EngineError::InvalidStake(new_goal.stake.to_string()));
        }

        let goal = self.store.create_goal(new_goal).map_err(|e| {
            if let LedgerError::InsufficientBalance { .. } = e {
                tracing::warn!("goal rejected: {}", e);
            }
            EngineError::from(e)
        })?;

        tracing::info!(
            goal_id = %goal.goal_id,
            owner = %goal.owner,
            group = %goal.group,
            stake = goal.stake,
            "goal created"
        );
        self.emit(PledgeEvent::goal_created(&goal));
        Ok(goal)
    }

    /// Attach a proof to an active goal and open voting.
    pub fn submit_proof(&self, goal_id: GoalId, proof: &str) -> Result<Goal, EngineError> {
        let proof = proof.trim();
        if proof.is_empty() {
            return Err(EngineError::EmptyText("proof"));
        }

        let goal = self.store.goal(goal_id)?;
        if goal.status != GoalStatus::Active {
            return Err(EngineError::InvalidState {
                goal_id,
                status: goal.status,
                operation: "submit proof for",
            });
        }

        let goal = self
            .store
            .record_proof(goal_id, proof)
            .map_err(|e| state_error(e, "submit proof for"))?;

        tracing::info!(goal_id = %goal.goal_id, "proof submitted, voting open");
        self.emit(PledgeEvent::proof_submitted(&goal));
        Ok(goal)
    }

    pub fn goal(&self, goal_id: GoalId) -> Result<Goal, EngineError> {
        Ok(self.store.goal(goal_id)?)
    }

    /// Goals of `owner` that are active or awaiting votes, earliest deadline first.
    pub fn active_goals_for_owner(&self, owner: UserId) -> Result<Vec<Goal>, EngineError> {
        Ok(self.store.active_goals_for_owner(owner)?)
    }

    /// Goals of `group` that are active or awaiting votes, newest first.
    pub fn active_goals_for_group(&self, group: GroupId) -> Result<Vec<Goal>, EngineError> {
        Ok(self.store.active_goals_for_group(group)?)
    }

    pub fn user_stats(&self, user_id: UserId) -> Result<UserStats, EngineError> {
        let user = self.store.user(user_id)?;
        let active_goals = self.store.active_goals_for_owner(user_id)?.len();
        Ok(UserStats {
            user_id,
            display_name: user.display_name,
            balance: user.balance,
            active_goals,
        })
    }

    /// Administrative credit (or debit, for a negative amount).
    pub fn grant_credits(&self, user_id: UserId, amount: i64) -> Result<User, EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidStake(amount.to_string()));
        }
        let user = self.store.adjust_balance(user_id, amount)?;
        tracing::info!(user_id = %user_id, amount, balance = user.balance, "credits granted");
        self.emit(PledgeEvent::CreditsGranted {
            user_id,
            amount,
            balance: user.balance,
            timestamp: Utc::now(),
        });
        Ok(user)
    }
}

/// Map a lost compare-and-swap to `InvalidState` for `operation`.
pub(crate) fn state_error(err: LedgerError, operation: &'static str) -> EngineError {
    match err {
        LedgerError::StatusMismatch { goal_id, actual, .. } => EngineError::InvalidState {
            goal_id,
            status: actual,
            operation,
        },
        other => EngineError::from(other),
    }
}
