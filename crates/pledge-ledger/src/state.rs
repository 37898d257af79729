// state.rs — The ledger document shared by every store implementation.
//
// `LedgerState` holds the whole ledger and implements each store operation
// as a method on `&mut self`. A store wraps it in a lock and decides how to
// persist it; because every method validates before it writes, an error
// return always leaves the state untouched.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{
    ChatIdentity, Goal, GoalId, GoalStatus, GroupId, GroupMember, NewGoal, Transaction,
    TransactionReason, User, UserId, Vote, VoteCount,
};
use crate::penalty::PenaltyPlan;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    users: BTreeMap<UserId, User>,
    identities: BTreeMap<ChatIdentity, UserId>,
    goals: BTreeMap<GoalId, Goal>,
    votes: Vec<Vote>,
    transactions: Vec<Transaction>,
    members: Vec<GroupMember>,
    next_member_seq: u64,
}

impl LedgerState {
    pub(crate) fn get_or_create_user(
        &mut self,
        identity: ChatIdentity,
        display_name: &str,
        starting_balance: i64,
        now: DateTime<Utc>,
    ) -> User {
        if let Some(user) = self.find_user(identity) {
            return user;
        }
        let user = User {
            user_id: UserId::new(),
            identity,
            display_name: display_name.to_string(),
            balance: starting_balance,
            created_at: now,
        };
        self.identities.insert(identity, user.user_id);
        self.users.insert(user.user_id, user.clone());
        tracing::debug!(user_id = %user.user_id, %identity, "registered user");
        user
    }

    pub(crate) fn user(&self, user_id: UserId) -> Result<User, LedgerError> {
        self.users
            .get(&user_id)
            .cloned()
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub(crate) fn find_user(&self, identity: ChatIdentity) -> Option<User> {
        self.identities
            .get(&identity)
            .and_then(|id| self.users.get(id))
            .cloned()
    }

    pub(crate) fn adjust_balance(
        &mut self,
        user_id: UserId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<User, LedgerError> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))?;
        user.balance = user
            .balance
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow(user_id))?;
        let updated = user.clone();
        self.transactions.push(Transaction {
            from: None,
            to: user_id,
            amount: delta,
            reason: TransactionReason::AdminGrant,
            goal_id: None,
            created_at: now,
        });
        Ok(updated)
    }

    pub(crate) fn create_goal(
        &mut self,
        new_goal: NewGoal,
        now: DateTime<Utc>,
    ) -> Result<Goal, LedgerError> {
        let owner = self.user(new_goal.owner)?;
        if owner.balance < new_goal.stake {
            return Err(LedgerError::InsufficientBalance {
                user_id: owner.user_id,
                balance: owner.balance,
                required: new_goal.stake,
            });
        }
        let goal = new_goal.into_goal(now);
        self.goals.insert(goal.goal_id, goal.clone());
        Ok(goal)
    }

    pub(crate) fn goal(&self, goal_id: GoalId) -> Result<Goal, LedgerError> {
        self.goals
            .get(&goal_id)
            .cloned()
            .ok_or(LedgerError::GoalNotFound(goal_id))
    }

    /// Validate a CAS without applying it.
    fn check_transition(
        &self,
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
    ) -> Result<(), LedgerError> {
        let goal = self
            .goals
            .get(&goal_id)
            .ok_or(LedgerError::GoalNotFound(goal_id))?;
        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition { goal_id, from, to });
        }
        if goal.status != from {
            return Err(LedgerError::StatusMismatch {
                goal_id,
                expected: from,
                actual: goal.status,
            });
        }
        Ok(())
    }

    pub(crate) fn transition_goal(
        &mut self,
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
    ) -> Result<Goal, LedgerError> {
        self.check_transition(goal_id, from, to)?;
        let goal = self
            .goals
            .get_mut(&goal_id)
            .ok_or(LedgerError::GoalNotFound(goal_id))?;
        goal.status = to;
        Ok(goal.clone())
    }

    pub(crate) fn record_proof(
        &mut self,
        goal_id: GoalId,
        proof: &str,
        now: DateTime<Utc>,
    ) -> Result<Goal, LedgerError> {
        self.check_transition(goal_id, GoalStatus::Active, GoalStatus::DonePending)?;
        let goal = self
            .goals
            .get_mut(&goal_id)
            .ok_or(LedgerError::GoalNotFound(goal_id))?;
        goal.proof = Some(proof.to_string());
        goal.status = GoalStatus::DonePending;
        goal.voting_started_at = Some(now);
        Ok(goal.clone())
    }

    pub(crate) fn active_goals_for_owner(&self, owner: UserId) -> Vec<Goal> {
        let mut goals: Vec<Goal> = self
            .goals
            .values()
            .filter(|g| g.owner == owner && g.status.is_open())
            .cloned()
            .collect();
        goals.sort_by(|a, b| a.deadline.cmp(&b.deadline));
        goals
    }

    pub(crate) fn active_goals_for_group(&self, group: GroupId) -> Vec<Goal> {
        let mut goals: Vec<Goal> = self
            .goals
            .values()
            .filter(|g| g.group == group && g.status.is_open())
            .cloned()
            .collect();
        goals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        goals
    }

    pub(crate) fn upsert_vote(
        &mut self,
        goal_id: GoalId,
        voter: UserId,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let goal = self.goal(goal_id)?;
        if goal.status != GoalStatus::DonePending {
            return Err(LedgerError::StatusMismatch {
                goal_id,
                expected: GoalStatus::DonePending,
                actual: goal.status,
            });
        }
        self.user(voter)?;

        match self
            .votes
            .iter_mut()
            .find(|v| v.goal_id == goal_id && v.voter == voter)
        {
            Some(existing) => {
                existing.approve = approve;
                existing.cast_at = now;
            }
            None => self.votes.push(Vote {
                goal_id,
                voter,
                approve,
                cast_at: now,
            }),
        }
        Ok(())
    }

    pub(crate) fn votes(&self, goal_id: GoalId) -> Vec<Vote> {
        self.votes
            .iter()
            .filter(|v| v.goal_id == goal_id)
            .cloned()
            .collect()
    }

    pub(crate) fn count_votes(&self, goal_id: GoalId) -> VoteCount {
        self.votes
            .iter()
            .filter(|v| v.goal_id == goal_id)
            .fold(VoteCount::default(), |mut count, v| {
                if v.approve {
                    count.yes += 1;
                } else {
                    count.no += 1;
                }
                count
            })
    }

    pub(crate) fn record_transaction(&mut self, transaction: Transaction) -> Result<(), LedgerError> {
        if let Some(from) = transaction.from {
            self.user(from)?;
        }
        self.user(transaction.to)?;
        self.transactions.push(transaction);
        Ok(())
    }

    pub(crate) fn transactions_for_goal(&self, goal_id: GoalId) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|t| t.goal_id == Some(goal_id))
            .cloned()
            .collect()
    }

    pub(crate) fn add_group_member(
        &mut self,
        group: GroupId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<GroupMember, LedgerError> {
        self.user(user_id)?;
        if let Some(existing) = self
            .members
            .iter()
            .find(|m| m.group == group && m.user_id == user_id)
        {
            return Ok(existing.clone());
        }
        let member = GroupMember {
            group,
            user_id,
            seq: self.next_member_seq,
            joined_at: now,
        };
        self.next_member_seq += 1;
        self.members.push(member.clone());
        Ok(member)
    }

    pub(crate) fn group_members(&self, group: GroupId) -> Vec<GroupMember> {
        let mut members: Vec<GroupMember> = self
            .members
            .iter()
            .filter(|m| m.group == group)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.seq);
        members
    }

    pub(crate) fn settle_penalty(
        &mut self,
        plan: &PenaltyPlan,
        now: DateTime<Utc>,
    ) -> Result<Goal, LedgerError> {
        let goal_id = plan.goal_id;
        self.check_transition(goal_id, GoalStatus::DonePending, GoalStatus::Failed)?;
        let goal = self.goal(goal_id)?;

        if plan.owner != goal.owner || plan.stake != goal.stake {
            return Err(LedgerError::PlanMismatch {
                goal_id,
                reason: "owner or stake differs from the stored goal".into(),
            });
        }
        if plan.total() != goal.stake {
            return Err(LedgerError::PlanMismatch {
                goal_id,
                reason: format!("shares sum to {}, stake is {}", plan.total(), goal.stake),
            });
        }
        if plan.shares.iter().any(|s| s.recipient == goal.owner) {
            return Err(LedgerError::PlanMismatch {
                goal_id,
                reason: "owner listed as a recipient".into(),
            });
        }

        // Compute every new balance before touching anything.
        let mut balances: HashMap<UserId, i64> = HashMap::new();
        let owner = self.user(goal.owner)?;
        let debited = owner
            .balance
            .checked_sub(goal.stake)
            .ok_or(LedgerError::BalanceOverflow(owner.user_id))?;
        balances.insert(owner.user_id, debited);
        for share in &plan.shares {
            let current = match balances.get(&share.recipient) {
                Some(balance) => *balance,
                None => self.user(share.recipient)?.balance,
            };
            let credited = current
                .checked_add(share.amount)
                .ok_or(LedgerError::BalanceOverflow(share.recipient))?;
            balances.insert(share.recipient, credited);
        }

        for (user_id, balance) in balances {
            if let Some(user) = self.users.get_mut(&user_id) {
                user.balance = balance;
            }
        }
        for share in &plan.shares {
            self.transactions.push(Transaction {
                from: Some(goal.owner),
                to: share.recipient,
                amount: share.amount,
                reason: TransactionReason::PenaltyDistribution,
                goal_id: Some(goal_id),
                created_at: now,
            });
        }
        self.transition_goal(goal_id, GoalStatus::DonePending, GoalStatus::Failed)
    }
}
