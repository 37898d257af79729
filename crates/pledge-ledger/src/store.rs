// store.rs — The storage boundary the engine depends on.
//
// Every mutating call is a single conditional operation: a status
// compare-and-swap, a balance check fused with the insert it guards, or the
// whole penalty settlement. Callers never read-then-write across two calls
// to make a decision that the store could have made atomically.

use crate::error::LedgerError;
use crate::model::{
    ChatIdentity, Goal, GoalId, GoalStatus, GroupId, GroupMember, NewGoal, Transaction, User,
    UserId, Vote, VoteCount,
};
use crate::penalty::PenaltyPlan;

/// Persistent store for users, goals, votes, transactions and memberships.
pub trait LedgerStore: Send + Sync {
    /// Look a user up by chat identity, creating them with the starting
    /// balance on first contact.
    fn get_or_create_user(
        &self,
        identity: ChatIdentity,
        display_name: &str,
    ) -> Result<User, LedgerError>;

    fn user(&self, user_id: UserId) -> Result<User, LedgerError>;

    fn find_user(&self, identity: ChatIdentity) -> Result<Option<User>, LedgerError>;

    /// Administrative balance change. Recorded as an `AdminGrant` transaction.
    fn adjust_balance(&self, user_id: UserId, delta: i64) -> Result<User, LedgerError>;

    /// Insert an `Active` goal if the owner's current balance covers the stake.
    fn create_goal(&self, goal: NewGoal) -> Result<Goal, LedgerError>;

    fn goal(&self, goal_id: GoalId) -> Result<Goal, LedgerError>;

    /// Move a goal from `from` to `to`, failing if it is not currently `from`.
    fn transition_goal(
        &self,
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
    ) -> Result<Goal, LedgerError>;

    /// Store the proof and move `Active → DonePending`, stamping the voting start.
    fn record_proof(&self, goal_id: GoalId, proof: &str) -> Result<Goal, LedgerError>;

    /// Open goals of one owner, earliest deadline first.
    fn active_goals_for_owner(&self, owner: UserId) -> Result<Vec<Goal>, LedgerError>;

    /// Open goals of one group, newest first.
    fn active_goals_for_group(&self, group: GroupId) -> Result<Vec<Goal>, LedgerError>;

    /// Insert or overwrite the voter's decision. Only `DonePending` goals
    /// accept votes.
    fn upsert_vote(&self, goal_id: GoalId, voter: UserId, approve: bool)
        -> Result<(), LedgerError>;

    fn count_votes(&self, goal_id: GoalId) -> Result<VoteCount, LedgerError>;

    fn votes(&self, goal_id: GoalId) -> Result<Vec<Vote>, LedgerError>;

    fn record_transaction(&self, transaction: Transaction) -> Result<(), LedgerError>;

    fn transactions_for_goal(&self, goal_id: GoalId) -> Result<Vec<Transaction>, LedgerError>;

    /// Idempotent: re-adding an existing member keeps their first seq.
    fn add_group_member(&self, group: GroupId, user_id: UserId)
        -> Result<GroupMember, LedgerError>;

    /// Members of `group` in join order.
    fn group_members(&self, group: GroupId) -> Result<Vec<GroupMember>, LedgerError>;

    /// Apply a penalty plan as one unit: debit the owner, credit every
    /// recipient, append the transactions and move the goal
    /// `DonePending → Failed`. On error nothing is applied.
    fn settle_penalty(&self, plan: &PenaltyPlan) -> Result<Goal, LedgerError>;
}
