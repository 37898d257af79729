// memory.rs — In-memory ledger store used for tests, demos and embedding.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::LedgerError;
use crate::model::{
    ChatIdentity, Goal, GoalId, GoalStatus, GroupId, GroupMember, NewGoal, Transaction, User,
    UserId, Vote, VoteCount, DEFAULT_STARTING_BALANCE,
};
use crate::penalty::PenaltyPlan;
use crate::state::LedgerState;
use crate::store::LedgerStore;

/// A [`LedgerStore`] that keeps everything behind one `RwLock`.
pub struct MemoryStore {
    starting_balance: i64,
    inner: RwLock<LedgerState>,
}

impl MemoryStore {
    pub fn new(starting_balance: i64) -> Self {
        Self {
            starting_balance,
            inner: RwLock::new(LedgerState::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.inner.read().map_err(|_| LedgerError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, LedgerError> {
        self.inner.write().map_err(|_| LedgerError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_STARTING_BALANCE)
    }
}

impl LedgerStore for MemoryStore {
    fn get_or_create_user(
        &self,
        identity: ChatIdentity,
        display_name: &str,
    ) -> Result<User, LedgerError> {
        Ok(self.write()?.get_or_create_user(
            identity,
            display_name,
            self.starting_balance,
            Utc::now(),
        ))
    }

    fn user(&self, user_id: UserId) -> Result<User, LedgerError> {
        self.read()?.user(user_id)
    }

    fn find_user(&self, identity: ChatIdentity) -> Result<Option<User>, LedgerError> {
        Ok(self.read()?.find_user(identity))
    }

    fn adjust_balance(&self, user_id: UserId, delta: i64) -> Result<User, LedgerError> {
        self.write()?.adjust_balance(user_id, delta, Utc::now())
    }

    fn create_goal(&self, goal: NewGoal) -> Result<Goal, LedgerError> {
        self.write()?.create_goal(goal, Utc::now())
    }

    fn goal(&self, goal_id: GoalId) -> Result<Goal, LedgerError> {
        self.read()?.goal(goal_id)
    }

    fn transition_goal(
        &self,
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
    ) -> Result<Goal, LedgerError> {
        self.write()?.transition_goal(goal_id, from, to)
    }

    fn record_proof(&self, goal_id: GoalId, proof: &str) -> Result<Goal, LedgerError> {
        self.write()?.record_proof(goal_id, proof, Utc::now())
    }

    fn active_goals_for_owner(&self, owner: UserId) -> Result<Vec<Goal>, LedgerError> {
        Ok(self.read()?.active_goals_for_owner(owner))
    }

    fn active_goals_for_group(&self, group: GroupId) -> Result<Vec<Goal>, LedgerError> {
        Ok(self.read()?.active_goals_for_group(group))
    }

    fn upsert_vote(
        &self,
        goal_id: GoalId,
        voter: UserId,
        approve: bool,
    ) -> Result<(), LedgerError> {
        self.write()?.upsert_vote(goal_id, voter, approve, Utc::now())
    }

    fn count_votes(&self, goal_id: GoalId) -> Result<VoteCount, LedgerError> {
        Ok(self.read()?.count_votes(goal_id))
    }

    fn votes(&self, goal_id: GoalId) -> Result<Vec<Vote>, LedgerError> {
        Ok(self.read()?.votes(goal_id))
    }

    fn record_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.write()?.record_transaction(transaction)
    }

    fn transactions_for_goal(&self, goal_id: GoalId) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.read()?.transactions_for_goal(goal_id))
    }

    fn add_group_member(
        &self,
        group: GroupId,
        user_id: UserId,
    ) -> Result<GroupMember, LedgerError> {
        self.write()?.add_group_member(group, user_id, Utc::now())
    }

    fn group_members(&self, group: GroupId) -> Result<Vec<GroupMember>, LedgerError> {
        Ok(self.read()?.group_members(group))
    }

    fn settle_penalty(&self, plan: &PenaltyPlan) -> Result<Goal, LedgerError> {
        self.write()?.settle_penalty(plan, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionReason;
    use chrono::Duration;

    const GROUP: GroupId = GroupId(-1001);

    fn new_goal(owner: UserId, stake: i64) -> NewGoal {
        NewGoal {
            owner,
            group: GROUP,
            title: "Ship the release".into(),
            description: "Tag and publish".into(),
            deadline: Utc::now() + Duration::days(7),
            stake,
        }
    }

    fn pending_goal(store: &MemoryStore, owner: UserId, stake: i64) -> Goal {
        let goal = store.create_goal(new_goal(owner, stake)).unwrap();
        store.record_proof(goal.goal_id, "screenshot").unwrap()
    }

    #[test]
    fn first_contact_grants_starting_balance() {
        let store = MemoryStore::default();
        let user = store.get_or_create_user(ChatIdentity(42), "alice").unwrap();
        assert_eq!(user.balance, 100);

        let again = store.get_or_create_user(ChatIdentity(42), "renamed").unwrap();
        assert_eq!(again.user_id, user.user_id);
        assert_eq!(again.display_name, "alice");
    }

    #[test]
    fn create_goal_checks_live_balance_without_debiting() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();

        let goal = store.create_goal(new_goal(owner.user_id, 30)).unwrap();
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(store.user(owner.user_id).unwrap().balance, 100);

        let too_much = store.create_goal(new_goal(owner.user_id, 101));
        assert!(matches!(
            too_much,
            Err(LedgerError::InsufficientBalance { balance: 100, required: 101, .. })
        ));
    }

    #[test]
    fn record_proof_is_a_compare_and_swap() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let goal = store.create_goal(new_goal(owner.user_id, 10)).unwrap();

        let pending = store.record_proof(goal.goal_id, "photo").unwrap();
        assert_eq!(pending.status, GoalStatus::DonePending);
        assert_eq!(pending.proof.as_deref(), Some("photo"));
        assert!(pending.voting_started_at.is_some());

        let again = store.record_proof(goal.goal_id, "second photo");
        assert!(matches!(again, Err(LedgerError::StatusMismatch { .. })));
        assert_eq!(
            store.goal(goal.goal_id).unwrap().proof.as_deref(),
            Some("photo")
        );
    }

    #[test]
    fn terminal_status_never_regresses() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let goal = pending_goal(&store, owner.user_id, 10);

        store
            .transition_goal(goal.goal_id, GoalStatus::DonePending, GoalStatus::Success)
            .unwrap();
        let back = store.transition_goal(goal.goal_id, GoalStatus::Success, GoalStatus::Active);
        assert!(matches!(back, Err(LedgerError::InvalidTransition { .. })));
        let fail = store.transition_goal(goal.goal_id, GoalStatus::DonePending, GoalStatus::Failed);
        assert!(matches!(fail, Err(LedgerError::StatusMismatch { .. })));
    }

    #[test]
    fn repeat_vote_overwrites() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let voter = store.get_or_create_user(ChatIdentity(2), "voter").unwrap();
        let goal = pending_goal(&store, owner.user_id, 10);

        store.upsert_vote(goal.goal_id, voter.user_id, true).unwrap();
        store.upsert_vote(goal.goal_id, voter.user_id, false).unwrap();

        assert_eq!(
            store.count_votes(goal.goal_id).unwrap(),
            VoteCount { yes: 0, no: 1 }
        );
        assert_eq!(store.votes(goal.goal_id).unwrap().len(), 1);
    }

    #[test]
    fn votes_rejected_outside_done_pending() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let voter = store.get_or_create_user(ChatIdentity(2), "voter").unwrap();
        let goal = store.create_goal(new_goal(owner.user_id, 10)).unwrap();

        let result = store.upsert_vote(goal.goal_id, voter.user_id, true);
        assert!(matches!(result, Err(LedgerError::StatusMismatch { .. })));
        assert_eq!(store.count_votes(goal.goal_id).unwrap(), VoteCount::default());
    }

    #[test]
    fn membership_is_idempotent_and_ordered() {
        let store = MemoryStore::default();
        let a = store.get_or_create_user(ChatIdentity(1), "a").unwrap();
        let b = store.get_or_create_user(ChatIdentity(2), "b").unwrap();

        let first = store.add_group_member(GROUP, b.user_id).unwrap();
        store.add_group_member(GROUP, a.user_id).unwrap();
        let again = store.add_group_member(GROUP, b.user_id).unwrap();
        assert_eq!(first.seq, again.seq);

        let members = store.group_members(GROUP).unwrap();
        let order: Vec<UserId> = members.iter().map(|m| m.user_id).collect();
        assert_eq!(order, vec![b.user_id, a.user_id]);
        assert!(store.group_members(GroupId(5)).unwrap().is_empty());
    }

    #[test]
    fn settle_penalty_moves_exact_stake() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        store.add_group_member(GROUP, owner.user_id).unwrap();
        for i in 2..=5 {
            let u = store.get_or_create_user(ChatIdentity(i), "member").unwrap();
            store.add_group_member(GROUP, u.user_id).unwrap();
        }
        let goal = pending_goal(&store, owner.user_id, 30);

        let plan = PenaltyPlan::for_goal(&goal, &store.group_members(GROUP).unwrap()).unwrap();
        let failed = store.settle_penalty(&plan).unwrap();
        assert_eq!(failed.status, GoalStatus::Failed);
        assert_eq!(store.user(owner.user_id).unwrap().balance, 70);

        let txs = store.transactions_for_goal(goal.goal_id).unwrap();
        assert_eq!(txs.len(), 4);
        assert!(txs
            .iter()
            .all(|t| t.reason == TransactionReason::PenaltyDistribution));
        assert_eq!(txs.iter().map(|t| t.amount).sum::<i64>(), 30);

        // A second settlement of the same goal is refused and changes nothing.
        let again = store.settle_penalty(&plan);
        assert!(matches!(again, Err(LedgerError::StatusMismatch { .. })));
        assert_eq!(store.user(owner.user_id).unwrap().balance, 70);
        assert_eq!(store.transactions_for_goal(goal.goal_id).unwrap().len(), 4);
    }

    #[test]
    fn settle_penalty_allows_negative_owner_balance() {
        let store = MemoryStore::new(10);
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let other = store.get_or_create_user(ChatIdentity(2), "other").unwrap();
        store.add_group_member(GROUP, owner.user_id).unwrap();
        store.add_group_member(GROUP, other.user_id).unwrap();
        let goal = pending_goal(&store, owner.user_id, 10);
        store.adjust_balance(owner.user_id, -8).unwrap();

        let plan = PenaltyPlan::for_goal(&goal, &store.group_members(GROUP).unwrap()).unwrap();
        store.settle_penalty(&plan).unwrap();
        assert_eq!(store.user(owner.user_id).unwrap().balance, -8);
        assert_eq!(store.user(other.user_id).unwrap().balance, 20);
    }

    #[test]
    fn settle_penalty_with_unknown_recipient_applies_nothing() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let goal = pending_goal(&store, owner.user_id, 20);

        let plan = PenaltyPlan {
            goal_id: goal.goal_id,
            owner: owner.user_id,
            stake: 20,
            shares: vec![crate::penalty::PenaltyShare {
                recipient: UserId::new(),
                amount: 20,
            }],
        };
        assert!(matches!(
            store.settle_penalty(&plan),
            Err(LedgerError::UserNotFound(_))
        ));
        assert_eq!(store.goal(goal.goal_id).unwrap().status, GoalStatus::DonePending);
        assert_eq!(store.user(owner.user_id).unwrap().balance, 100);
        assert!(store.transactions_for_goal(goal.goal_id).unwrap().is_empty());
    }

    #[test]
    fn settle_penalty_rejects_plan_that_loses_credits() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let other = store.get_or_create_user(ChatIdentity(2), "other").unwrap();
        let goal = pending_goal(&store, owner.user_id, 20);

        let plan = PenaltyPlan {
            goal_id: goal.goal_id,
            owner: owner.user_id,
            stake: 20,
            shares: vec![crate::penalty::PenaltyShare {
                recipient: other.user_id,
                amount: 19,
            }],
        };
        assert!(matches!(
            store.settle_penalty(&plan),
            Err(LedgerError::PlanMismatch { .. })
        ));
        assert_eq!(store.user(other.user_id).unwrap().balance, 100);
    }

    #[test]
    fn admin_grant_is_recorded() {
        let store = MemoryStore::default();
        let user = store.get_or_create_user(ChatIdentity(9), "user").unwrap();
        let updated = store.adjust_balance(user.user_id, 25).unwrap();
        assert_eq!(updated.balance, 125);
        assert!(matches!(
            store.adjust_balance(UserId::new(), 5),
            Err(LedgerError::UserNotFound(_))
        ));
    }

    #[test]
    fn open_goal_queries_filter_and_sort() {
        let store = MemoryStore::default();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let mut later = new_goal(owner.user_id, 5);
        later.deadline = Utc::now() + Duration::days(30);
        let later = store.create_goal(later).unwrap();
        let sooner = store.create_goal(new_goal(owner.user_id, 5)).unwrap();
        let done = pending_goal(&store, owner.user_id, 5);
        store
            .transition_goal(done.goal_id, GoalStatus::DonePending, GoalStatus::Success)
            .unwrap();

        let mine = store.active_goals_for_owner(owner.user_id).unwrap();
        let ids: Vec<GoalId> = mine.iter().map(|g| g.goal_id).collect();
        assert_eq!(ids, vec![sooner.goal_id, later.goal_id]);

        assert_eq!(store.active_goals_for_group(GROUP).unwrap().len(), 2);
        assert!(store.active_goals_for_group(GroupId(3)).unwrap().is_empty());
    }
}
