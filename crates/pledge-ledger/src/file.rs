// file.rs — JsonFileStore: the whole ledger in one JSON document.
//
// Each mutation runs against a copy of the current state. The copy is
// written to `<file>.tmp` and renamed over the ledger file; only then does
// it replace the in-memory state. A failed write therefore leaves both the
// file and memory as they were, which is what makes `settle_penalty` atomic
// on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::error::LedgerError;
use crate::model::{
    ChatIdentity, Goal, GoalId, GoalStatus, GroupId, GroupMember, NewGoal, Transaction, User,
    UserId, Vote, VoteCount,
};
use crate::penalty::PenaltyPlan;
use crate::state::LedgerState;
use crate::store::LedgerStore;

/// File-backed [`LedgerStore`].
pub struct JsonFileStore {
    path: PathBuf,
    starting_balance: i64,
    state: Mutex<LedgerState>,
}

impl JsonFileStore {
    /// Open the ledger at `path`, creating parent directories as needed.
    /// A missing file is an empty ledger.
    pub fn open(path: impl AsRef<Path>, starting_balance: i64) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LedgerError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let state = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|source| LedgerError::IoError {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&json)?
        } else {
            LedgerState::default()
        };

        tracing::debug!(path = %path.display(), "opened ledger file");
        Ok(Self {
            path,
            starting_balance,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Apply `f` to a draft of the state and publish it once it is on disk.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut LedgerState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut guard = self.lock()?;
        let mut draft = guard.clone();
        let value = f(&mut draft)?;
        self.persist(&draft)?;
        *guard = draft;
        Ok(value)
    }

    fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| LedgerError::IoError {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| LedgerError::IoError {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}

impl LedgerStore for JsonFileStore {
    fn get_or_create_user(
        &self,
        identity: ChatIdentity,
        display_name: &str,
    ) -> Result<User, LedgerError> {
        if let Some(user) = self.lock()?.find_user(identity) {
            return Ok(user);
        }
        let starting_balance = self.starting_balance;
        self.mutate(|state| {
            Ok(state.get_or_create_user(identity, display_name, starting_balance, Utc::now()))
        })
    }

    fn user(&self, user_id: UserId) -> Result<User, LedgerError> {
        self.lock()?.user(user_id)
    }

    fn find_user(&self, identity: ChatIdentity) -> Result<Option<User>, LedgerError> {
        Ok(self.lock()?.find_user(identity))
    }

    fn adjust_balance(&self, user_id: UserId, delta: i64) -> Result<User, LedgerError> {
        self.mutate(|state| state.adjust_balance(user_id, delta, Utc::now()))
    }

    fn create_goal(&self, goal: NewGoal) -> Result<Goal, LedgerError> {
        self.mutate(|state| state.create_goal(goal, Utc::now()))
    }

    fn goal(&self, goal_id: GoalId) -> Result<Goal, LedgerError> {
        self.lock()?.goal(goal_id)
    }

    fn transition_goal(
        &self,
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
    ) -> Result<Goal, LedgerError> {
        self.mutate(|state| state.transition_goal(goal_id, from, to))
    }

    fn record_proof(&self, goal_id: GoalId, proof: &str) -> Result<Goal, LedgerError> {
        self.mutate(|state| state.record_proof(goal_id, proof, Utc::now()))
    }

    fn active_goals_for_owner(&self, owner: UserId) -> Result<Vec<Goal>, LedgerError> {
        Ok(self.lock()?.active_goals_for_owner(owner))
    }

    fn active_goals_for_group(&self, group: GroupId) -> Result<Vec<Goal>, LedgerError> {
        Ok(self.lock()?.active_goals_for_group(group))
    }

    fn upsert_vote(
        &self,
        goal_id: GoalId,
        voter: UserId,
        approve: bool,
    ) -> Result<(), LedgerError> {
        self.mutate(|state| state.upsert_vote(goal_id, voter, approve, Utc::now()))
    }

    fn count_votes(&self, goal_id: GoalId) -> Result<VoteCount, LedgerError> {
        Ok(self.lock()?.count_votes(goal_id))
    }

    fn votes(&self, goal_id: GoalId) -> Result<Vec<Vote>, LedgerError> {
        Ok(self.lock()?.votes(goal_id))
    }

    fn record_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.mutate(|state| state.record_transaction(transaction))
    }

    fn transactions_for_goal(&self, goal_id: GoalId) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.lock()?.transactions_for_goal(goal_id))
    }

    fn add_group_member(
        &self,
        group: GroupId,
        user_id: UserId,
    ) -> Result<GroupMember, LedgerError> {
        self.mutate(|state| state.add_group_member(group, user_id, Utc::now()))
    }

    fn group_members(&self, group: GroupId) -> Result<Vec<GroupMember>, LedgerError> {
        Ok(self.lock()?.group_members(group))
    }

    fn settle_penalty(&self, plan: &PenaltyPlan) -> Result<Goal, LedgerError> {
        self.mutate(|state| state.settle_penalty(plan, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    const GROUP: GroupId = GroupId(77);

    fn new_goal(owner: UserId, stake: i64) -> NewGoal {
        NewGoal {
            owner,
            group: GROUP,
            title: "Learn to juggle".into(),
            description: "Three balls, one minute".into(),
            deadline: Utc::now() + Duration::days(3),
            stake,
        }
    }

    #[test]
    fn ledger_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("ledger.json");

        let (owner_id, goal_id) = {
            let store = JsonFileStore::open(&path, 100).unwrap();
            let owner = store.get_or_create_user(ChatIdentity(11), "owner").unwrap();
            store.add_group_member(GROUP, owner.user_id).unwrap();
            let goal = store.create_goal(new_goal(owner.user_id, 40)).unwrap();
            store.record_proof(goal.goal_id, "video link").unwrap();
            (owner.user_id, goal.goal_id)
        };

        let store = JsonFileStore::open(&path, 100).unwrap();
        let owner = store.find_user(ChatIdentity(11)).unwrap().unwrap();
        assert_eq!(owner.user_id, owner_id);
        let goal = store.goal(goal_id).unwrap();
        assert_eq!(goal.status, GoalStatus::DonePending);
        assert_eq!(goal.proof.as_deref(), Some("video link"));
        assert_eq!(store.group_members(GROUP).unwrap().len(), 1);
    }

    #[test]
    fn failed_operation_does_not_touch_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let store = JsonFileStore::open(&path, 100).unwrap();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let result = store.create_goal(new_goal(owner.user_id, 500));
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn settlement_is_persisted_as_one_unit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let goal_id = {
            let store = JsonFileStore::open(&path, 100).unwrap();
            let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
            let a = store.get_or_create_user(ChatIdentity(2), "a").unwrap();
            let b = store.get_or_create_user(ChatIdentity(3), "b").unwrap();
            for u in [&owner, &a, &b] {
                store.add_group_member(GROUP, u.user_id).unwrap();
            }
            let goal = store.create_goal(new_goal(owner.user_id, 25)).unwrap();
            let goal = store.record_proof(goal.goal_id, "proof").unwrap();
            let plan = PenaltyPlan::for_goal(&goal, &store.group_members(GROUP).unwrap()).unwrap();
            store.settle_penalty(&plan).unwrap();
            goal.goal_id
        };

        let store = JsonFileStore::open(&path, 100).unwrap();
        assert_eq!(store.goal(goal_id).unwrap().status, GoalStatus::Failed);
        let txs = store.transactions_for_goal(goal_id).unwrap();
        assert_eq!(txs.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![13, 12]);
        let a = store.find_user(ChatIdentity(2)).unwrap().unwrap();
        assert_eq!(a.balance, 113);
    }

    #[test]
    fn failed_write_during_settlement_changes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let store = JsonFileStore::open(&path, 100).unwrap();
        let owner = store.get_or_create_user(ChatIdentity(1), "owner").unwrap();
        let a = store.get_or_create_user(ChatIdentity(2), "a").unwrap();
        let b = store.get_or_create_user(ChatIdentity(3), "b").unwrap();
        for u in [&owner, &a, &b] {
            store.add_group_member(GROUP, u.user_id).unwrap();
        }
        let goal = store.create_goal(new_goal(owner.user_id, 30)).unwrap();
        let goal = store.record_proof(goal.goal_id, "proof").unwrap();
        let plan = PenaltyPlan::for_goal(&goal, &store.group_members(GROUP).unwrap()).unwrap();
        let on_disk = fs::read_to_string(&path).unwrap();

        // The temp file cannot be written while a directory sits in its place.
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(matches!(
            store.settle_penalty(&plan),
            Err(LedgerError::IoError { .. })
        ));

        assert_eq!(store.goal(goal.goal_id).unwrap().status, GoalStatus::DonePending);
        for (user, balance) in [(&owner, 100), (&a, 100), (&b, 100)] {
            assert_eq!(store.user(user.user_id).unwrap().balance, balance);
        }
        assert!(store.transactions_for_goal(goal.goal_id).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), on_disk);

        // Once the obstruction is gone the same plan settles.
        fs::remove_dir(path.with_extension("json.tmp")).unwrap();
        assert_eq!(store.settle_penalty(&plan).unwrap().status, GoalStatus::Failed);
        assert_eq!(store.user(owner.user_id).unwrap().balance, 70);
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path, 100),
            Err(LedgerError::SerializationError(_))
        ));
    }
}
