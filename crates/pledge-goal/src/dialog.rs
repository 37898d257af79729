// dialog.rs — Per-user conversations that collect a goal or a proof.
//
// Goal dialog:   AwaitingTitle → AwaitingDescription → AwaitingDeadline
//                  → AwaitingStake → (goal committed, idle)
// Proof dialog:  AwaitingProof → (proof committed, idle)
//
// Idle is the absence of an entry. Invalid input keeps the current step and
// leaves the collected fields alone. Reaching the end of a dialog always
// returns the user to idle, whether the commit succeeded or not.
//
// Locking: `DialogStates` keeps an index of per-user slots. The index lock
// is held only to look up, insert or remove a slot; a step runs under the
// slot's own mutex, so two messages from one user are serialised while
// different users never wait on each other. The two locks are never held
// together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use pledge_ledger::{ChatIdentity, Goal, GoalId, GoalStatus, GroupId, LedgerStore, NewGoal};

use crate::config::DialogConfig;
use crate::deadline::parse_deadline;
use crate::error::EngineError;
use crate::lifecycle::GoalEngine;

/// Where a user is in a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogStep {
    AwaitingTitle,
    AwaitingDescription,
    AwaitingDeadline,
    AwaitingStake,
    AwaitingProof { goal_id: GoalId },
}

/// What the transport should ask the user for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogPrompt {
    Title,
    Description,
    Deadline,
    /// `balance` is `None` when it could not be read.
    Stake { balance: Option<i64> },
    Proof { goal_id: GoalId },
}

/// Result of feeding one message into the dialog engine.
#[derive(Debug)]
pub enum DialogReply {
    /// The user has no dialog in progress; route the message elsewhere.
    NotInDialog,
    /// Input accepted; ask for the next field.
    Next(DialogPrompt),
    /// Input rejected; ask for the same field again.
    Retry {
        prompt: DialogPrompt,
        error: EngineError,
    },
    GoalCreated(Goal),
    /// The goal could not be committed. The dialog has ended.
    GoalRejected(EngineError),
    ProofSubmitted(Goal),
    /// The proof could not be committed. The dialog has ended.
    ProofRejected(EngineError),
}

/// The sender of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub identity: ChatIdentity,
    pub display_name: String,
    pub group: GroupId,
}

#[derive(Debug, Clone)]
struct DialogState {
    step: DialogStep,
    title: Option<String>,
    description: Option<String>,
    deadline: Option<DateTime<Utc>>,
}

impl DialogState {
    fn at(step: DialogStep) -> Self {
        Self {
            step,
            title: None,
            description: None,
            deadline: None,
        }
    }
}

/// `None` once the dialog has ended, for messages that were already
/// waiting on the slot.
type Slot = Arc<Mutex<Option<DialogState>>>;

struct Entry {
    slot: Slot,
    touched_at: DateTime<Utc>,
}

/// In-memory, bounded store of dialogs keyed by chat identity.
pub struct DialogStates {
    entries: Mutex<HashMap<ChatIdentity, Entry>>,
    ttl: Duration,
    max_sessions: usize,
}

impl DialogStates {
    pub fn new(config: &DialogConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: config.ttl(),
            max_sessions: config.max_sessions.max(1),
        }
    }

    /// Number of tracked dialogs, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every dialog idle for longer than the TTL. Returns how many.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.index();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| now - e.touched_at <= ttl);
        before - entries.len()
    }

    fn index(&self) -> MutexGuard<'_, HashMap<ChatIdentity, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the live slot for `identity`, refreshing its TTL.
    fn slot(&self, identity: ChatIdentity, now: DateTime<Utc>) -> Option<Slot> {
        let mut entries = self.index();
        let expired = match entries.get(&identity) {
            None => return None,
            Some(entry) => now - entry.touched_at > self.ttl,
        };
        if expired {
            entries.remove(&identity);
            tracing::debug!(%identity, "dialog expired");
            return None;
        }
        entries.get_mut(&identity).map(|entry| {
            entry.touched_at = now;
            Arc::clone(&entry.slot)
        })
    }

    /// Start a dialog, replacing any existing one for `identity`.
    fn begin(&self, identity: ChatIdentity, state: DialogState, now: DateTime<Utc>) {
        let mut entries = self.index();
        if !entries.contains_key(&identity) && entries.len() >= self.max_sessions {
            let ttl = self.ttl;
            entries.retain(|_, e| now - e.touched_at <= ttl);
            if entries.len() >= self.max_sessions {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.touched_at)
                    .map(|(id, _)| *id);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    tracing::warn!(evicted = %oldest, "dialog capacity reached");
                }
            }
        }
        entries.insert(
            identity,
            Entry {
                slot: Arc::new(Mutex::new(Some(state))),
                touched_at: now,
            },
        );
    }

    /// Remove `identity`'s entry if it still holds `slot`.
    fn finish(&self, identity: ChatIdentity, slot: &Slot) {
        let mut entries = self.index();
        if entries
            .get(&identity)
            .is_some_and(|e| Arc::ptr_eq(&e.slot, slot))
        {
            entries.remove(&identity);
        }
    }

    /// Remove `identity`'s entry and mark its slot ended. The slot is
    /// locked only after the index guard is released.
    fn end(&self, identity: ChatIdentity) -> bool {
        let removed = self.index().remove(&identity);
        match removed {
            Some(entry) => {
                *lock_slot(&entry.slot) = None;
                true
            }
            None => false,
        }
    }
}

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<DialogState>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives the goal and proof dialogs on top of a [`GoalEngine`].
pub struct DialogEngine<S> {
    engine: Arc<GoalEngine<S>>,
    states: DialogStates,
}

impl<S: LedgerStore> DialogEngine<S> {
    pub fn new(engine: Arc<GoalEngine<S>>, config: &DialogConfig) -> Self {
        Self {
            engine,
            states: DialogStates::new(config),
        }
    }

    pub fn engine(&self) -> &GoalEngine<S> {
        &self.engine
    }

    pub fn states(&self) -> &DialogStates {
        &self.states
    }

    /// Begin collecting a new goal.
    pub fn start_goal(&self, identity: ChatIdentity) -> DialogPrompt {
        let now = self.engine.now();
        self.states
            .begin(identity, DialogState::at(DialogStep::AwaitingTitle), now);
        tracing::debug!(%identity, "goal dialog started");
        DialogPrompt::Title
    }

    /// Begin collecting a proof for one of the sender's active goals.
    pub fn start_proof(
        &self,
        sender: &Sender,
        goal_id: GoalId,
    ) -> Result<DialogPrompt, EngineError> {
        let goal = self.engine.goal(goal_id)?;
        let user = self
            .engine
            .store()
            .get_or_create_user(sender.identity, &sender.display_name)?;
        if goal.owner != user.user_id {
            return Err(EngineError::NotGoalOwner(goal_id));
        }
        if goal.status != GoalStatus::Active {
            return Err(EngineError::InvalidState {
                goal_id,
                status: goal.status,
                operation: "submit proof for",
            });
        }

        let now = self.engine.now();
        self.states.begin(
            sender.identity,
            DialogState::at(DialogStep::AwaitingProof { goal_id }),
            now,
        );
        Ok(DialogPrompt::Proof { goal_id })
    }

    /// Abandon whatever dialog `identity` has open. Returns whether one existed.
    pub fn cancel(&self, identity: ChatIdentity) -> bool {
        let cancelled = self.states.end(identity);
        if cancelled {
            tracing::debug!(%identity, "dialog cancelled");
        }
        cancelled
    }

    /// The current step, or `None` when idle.
    pub fn step(&self, identity: ChatIdentity) -> Option<DialogStep> {
        let slot = self.states.slot(identity, self.engine.now())?;
        let guard = lock_slot(&slot);
        guard.as_ref().map(|s| s.step)
    }

    pub fn is_active(&self, identity: ChatIdentity) -> bool {
        self.step(identity).is_some()
    }

    /// Feed one free-text message into the sender's dialog.
    pub fn handle_text(&self, sender: &Sender, text: &str) -> DialogReply {
        let now = self.engine.now();
        let Some(slot) = self.states.slot(sender.identity, now) else {
            return DialogReply::NotInDialog;
        };
        let mut guard = lock_slot(&slot);
        let Some(state) = guard.as_mut() else {
            return DialogReply::NotInDialog;
        };

        let reply = self.advance(sender, state, text, now);
        if matches!(
            reply,
            DialogReply::GoalCreated(_)
                | DialogReply::GoalRejected(_)
                | DialogReply::ProofSubmitted(_)
                | DialogReply::ProofRejected(_)
        ) {
            *guard = None;
            // Never hold a slot while taking the index lock.
            drop(guard);
            self.states.finish(sender.identity, &slot);
        }
        reply
    }

    fn advance(
        &self,
        sender: &Sender,
        state: &mut DialogState,
        text: &str,
        now: DateTime<Utc>,
    ) -> DialogReply {
        let text = text.trim();
        match state.step {
            DialogStep::AwaitingTitle => {
                if text.is_empty() {
                    return DialogReply::Retry {
                        prompt: DialogPrompt::Title,
                        error: EngineError::EmptyText("title"),
                    };
                }
                state.title = Some(text.to_string());
                state.step = DialogStep::AwaitingDescription;
                DialogReply::Next(DialogPrompt::Description)
            }
            DialogStep::AwaitingDescription => {
                if text.is_empty() {
                    return DialogReply::Retry {
                        prompt: DialogPrompt::Description,
                        error: EngineError::EmptyText("description"),
                    };
                }
                state.description = Some(text.to_string());
                state.step = DialogStep::AwaitingDeadline;
                DialogReply::Next(DialogPrompt::Deadline)
            }
            DialogStep::AwaitingDeadline => match parse_deadline(text, now) {
                Ok(deadline) => {
                    state.deadline = Some(deadline);
                    state.step = DialogStep::AwaitingStake;
                    DialogReply::Next(DialogPrompt::Stake {
                        balance: self.live_balance(sender),
                    })
                }
                Err(error) => DialogReply::Retry {
                    prompt: DialogPrompt::Deadline,
                    error,
                },
            },
            DialogStep::AwaitingStake => self.commit_goal(sender, state, text),
            DialogStep::AwaitingProof { goal_id } => {
                if text.is_empty() {
                    return DialogReply::Retry {
                        prompt: DialogPrompt::Proof { goal_id },
                        error: EngineError::EmptyText("proof"),
                    };
                }
                match self.engine.submit_proof(goal_id, text) {
                    Ok(goal) => DialogReply::ProofSubmitted(goal),
                    Err(e) => DialogReply::ProofRejected(e),
                }
            }
        }
    }

    fn commit_goal(&self, sender: &Sender, state: &DialogState, text: &str) -> DialogReply {
        let stake = match text.parse::<i64>() {
            Ok(stake) if stake > 0 => stake,
            _ => {
                return DialogReply::Retry {
                    prompt: DialogPrompt::Stake {
                        balance: self.live_balance(sender),
                    },
                    error: EngineError::InvalidStake(text.to_string()),
                }
            }
        };

        let owner = match self
            .engine
            .store()
            .get_or_create_user(sender.identity, &sender.display_name)
        {
            Ok(user) => user,
            Err(e) => return DialogReply::GoalRejected(e.into()),
        };
        if stake > owner.balance {
            return DialogReply::Retry {
                prompt: DialogPrompt::Stake {
                    balance: Some(owner.balance),
                },
                error: EngineError::InsufficientBalance {
                    balance: owner.balance,
                    required: stake,
                },
            };
        }

        let (Some(title), Some(description), Some(deadline)) =
            (&state.title, &state.description, state.deadline)
        else {
            return DialogReply::GoalRejected(EngineError::EmptyText("title"));
        };
        let new_goal = NewGoal {
            owner: owner.user_id,
            group: sender.group,
            title: title.clone(),
            description: description.clone(),
            deadline,
            stake,
        };
        match self.engine.create_goal(new_goal) {
            Ok(goal) => DialogReply::GoalCreated(goal),
            Err(e) => DialogReply::GoalRejected(e),
        }
    }

    fn live_balance(&self, sender: &Sender) -> Option<i64> {
        match self
            .engine
            .store()
            .get_or_create_user(sender.identity, &sender.display_name)
        {
            Ok(user) => Some(user.balance),
            Err(e) => {
                tracing::warn!(identity = %sender.identity, "could not read balance: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use chrono::TimeZone;
    use pledge_ledger::MemoryStore;

    const GROUP: GroupId = GroupId(-500);

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn setup(config: DialogConfig) -> (DialogEngine<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = GoalEngine::new(Arc::new(MemoryStore::default())).with_clock(clock.clone());
        (DialogEngine::new(Arc::new(engine), &config), clock)
    }

    fn sender(id: i64) -> Sender {
        Sender {
            identity: ChatIdentity(id),
            display_name: format!("user{id}"),
            group: GROUP,
        }
    }

    #[test]
    fn idle_user_is_not_in_dialog() {
        let (dialogs, _) = setup(DialogConfig::default());
        assert!(matches!(
            dialogs.handle_text(&sender(1), "hello"),
            DialogReply::NotInDialog
        ));
        assert_eq!(dialogs.step(ChatIdentity(1)), None);
    }

    #[test]
    fn full_goal_dialog_commits_and_returns_to_idle() {
        let (dialogs, _) = setup(DialogConfig::default());
        let me = sender(1);

        assert_eq!(dialogs.start_goal(me.identity), DialogPrompt::Title);
        assert!(matches!(
            dialogs.handle_text(&me, "Run a marathon"),
            DialogReply::Next(DialogPrompt::Description)
        ));
        assert!(matches!(
            dialogs.handle_text(&me, "Sub four hours"),
            DialogReply::Next(DialogPrompt::Deadline)
        ));
        assert!(matches!(
            dialogs.handle_text(&me, "30"),
            DialogReply::Next(DialogPrompt::Stake { balance: Some(100) })
        ));
        assert_eq!(dialogs.step(me.identity), Some(DialogStep::AwaitingStake));

        match dialogs.handle_text(&me, "25") {
            DialogReply::GoalCreated(goal) => {
                assert_eq!(goal.title, "Run a marathon");
                assert_eq!(goal.description, "Sub four hours");
                assert_eq!(goal.stake, 25);
                assert_eq!(goal.group, GROUP);
                assert_eq!(goal.deadline, start() + Duration::days(30));
            }
            other => panic!("expected GoalCreated, got {other:?}"),
        }
        assert_eq!(dialogs.step(me.identity), None);
        assert!(dialogs.states().is_empty());
    }

    #[test]
    fn invalid_input_reprompts_without_advancing() {
        let (dialogs, _) = setup(DialogConfig::default());
        let me = sender(1);
        dialogs.start_goal(me.identity);
        dialogs.handle_text(&me, "Title");
        dialogs.handle_text(&me, "Description");

        for bad in ["0", "-3", "abc", "2099-02-31"] {
            match dialogs.handle_text(&me, bad) {
                DialogReply::Retry {
                    prompt: DialogPrompt::Deadline,
                    error: EngineError::InvalidDeadline(_),
                } => {}
                other => panic!("expected deadline retry, got {other:?}"),
            }
            assert_eq!(dialogs.step(me.identity), Some(DialogStep::AwaitingDeadline));
        }

        dialogs.handle_text(&me, "2099-01-01");
        for bad in ["zero", "0", "-10", "1.5"] {
            assert!(matches!(
                dialogs.handle_text(&me, bad),
                DialogReply::Retry {
                    error: EngineError::InvalidStake(_),
                    ..
                }
            ));
        }
        assert!(matches!(
            dialogs.handle_text(&me, "150"),
            DialogReply::Retry {
                prompt: DialogPrompt::Stake { balance: Some(100) },
                error: EngineError::InsufficientBalance { balance: 100, required: 150 },
            }
        ));
        assert_eq!(dialogs.step(me.identity), Some(DialogStep::AwaitingStake));

        match dialogs.handle_text(&me, "100") {
            DialogReply::GoalCreated(goal) => {
                assert_eq!(goal.title, "Title");
                assert_eq!(goal.stake, 100);
            }
            other => panic!("expected GoalCreated, got {other:?}"),
        }
    }

    #[test]
    fn blank_title_is_rejected() {
        let (dialogs, _) = setup(DialogConfig::default());
        let me = sender(1);
        dialogs.start_goal(me.identity);
        assert!(matches!(
            dialogs.handle_text(&me, "   "),
            DialogReply::Retry {
                prompt: DialogPrompt::Title,
                error: EngineError::EmptyText("title"),
            }
        ));
        assert_eq!(dialogs.step(me.identity), Some(DialogStep::AwaitingTitle));
    }

    #[test]
    fn cancel_clears_from_any_step() {
        let (dialogs, _) = setup(DialogConfig::default());
        let me = sender(1);
        dialogs.start_goal(me.identity);
        dialogs.handle_text(&me, "Title");
        assert!(dialogs.cancel(me.identity));
        assert!(!dialogs.cancel(me.identity));
        assert!(matches!(
            dialogs.handle_text(&me, "Description"),
            DialogReply::NotInDialog
        ));
    }

    #[test]
    fn users_do_not_share_dialogs() {
        let (dialogs, _) = setup(DialogConfig::default());
        let a = sender(1);
        let b = sender(2);
        dialogs.start_goal(a.identity);
        dialogs.handle_text(&a, "A's goal");

        assert!(matches!(dialogs.handle_text(&b, "hi"), DialogReply::NotInDialog));
        dialogs.start_goal(b.identity);
        assert_eq!(dialogs.step(a.identity), Some(DialogStep::AwaitingDescription));
        assert_eq!(dialogs.step(b.identity), Some(DialogStep::AwaitingTitle));
    }

    #[test]
    fn restarting_discards_collected_fields() {
        let (dialogs, _) = setup(DialogConfig::default());
        let me = sender(1);
        dialogs.start_goal(me.identity);
        dialogs.handle_text(&me, "Old title");
        dialogs.start_goal(me.identity);
        assert_eq!(dialogs.step(me.identity), Some(DialogStep::AwaitingTitle));
    }

    #[test]
    fn stale_dialog_expires() {
        let config = DialogConfig {
            ttl_minutes: 10,
            max_sessions: 100,
        };
        let (dialogs, clock) = setup(config);
        let me = sender(1);
        dialogs.start_goal(me.identity);

        clock.advance(Duration::minutes(9));
        assert!(matches!(
            dialogs.handle_text(&me, "Title"),
            DialogReply::Next(DialogPrompt::Description)
        ));

        clock.advance(Duration::minutes(11));
        assert!(matches!(
            dialogs.handle_text(&me, "Description"),
            DialogReply::NotInDialog
        ));
        assert!(dialogs.states().is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_touched() {
        let config = DialogConfig {
            ttl_minutes: 60,
            max_sessions: 2,
        };
        let (dialogs, clock) = setup(config);
        dialogs.start_goal(ChatIdentity(1));
        clock.advance(Duration::minutes(1));
        dialogs.start_goal(ChatIdentity(2));
        clock.advance(Duration::minutes(1));
        // Touch 1 so that 2 becomes the oldest.
        dialogs.handle_text(&sender(1), "Title");
        clock.advance(Duration::minutes(1));
        dialogs.start_goal(ChatIdentity(3));

        assert_eq!(dialogs.states().len(), 2);
        assert!(dialogs.is_active(ChatIdentity(1)));
        assert!(!dialogs.is_active(ChatIdentity(2)));
        assert!(dialogs.is_active(ChatIdentity(3)));
    }

    #[test]
    fn purge_drops_only_expired() {
        let config = DialogConfig {
            ttl_minutes: 5,
            max_sessions: 10,
        };
        let (dialogs, clock) = setup(config);
        dialogs.start_goal(ChatIdentity(1));
        clock.advance(Duration::minutes(4));
        dialogs.start_goal(ChatIdentity(2));
        clock.advance(Duration::minutes(2));
        assert_eq!(dialogs.states().purge_expired(clock.now()), 1);
        assert!(dialogs.is_active(ChatIdentity(2)));
    }

    #[test]
    fn proof_dialog_submits_and_ends() {
        let (dialogs, _) = setup(DialogConfig::default());
        let me = sender(1);
        let owner = dialogs
            .engine()
            .register_member(me.identity, &me.display_name, GROUP)
            .unwrap();
        let goal = dialogs
            .engine()
            .create_goal(NewGoal {
                owner: owner.user_id,
                group: GROUP,
                title: "Paint the fence".into(),
                description: "Both sides".into(),
                deadline: start() + Duration::days(2),
                stake: 10,
            })
            .unwrap();

        assert_eq!(
            dialogs.start_proof(&me, goal.goal_id).unwrap(),
            DialogPrompt::Proof {
                goal_id: goal.goal_id
            }
        );
        match dialogs.handle_text(&me, "photo of the fence") {
            DialogReply::ProofSubmitted(goal) => {
                assert_eq!(goal.status, GoalStatus::DonePending);
            }
            other => panic!("expected ProofSubmitted, got {other:?}"),
        }
        assert!(!dialogs.is_active(me.identity));

        // The goal is no longer active, so a second proof dialog is refused.
        assert!(matches!(
            dialogs.start_proof(&me, goal.goal_id),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn proof_dialog_requires_ownership() {
        let (dialogs, _) = setup(DialogConfig::default());
        let owner = dialogs
            .engine()
            .register_member(ChatIdentity(1), "owner", GROUP)
            .unwrap();
        let goal = dialogs
            .engine()
            .create_goal(NewGoal {
                owner: owner.user_id,
                group: GROUP,
                title: "Paint the fence".into(),
                description: "Both sides".into(),
                deadline: start() + Duration::days(2),
                stake: 10,
            })
            .unwrap();

        assert!(matches!(
            dialogs.start_proof(&sender(2), goal.goal_id),
            Err(EngineError::NotGoalOwner(_))
        ));
        assert!(!dialogs.is_active(ChatIdentity(2)));
    }
}
