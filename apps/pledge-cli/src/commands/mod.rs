// commands — One module per top-level subcommand, plus shared helpers.

pub mod chat;
pub mod goal;
pub mod user;
pub mod vote;

use std::sync::Arc;

use anyhow::Context as _;
use pledge_goal::{EventDispatcher, FinalizeOutcome, GoalEngine, LogSink, PledgeConfig};
use pledge_ledger::{ChatIdentity, Goal, GoalId, JsonFileStore, LedgerStore, User};

/// Everything a command needs: the loaded config and an engine over the
/// project's ledger file.
pub struct Context {
    pub config: PledgeConfig,
    pub engine: Arc<GoalEngine<JsonFileStore>>,
}

impl Context {
    pub fn open(config: PledgeConfig) -> anyhow::Result<Self> {
        let store = JsonFileStore::open(&config.ledger.data_file, config.ledger.starting_balance)
            .with_context(|| {
                format!(
                    "failed to open ledger at {}",
                    config.ledger.data_file.display()
                )
            })?;
        tracing::debug!(path = %store.path().display(), "ledger opened");

        let mut events = EventDispatcher::new();
        events.add_sink(Box::new(LogSink::new(&config.events.log_file)));
        let engine = GoalEngine::new(Arc::new(store)).with_events(events);

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }
}

/// Look up a registered member by chat identity.
pub fn user_for<S: LedgerStore>(engine: &GoalEngine<S>, identity: i64) -> anyhow::Result<User> {
    engine
        .store()
        .find_user(ChatIdentity(identity))?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no user with identity {}. Run `pledge user register` first.",
                identity
            )
        })
}

pub fn parse_goal_id(input: &str) -> anyhow::Result<GoalId> {
    input
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid goal ID: {}", input))
}

pub fn print_goal_table(goals: &[Goal]) {
    println!(
        "{:<38} {:<30} {:>6} {:<13} {:<11}",
        "ID", "TITLE", "STAKE", "STATUS", "DEADLINE"
    );
    println!("{}", "-".repeat(102));
    for g in goals {
        println!(
            "{:<38} {:<30} {:>6} {:<13} {:<11}",
            g.goal_id,
            truncate(&g.title, 28),
            g.stake,
            g.status.to_string(),
            g.deadline.format("%Y-%m-%d"),
        );
    }
}

/// One-line summary of a quorum check.
pub fn describe_outcome(outcome: &FinalizeOutcome) -> String {
    let tally = outcome.tally();
    match outcome {
        FinalizeOutcome::Succeeded { goal, .. } => format!(
            "Goal \"{}\" confirmed ({} yes of {} voters).",
            goal.title, tally.yes, tally.total_voters
        ),
        FinalizeOutcome::Failed { goal, shares, .. } => format!(
            "Goal \"{}\" failed ({} no of {} voters). {} credits split across {} members.",
            goal.title,
            tally.no,
            tally.total_voters,
            goal.stake,
            shares.len()
        ),
        FinalizeOutcome::Pending { .. } => format!(
            "Still voting: {} yes, {} no, {} of {} needed.",
            tally.yes, tally.no, tally.required, tally.total_voters
        ),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}
