// chat.rs — `pledge chat`: a line-oriented chat console.
//
// Each input line is treated as one message from a single member in a
// single group. Slash commands map to engine operations; any other line
// goes to the dialog engine when the member is mid-dialog.

use std::io::{self, BufRead, Write};

use clap::Args;
use pledge_goal::{DialogEngine, DialogPrompt, DialogReply, EngineError, Sender};
use pledge_ledger::{ChatIdentity, Goal, GoalId, GroupId, LedgerStore};

use super::{describe_outcome, parse_goal_id, Context};

#[derive(Args)]
pub struct ChatArgs {
    /// Chat identity of the member you are speaking as.
    #[arg(long)]
    pub id: i64,
    /// Display name.
    #[arg(long)]
    pub name: String,
    /// Group the conversation happens in.
    #[arg(long)]
    pub group: i64,
}

const HELP: &str = "Commands: /newgoal, /cancel, /proof <id>, /mygoals, /goals, /stats, \
                    /vote yes|no <id>, /quit";

pub fn execute(args: &ChatArgs, ctx: &Context) -> anyhow::Result<()> {
    let dialogs = DialogEngine::new(ctx.engine.clone(), &ctx.config.dialog);
    let sender = Sender {
        identity: ChatIdentity(args.id),
        display_name: args.name.clone(),
        group: GroupId(args.group),
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", HELP)?;
    run_session(&dialogs, &sender, stdin.lock(), &mut stdout)
}

/// Feed every line of `input` through [`respond`] until EOF or `/quit`.
pub fn run_session<S, R, W>(
    dialogs: &DialogEngine<S>,
    sender: &Sender,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: LedgerStore,
    R: BufRead,
    W: Write,
{
    write!(out, "> ")?;
    out.flush()?;
    for line in input.lines() {
        let line = line?;
        if line.trim() == "/quit" {
            break;
        }
        if !line.trim().is_empty() {
            writeln!(out, "{}", respond(dialogs, sender, &line))?;
        }
        write!(out, "> ")?;
        out.flush()?;
    }
    writeln!(out)?;
    Ok(())
}

/// Handle one message and produce the reply text.
pub fn respond<S: LedgerStore>(dialogs: &DialogEngine<S>, sender: &Sender, line: &str) -> String {
    let engine = dialogs.engine();
    let user = match engine.register_member(sender.identity, &sender.display_name, sender.group) {
        Ok(user) => user,
        Err(e) => return describe_error(&e),
    };

    let trimmed = line.trim();
    let mut words = trimmed.split_whitespace();
    let result = match words.next() {
        Some("/newgoal") => Ok(prompt_text(&dialogs.start_goal(sender.identity))),
        Some("/cancel") => Ok(if dialogs.cancel(sender.identity) {
            "Cancelled.".to_string()
        } else {
            "Nothing to cancel.".to_string()
        }),
        Some("/proof") => match goal_arg(words.next()) {
            Ok(goal_id) => dialogs
                .start_proof(sender, goal_id)
                .map(|prompt| prompt_text(&prompt)),
            Err(msg) => return msg,
        },
        Some("/mygoals") => engine
            .active_goals_for_owner(user.user_id)
            .map(|goals| goal_list(&goals, "You have no open goals.")),
        Some("/goals") => engine
            .active_goals_for_group(sender.group)
            .map(|goals| goal_list(&goals, "No open goals in this group.")),
        Some("/stats") => engine.user_stats(user.user_id).map(|s| {
            format!(
                "{}: balance {}, {} open goal(s).",
                s.display_name, s.balance, s.active_goals
            )
        }),
        Some("/vote") => {
            let approve = match words.next() {
                Some("yes") => true,
                Some("no") => false,
                _ => return "Usage: /vote yes|no <goal id>".to_string(),
            };
            match goal_arg(words.next()) {
                Ok(goal_id) => engine
                    .vote_and_finalize(goal_id, sender.group, user.user_id, approve)
                    .map(|outcome| match outcome {
                        Some(outcome) => describe_outcome(&outcome),
                        None => "Vote recorded; the goal was already resolved.".to_string(),
                    }),
                Err(msg) => return msg,
            }
        }
        Some("/help") => Ok(HELP.to_string()),
        Some(cmd) if cmd.starts_with('/') => Ok(format!("Unknown command {}. {}", cmd, HELP)),
        _ => Ok(dialog_reply(dialogs.handle_text(sender, line))),
    };

    result.unwrap_or_else(|e| describe_error(&e))
}

fn goal_arg(arg: Option<&str>) -> Result<GoalId, String> {
    let arg = arg.ok_or_else(|| "Which goal? Pass its ID.".to_string())?;
    parse_goal_id(arg).map_err(|e| e.to_string())
}

fn dialog_reply(reply: DialogReply) -> String {
    match reply {
        DialogReply::NotInDialog => "Send /newgoal to start a goal, or /help.".to_string(),
        DialogReply::Next(prompt) => prompt_text(&prompt),
        DialogReply::Retry { prompt, error } => {
            format!("{} {}", describe_error(&error), prompt_text(&prompt))
        }
        DialogReply::GoalCreated(goal) => format!(
            "Goal \"{}\" created with {} credits at stake, due {}. ID: {}",
            goal.title,
            goal.stake,
            goal.deadline.format("%Y-%m-%d"),
            goal.goal_id
        ),
        DialogReply::ProofSubmitted(goal) => format!(
            "Proof for \"{}\" submitted. The group can vote with /vote yes|no {}",
            goal.title, goal.goal_id
        ),
        DialogReply::GoalRejected(error) => {
            format!("Goal not created: {}", describe_error(&error))
        }
        DialogReply::ProofRejected(error) => {
            format!("Proof not recorded: {}", describe_error(&error))
        }
    }
}

fn prompt_text(prompt: &DialogPrompt) -> String {
    match prompt {
        DialogPrompt::Title => "What is your goal? Send a short title.".to_string(),
        DialogPrompt::Description => "Describe what counts as done.".to_string(),
        DialogPrompt::Deadline => {
            "When is it due? Send YYYY-MM-DD or a number of days.".to_string()
        }
        DialogPrompt::Stake {
            balance: Some(balance),
        } => format!("How many credits do you stake? You have {}.", balance),
        DialogPrompt::Stake { balance: None } => "How many credits do you stake?".to_string(),
        DialogPrompt::Proof { goal_id } => format!("Send your proof for goal {}.", goal_id),
    }
}

fn goal_list(goals: &[Goal], empty: &str) -> String {
    if goals.is_empty() {
        return empty.to_string();
    }
    goals
        .iter()
        .map(|g| {
            format!(
                "{}  {} [{}] stake {} due {}",
                g.goal_id,
                g.title,
                g.status,
                g.stake,
                g.deadline.format("%Y-%m-%d")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// User-facing text for an engine error. Store failures are logged and
/// reported generically.
fn describe_error(error: &EngineError) -> String {
    match error {
        EngineError::Store(e) => {
            tracing::error!("store failure: {}", e);
            "Something went wrong, try again later.".to_string()
        }
        EngineError::PartialSettlement { goal_id, .. } => {
            tracing::error!(goal_id = %goal_id, "{}", error);
            "This goal needs attention from an administrator.".to_string()
        }
        other => format!("{}.", capitalize(&other.to_string())),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
