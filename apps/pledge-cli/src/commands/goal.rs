// goal.rs — `pledge goal` subcommands: new, list, show, proof.

use clap::Subcommand;
use pledge_goal::parse_deadline;
use pledge_ledger::{GroupId, LedgerStore, NewGoal};

use super::{parse_goal_id, print_goal_table, user_for, Context};

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Commit a new goal with a stake.
    New {
        /// Chat identity of the owner.
        #[arg(long)]
        id: i64,
        /// Group the goal is shared with.
        #[arg(long)]
        group: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// YYYY-MM-DD or a number of days from now.
        #[arg(long)]
        deadline: String,
        /// Credits at stake.
        #[arg(long)]
        stake: i64,
    },
    /// List open goals of a member or a group.
    List {
        /// Goals owned by this chat identity.
        #[arg(long, conflicts_with = "group", required_unless_present = "group")]
        id: Option<i64>,
        /// Goals shared with this group.
        #[arg(long)]
        group: Option<i64>,
    },
    /// Show a goal with its votes and penalty transactions.
    Show {
        /// Goal ID.
        goal_id: String,
    },
    /// Submit proof for an active goal and open voting.
    Proof {
        /// Goal ID.
        goal_id: String,
        /// Chat identity of the owner.
        #[arg(long)]
        id: i64,
        /// Proof text (a description or a link).
        #[arg(long)]
        text: String,
    },
}

pub fn execute(cmd: &GoalCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        GoalCommands::New {
            id,
            group,
            title,
            description,
            deadline,
            stake,
        } => {
            let owner = user_for(&ctx.engine, *id)?;
            let deadline = parse_deadline(deadline, ctx.engine.now())?;
            let goal = ctx.engine.create_goal(NewGoal {
                owner: owner.user_id,
                group: GroupId(*group),
                title: title.clone(),
                description: description.clone(),
                deadline,
                stake: *stake,
            })?;
            println!("Goal created: {}", goal.goal_id);
            println!("  Title:    {}", goal.title);
            println!("  Stake:    {}", goal.stake);
            println!("  Deadline: {}", goal.deadline.format("%Y-%m-%d %H:%M UTC"));
            Ok(())
        }
        GoalCommands::List { id, group } => {
            let goals = match (id, group) {
                (Some(id), _) => {
                    let owner = user_for(&ctx.engine, *id)?;
                    ctx.engine.active_goals_for_owner(owner.user_id)?
                }
                (None, Some(group)) => ctx.engine.active_goals_for_group(GroupId(*group))?,
                (None, None) => anyhow::bail!("pass --id or --group"),
            };
            if goals.is_empty() {
                println!("No open goals.");
                return Ok(());
            }
            print_goal_table(&goals);
            println!();
            println!("{} goal(s) total.", goals.len());
            Ok(())
        }
        GoalCommands::Show { goal_id } => show_goal(ctx, goal_id),
        GoalCommands::Proof { goal_id, id, text } => {
            let goal_id = parse_goal_id(goal_id)?;
            let owner = user_for(&ctx.engine, *id)?;
            let goal = ctx.engine.goal(goal_id)?;
            if goal.owner != owner.user_id {
                anyhow::bail!("goal {} belongs to someone else", goal_id);
            }
            let goal = ctx.engine.submit_proof(goal_id, text)?;
            println!("Proof recorded. Goal {} is now {}.", goal.goal_id, goal.status);
            Ok(())
        }
    }
}

fn show_goal(ctx: &Context, goal_id: &str) -> anyhow::Result<()> {
    let goal_id = parse_goal_id(goal_id)?;
    let goal = ctx.engine.goal(goal_id)?;
    let store = ctx.engine.store();
    let owner = store.user(goal.owner)?;

    println!("Goal:        {}", goal.goal_id);
    println!("Title:       {}", goal.title);
    println!("Description: {}", goal.description);
    println!("Owner:       {} ({})", owner.display_name, owner.user_id);
    println!("Group:       {}", goal.group);
    println!("Stake:       {}", goal.stake);
    println!("Status:      {}", goal.status);
    println!("Deadline:    {}", goal.deadline.format("%Y-%m-%d %H:%M UTC"));
    println!("Created:     {}", goal.created_at.to_rfc3339());
    if let Some(proof) = &goal.proof {
        println!("Proof:       {}", proof);
    }
    if let Some(started) = goal.voting_started_at {
        println!("Voting from: {}", started.to_rfc3339());
    }

    let votes = store.votes(goal_id)?;
    if !votes.is_empty() {
        println!();
        println!("Votes:");
        for v in &votes {
            let name = store
                .user(v.voter)
                .map(|u| u.display_name)
                .unwrap_or_else(|_| v.voter.to_string());
            println!("  {:<24} {}", name, if v.approve { "yes" } else { "no" });
        }
    }

    let transactions = store.transactions_for_goal(goal_id)?;
    if !transactions.is_empty() {
        println!();
        println!("Transactions:");
        for t in &transactions {
            let name = store
                .user(t.to)
                .map(|u| u.display_name)
                .unwrap_or_else(|_| t.to.to_string());
            println!("  {:<24} +{:<6} {}", name, t.amount, t.reason);
        }
    }
    Ok(())
}
