// vote.rs — `pledge vote` and `pledge finalize`.

use clap::{Args, ValueEnum};
use pledge_ledger::GroupId;

use super::{describe_outcome, parse_goal_id, user_for, Context};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Choice {
    Yes,
    No,
}

#[derive(Args)]
pub struct VoteArgs {
    /// Goal ID.
    pub goal_id: String,
    /// Your decision.
    #[arg(value_enum)]
    pub choice: Choice,
    /// Chat identity of the voter.
    #[arg(long)]
    pub id: i64,
    /// Group the vote is cast from; must be the goal's group.
    #[arg(long)]
    pub group: i64,
}

pub fn execute(args: &VoteArgs, ctx: &Context) -> anyhow::Result<()> {
    let goal_id = parse_goal_id(&args.goal_id)?;
    let voter = user_for(&ctx.engine, args.id)?;
    let approve = matches!(args.choice, Choice::Yes);

    let outcome = ctx
        .engine
        .vote_and_finalize(goal_id, GroupId(args.group), voter.user_id, approve)?;
    match outcome {
        Some(outcome) => println!("{}", describe_outcome(&outcome)),
        None => println!("Vote recorded; the goal was already resolved."),
    }
    Ok(())
}

pub fn finalize(goal_id: &str, ctx: &Context) -> anyhow::Result<()> {
    let goal_id = parse_goal_id(goal_id)?;
    let group = ctx.engine.goal(goal_id)?.group;
    let outcome = ctx.engine.finalize(goal_id, group)?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}
