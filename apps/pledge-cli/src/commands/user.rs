// user.rs — `pledge user` subcommands: register, show, grant.

use clap::Subcommand;
use pledge_ledger::{ChatIdentity, GroupId};

use super::{user_for, Context};

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a member of a group (idempotent).
    Register {
        /// Chat identity of the member.
        #[arg(long)]
        id: i64,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Group the member belongs to.
        #[arg(long)]
        group: i64,
    },
    /// Show a member's balance and open goals.
    Show {
        #[arg(long)]
        id: i64,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Credit (or, with a negative amount, debit) a member's balance.
    Grant {
        #[arg(long)]
        id: i64,
        #[arg(long, allow_hyphen_values = true)]
        amount: i64,
    },
}

pub fn execute(cmd: &UserCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Register { id, name, group } => {
            let user = ctx
                .engine
                .register_member(ChatIdentity(*id), name, GroupId(*group))?;
            println!(
                "Registered {} ({}) in group {}, balance {}",
                user.display_name, user.user_id, group, user.balance
            );
            Ok(())
        }
        UserCommands::Show { id, json } => {
            let user = user_for(&ctx.engine, *id)?;
            let stats = ctx.engine.user_stats(user.user_id)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("User:         {}", stats.display_name);
                println!("ID:           {}", stats.user_id);
                println!("Balance:      {}", stats.balance);
                println!("Open goals:   {}", stats.active_goals);
            }
            Ok(())
        }
        UserCommands::Grant { id, amount } => {
            let user = user_for(&ctx.engine, *id)?;
            let user = ctx.engine.grant_credits(user.user_id, *amount)?;
            println!("{} now has {} credits", user.display_name, user.balance);
            Ok(())
        }
    }
}
