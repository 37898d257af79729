//! # pledge-cli
//!
//! Command-line interface for Pledge.
//!
//! A thin transport over the goal engine:
//! - `pledge user register/show/grant` — members and balances
//! - `pledge goal new/list/show/proof` — goals and proofs
//! - `pledge vote` / `pledge finalize` — voting and quorum checks
//! - `pledge chat` — line-oriented chat console with the goal dialogs

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pledge_goal::PledgeConfig;
use tracing_subscriber::EnvFilter;

/// Pledge — stake credits on your goals and let the group judge.
#[derive(Parser)]
#[command(name = "pledge", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage members and balances.
    User {
        #[command(subcommand)]
        command: commands::user::UserCommands,
    },
    /// Create, list and prove goals.
    Goal {
        #[command(subcommand)]
        command: commands::goal::GoalCommands,
    },
    /// Vote on a goal awaiting votes, then run the quorum check.
    Vote(commands::vote::VoteArgs),
    /// Run the quorum check for a goal without voting.
    Finalize {
        /// Goal ID.
        goal_id: String,
    },
    /// Interactive chat console for one member of one group.
    Chat(commands::chat::ChatArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pledge_goal=info".parse()?)
                .add_directive("pledge_ledger=info".parse()?)
                .add_directive("pledge_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = PledgeConfig::load(&project_root)?;
    let ctx = commands::Context::open(config)?;

    match &cli.command {
        Commands::User { command } => commands::user::execute(command, &ctx),
        Commands::Goal { command } => commands::goal::execute(command, &ctx),
        Commands::Vote(args) => commands::vote::execute(args, &ctx),
        Commands::Finalize { goal_id } => commands::vote::finalize(goal_id, &ctx),
        Commands::Chat(args) => commands::chat::execute(args, &ctx),
    }
}
