//! flowkeep: mirror workflow instance flows into a git repository.
//!
//! # Usage
//!
//! ```text
//! flowkeep [--config flowkeep.yaml] init
//! flowkeep sync [--instance <name>] [--dry-run] [--no-push]
//! flowkeep run
//! flowkeep status [--json]
//! flowkeep diff <instance>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    diff::DiffArgs, init::InitArgs, run::RunArgs, status::StatusArgs, sync::SyncArgs,
};
use flowkeep_core::config::DEFAULT_CONFIG_FILE;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "flowkeep",
    version,
    about = "Keep a git history of the flows defined on workflow instances",
    long_about = None,
)]
struct Cli {
    /// Configuration file.
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "FLOWKEEP_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the history repository and configure its remote.
    Init(InitArgs),

    /// Run one sweep now.
    Sync(SyncArgs),

    /// Sweep on the configured interval until interrupted.
    Run(RunArgs),

    /// Show what is tracked for each configured instance.
    Status(StatusArgs),

    /// Show unified diffs of what a sync would write for one instance.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    flowkeep_daemon::init_tracing();

    let config = cli.config.as_path();
    match cli.command {
        Commands::Init(args) => args.run(config),
        Commands::Sync(args) => args.run(config),
        Commands::Run(args) => args.run(config),
        Commands::Status(args) => args.run(config),
        Commands::Diff(args) => args.run(config),
    }
}
