//! Tidemark CLI - file based SQL migrations for DuckDB

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::apply::Mode;
use commands::{apply, init, last, plan, redo, verify, DEFAULT_COUNT};

/// Tidemark - apply ordered SQL migration files and keep a ledger of them
#[derive(Parser)]
#[command(name = "tidemark", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "TIDEMARK_CONFIG", default_value = "tidemark.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show migration files which can be applied
    Plan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply the next migrations
    Run {
        /// How many migrations to apply
        count: Option<usize>,
    },

    /// Apply the next migrations inside a transaction and roll it back
    Dryrun {
        /// How many migrations to try
        count: Option<usize>,
    },

    /// Mark the next migrations as applied without running them
    Skip {
        /// How many migrations to mark
        count: Option<usize>,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Run the last applied migration again
    Redo {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the most recently applied migrations
    Last {
        /// How many rows to show
        count: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare checksums of applied migrations with the local files
    Verify {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_path();
    match cli.command {
        Commands::Init { force } => init::run(config, force),
        Commands::Plan { json } => plan::run(config, json),
        Commands::Run { count } => apply::run(config, Mode::Run, count.unwrap_or(DEFAULT_COUNT), true),
        Commands::Dryrun { count } => {
            apply::run(config, Mode::DryRun, count.unwrap_or(DEFAULT_COUNT), true)
        }
        Commands::Skip { count, yes } => {
            apply::run(config, Mode::Skip, count.unwrap_or(DEFAULT_COUNT), yes)
        }
        Commands::Redo { yes } => redo::run(config, yes),
        Commands::Last { count, json } => last::run(config, count.unwrap_or(DEFAULT_COUNT), json),
        Commands::Verify { json } => verify::run(config, json),
    }
}
