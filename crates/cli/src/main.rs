//! stepwise CLI: the main entry point.
//!
//! Commands:
//! - `run`      Plan and carry out a goal, streaming chunks as JSON lines
//! - `tools`    Show the tool listing the planner sees
//! - `sessions` List stored sessions
//! - `history`  Print one session's history
//! - `init`     Write a default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod wiring;

#[derive(Parser)]
#[command(name = "stepwise", about = "stepwise: a plan, execute and rethink agent", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of ~/.stepwise/config.toml
    #[arg(short, long, global = true, env = "STEPWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and carry out a goal
    Run {
        /// What to achieve
        goal: String,

        /// Append the run to this session's history
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show the tools available to the planner
    Tools,

    /// List stored sessions, newest first
    Sessions,

    /// Print a session's history as JSON
    History {
        /// Session id
        id: String,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries the chunk stream, so logs go to stderr
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run { goal, session } => commands::run::run(config_path, goal, session).await?,
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Sessions => commands::sessions::list(config_path).await?,
        Commands::History { id } => commands::sessions::history(config_path, &id).await?,
        Commands::Init { force } => commands::init::run(config_path, force)?,
    }

    Ok(())
}
