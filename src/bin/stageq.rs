//! stageq CLI - Stage-marginalized Q-learning for multi-stage stochastic problems
//!
//! This CLI provides:
//! - Training a tabular Q-learner on a JSON problem file
//! - Inspecting a problem's stage partition and table size

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stageq")]
#[command(version, about = "Stage-marginalized Q-learning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a problem file
    Train(Box<stageq::cli::commands::train::TrainArgs>),

    /// Show the stage structure of a problem file
    Inspect(stageq::cli::commands::inspect::InspectArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => stageq::cli::commands::train::execute(*args),
        Commands::Inspect(args) => stageq::cli::commands::inspect::execute(args),
    }
}
