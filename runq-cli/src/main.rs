//! Runq CLI
//!
//! Command-line interface for submitting runs to the runq scheduler and
//! administering its worker nodes.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "runq")]
#[command(about = "Runq remote execution CLI", long_about = None)]
struct Cli {
    /// Scheduler URL
    #[arg(long, env = "RUNQ_SCHEDULER_URL", default_value = "http://localhost:8080")]
    scheduler_url: String,

    /// Workspace the process commands act on
    #[arg(short, long, env = "RUNQ_WORKSPACE", default_value = "default")]
    workspace: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        scheduler_url: cli.scheduler_url,
        workspace: cli.workspace,
        json: cli.json,
    };

    handle_command(cli.command, &config).await
}
