//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod process;
mod worker;

pub use process::RunArgs;
pub use worker::WorkerCommands;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a run of a project
    Run(RunArgs),
    /// Show the status of a process
    Status {
        /// Process id
        id: u64,
    },
    /// Stop a process
    Stop {
        /// Process id
        id: u64,
    },
    /// Print the output of a process
    Logs {
        /// Process id
        id: u64,
    },
    /// List processes of the workspace
    Ps {
        /// Only processes of this project
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Worker node administration
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Show the scheduler's task table
    Tasks,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run(args) => process::run(args, config).await,
        Commands::Status { id } => process::status(id, config).await,
        Commands::Stop { id } => process::stop(id, config).await,
        Commands::Logs { id } => process::logs(id, config).await,
        Commands::Ps { project } => process::list(project, config).await,
        Commands::Worker { command } => worker::handle_worker_command(command, config).await,
        Commands::Tasks => worker::list_tasks(config).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
