//! Worker command handlers
//!
//! Registration of worker nodes and inspection of the scheduler's pool and
//! task table.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use runq_client::SchedulerClient;
use runq_core::domain::runner::WorkerStatus;
use runq_core::dto::task::{TaskPhase, TaskSummary};
use runq_core::dto::worker::{RegisterWorker, WorkerNodeInfo};

use super::print_json;
use crate::config::Config;

/// Worker subcommands
#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Register a worker node
    Register {
        /// Base URL of the node (e.g., "http://worker-1:8090")
        address: String,

        /// Infrastructure tag
        #[arg(long)]
        infra: Option<String>,

        /// Dedicate the node to a workspace
        #[arg(long)]
        workspace: Option<String>,

        /// Dedicate the node to a project (requires --workspace)
        #[arg(long, requires = "workspace")]
        project: Option<String>,
    },
    /// Unregister a worker node
    Unregister {
        /// Base URL of the node
        address: String,
    },
    /// List registered worker nodes
    List,
}

/// Handle worker commands
pub async fn handle_worker_command(command: WorkerCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    match command {
        WorkerCommands::Register {
            address,
            infra,
            workspace,
            project,
        } => {
            let req = RegisterWorker {
                address,
                infra,
                workspace,
                project,
            };
            let change = client.register_worker(&req).await?;
            report_change(&req.address, "registered", change.changed);
            Ok(())
        }
        WorkerCommands::Unregister { address } => {
            let change = client.unregister_worker(&address).await?;
            report_change(&address, "unregistered", change.changed);
            Ok(())
        }
        WorkerCommands::List => list_workers(&client, config).await,
    }
}

fn report_change(address: &str, action: &str, changed: bool) {
    if changed {
        println!("{}", format!("✓ Worker {} {}", address, action).green().bold());
    } else {
        println!("{}", format!("Worker {} unchanged", address).yellow());
    }
}

async fn list_workers(client: &SchedulerClient, config: &Config) -> Result<()> {
    let workers = client.list_workers().await?;

    if config.json {
        return print_json(&workers);
    }

    if workers.is_empty() {
        println!("{}", "No worker nodes registered.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} worker node(s):", workers.len()).bold()
        );
        println!();
        for worker in workers {
            print_worker(&worker);
        }
    }

    Ok(())
}

fn print_worker(worker: &WorkerNodeInfo) {
    let status = match worker.status {
        WorkerStatus::Online => worker.status.to_string().green(),
        WorkerStatus::Offline => worker.status.to_string().red(),
    };

    println!("  {} {}", "▸".cyan(), worker.address.bold());
    println!("    Status:       {}", status);
    println!("    Infra:        {}", worker.infra);
    match (&worker.workspace, &worker.project) {
        (Some(workspace), Some(project)) => {
            println!("    Dedicated:    {}:{}", workspace, project)
        }
        (Some(workspace), None) => println!("    Dedicated:    {}", workspace),
        _ => {}
    }

    for runner in &worker.runners {
        match &runner.state {
            Some(state) => println!(
                "    {:<13} {} / {} MB free, {:.1}% disk free",
                runner.name,
                state.free_memory_mb,
                state.total_memory_mb,
                state.free_disk_percent()
            ),
            None => println!("    {:<13} {}", runner.name, "unavailable".dimmed()),
        }
    }
    println!();
}

/// Print the scheduler's task table
pub async fn list_tasks(config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);
    let tasks = client.list_tasks().await?;

    if config.json {
        return print_json(&tasks);
    }

    if tasks.is_empty() {
        println!("{}", "No tasks.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} task(s):", tasks.len()).bold());
    println!();
    for task in tasks {
        print_task(&task);
    }
    Ok(())
}

fn print_task(task: &TaskSummary) {
    let phase = format!("{:?}", task.phase);
    let phase = match task.phase {
        TaskPhase::Running => phase.green(),
        TaskPhase::Error => phase.red(),
        TaskPhase::Stopped | TaskPhase::Cancelled => phase.dimmed(),
        TaskPhase::Waiting | TaskPhase::ResolvingBuild | TaskPhase::SelectingRunner => {
            phase.yellow()
        }
    };

    println!(
        "  {} {} {} {}:{} {} ({} MB) {}",
        "▸".cyan(),
        task.id.to_string().bold(),
        phase,
        task.workspace,
        task.project,
        task.runner,
        task.memory_size_mb,
        task.server_url.as_deref().unwrap_or("").dimmed()
    );
}
