//! Process command handlers
//!
//! Submitting runs and following, stopping and listing the resulting
//! processes of one workspace.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use runq_client::SchedulerClient;
use runq_core::domain::build::BuildOptions;
use runq_core::domain::process::{ProcessDescriptor, ProcessStatus};
use runq_core::dto::run::RunOptions;
use std::collections::HashMap;
use std::time::Duration;

use super::print_json;
use crate::config::Config;

const WAIT_POLL: Duration = Duration::from_secs(1);

/// Arguments of `run`
#[derive(Args)]
pub struct RunArgs {
    /// Project path (e.g., "/my-app")
    project: String,

    /// Environment id; the project's default when omitted
    #[arg(short, long)]
    env: Option<String>,

    /// Memory in megabytes
    #[arg(short, long)]
    memory: Option<u64>,

    /// Start the application in debug mode
    #[arg(long)]
    debug: bool,

    /// Deploy without building first
    #[arg(long)]
    skip_build: bool,

    /// Builder to use instead of the project's default
    #[arg(long)]
    builder: Option<String>,

    /// Runner option as KEY=VALUE (repeatable)
    #[arg(short = 'o', long = "option", value_parser = parse_key_value)]
    options: Vec<(String, String)>,

    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(short = 'V', long = "var", value_parser = parse_key_value)]
    variables: Vec<(String, String)>,

    /// Wait until the process is running or has ended
    #[arg(short, long)]
    wait: bool,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            environment_id: self.env.clone(),
            memory_size_mb: self.memory,
            debug: self.debug,
            skip_build: self.skip_build,
            build_options: self.builder.as_ref().map(|builder| BuildOptions {
                builder_name: Some(builder.clone()),
                ..Default::default()
            }),
            options: self.options.iter().cloned().collect::<HashMap<_, _>>(),
            variables: self.variables.iter().cloned().collect::<HashMap<_, _>>(),
        }
    }
}

/// Parse a `KEY=VALUE` argument
fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", input)),
    }
}

/// Submit a run and print the admitted process
pub async fn run(args: RunArgs, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    let mut process = client
        .run(&config.workspace, &args.project, &args.options())
        .await
        .with_context(|| format!("Failed to run {}", args.project))?;

    if !config.json {
        println!(
            "{}",
            format!("✓ Process {} submitted", process.process_id).green().bold()
        );
    }

    if args.wait {
        while process.status == ProcessStatus::New {
            tokio::time::sleep(WAIT_POLL).await;
            process = client.status(&config.workspace, process.process_id).await?;
        }
    }

    if config.json {
        return print_json(&process);
    }

    println!();
    print_process_details(&process);

    if process.status == ProcessStatus::Failed {
        bail!(
            "Process {} failed: {}",
            process.process_id,
            process.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

pub async fn status(id: u64, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);
    let process = client.status(&config.workspace, id).await?;

    if config.json {
        return print_json(&process);
    }
    print_process_details(&process);
    Ok(())
}

pub async fn stop(id: u64, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);
    let process = client.stop(&config.workspace, id).await?;

    if config.json {
        return print_json(&process);
    }
    println!(
        "{}",
        format!("✓ Process {} is {}", id, process.status).green().bold()
    );
    Ok(())
}

pub async fn logs(id: u64, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);
    let logs = client.logs(&config.workspace, id).await?;

    if logs.is_empty() {
        println!("{}", "No output yet.".yellow());
    } else {
        print!("{}", logs);
    }
    Ok(())
}

/// List processes of the configured workspace
pub async fn list(project: Option<String>, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);
    let processes = client
        .processes(&config.workspace, project.as_deref())
        .await?;

    if config.json {
        return print_json(&processes);
    }

    if processes.is_empty() {
        println!("{}", "No processes found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} process(es):", processes.len()).bold()
        );
        println!();
        for process in processes {
            print_process_summary(&process);
        }
    }

    Ok(())
}

/// Print a one-line process summary
fn print_process_summary(process: &ProcessDescriptor) {
    println!(
        "  {} {} {} {} {}",
        "▸".cyan(),
        process.process_id.to_string().bold(),
        colorize_status(process.status),
        process.project.as_deref().unwrap_or("-"),
        process
            .creation_time
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
}

/// Print every known detail of a process
fn print_process_details(process: &ProcessDescriptor) {
    println!("{}", format!("Process {}", process.process_id).bold());
    println!("  Status:       {}", colorize_status(process.status));
    println!("  Project:      {}", process.project.as_deref().unwrap_or("-"));
    println!(
        "  Environment:  {}",
        process.environment_id.as_deref().unwrap_or("-")
    );
    println!("  Runner:       {}", process.runner.as_deref().unwrap_or("-"));
    if let Some(memory) = process.memory_size_mb {
        println!("  Memory:       {} MB", memory);
    }
    if let Some(server) = &process.server_url {
        println!("  Server:       {}", server);
    }
    println!(
        "  Created:      {}",
        process.creation_time.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(started) = process.start_time {
        println!("  Started:      {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(stopped) = process.stop_time {
        println!("  Stopped:      {}", stopped.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &process.error {
        println!("  Error:        {}", error.red());
    }

    for stat in process.stats.iter().chain(&process.build_stats) {
        println!("  {:<13} {}", format!("{}:", stat.name), stat.value.dimmed());
    }

    if !process.links.is_empty() {
        println!();
        for link in &process.links {
            println!("  {} {} {}", link.method.dimmed(), link.rel, link.href.cyan());
        }
    }
}

/// Colorize process status for display
fn colorize_status(status: ProcessStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    match status {
        ProcessStatus::New => status_str.yellow(),
        ProcessStatus::Running => status_str.green(),
        ProcessStatus::Stopped | ProcessStatus::Cancelled => status_str.dimmed(),
        ProcessStatus::Failed => status_str.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("JAVA_OPTS=-Xmx1g -Dx=y").unwrap(),
            ("JAVA_OPTS".to_string(), "-Xmx1g -Dx=y".to_string())
        );
        assert_eq!(parse_key_value("EMPTY=").unwrap().1, "");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
    }
}
