//! Run body
//!
//! The asynchronous half of a task: wait for its build, wait for a runner with
//! enough capacity, then start the application there. Every sleep and every
//! wire call made before the start races the task's cancellation token.

use runq_core::domain::build::{BuildOptions, BuildStatus, BuildTask};
use runq_core::domain::environment::{EnvironmentId, EnvironmentScope};
use runq_core::domain::event::RunEventKind;
use runq_core::dto::task::TaskPhase;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SchedulerError};
use crate::pool::{RemoteProcess, RunnerHandle};
use crate::queue::RunQueue;
use crate::selection::Candidate;
use crate::task::{Task, TaskOutcome};

/// Runners with less free disk than this are never chosen
const DISK_REFUSE_PERCENT: f64 = 5.0;
/// Runners with less free disk than this are logged once
const DISK_WARN_PERCENT: f64 = 10.0;

pub(super) async fn execute(queue: Arc<RunQueue>, task: Arc<Task>, build: Option<BuildOptions>) {
    match drive(&queue, &task, build).await {
        Ok(Some(process)) => {
            let process = Arc::new(process);
            task.complete(TaskOutcome::Started(Arc::clone(&process)));

            if task.cancellation().is_cancelled() {
                tracing::info!(
                    "Task {} was cancelled while starting, stopping process {}",
                    task.id(),
                    process.process_id()
                );
                match process.stop().await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        tracing::warn!("Failed to stop process {}: {}", process.process_id(), e)
                    }
                }
                return;
            }

            tracing::info!(
                "Task {} started as process {} on {}",
                task.id(),
                process.process_id(),
                process.address()
            );
            queue.publish(&task, RunEventKind::Started, None);
        }
        Ok(None) => {
            tracing::debug!("Task {} ended before a process was started", task.id());
            task.complete(TaskOutcome::Abandoned);
        }
        Err(e) => {
            tracing::warn!("Task {} failed: {}", task.id(), e);
            let message = e.to_string();
            task.complete(TaskOutcome::Failed(message.clone()));
            queue.publish(&task, RunEventKind::Error, Some(message));
        }
    }
}

async fn drive(
    queue: &RunQueue,
    task: &Task,
    build: Option<BuildOptions>,
) -> Result<Option<RemoteProcess>> {
    let mut spec = task.spec().clone();

    if let Some(options) = build {
        task.set_phase(TaskPhase::ResolvingBuild);
        queue.publish(task, RunEventKind::PreparationStarted, None);

        match await_build(queue, task, &options).await? {
            Some(build) => spec.build_task = Some(build),
            None => return Ok(None),
        }
    }

    task.set_phase(TaskPhase::SelectingRunner);
    let Some(candidate) = select_runner(queue, task).await? else {
        return Ok(None);
    };

    if task.cancellation().is_cancelled() {
        return Ok(None);
    }

    // Past this point the worker may already have created the process
    let process = candidate.handle.start(&spec).await?;
    Ok(Some(process))
}

/// Trigger the build and poll it to a terminal status
///
/// Returns `None` when the task was cancelled; the build is cancelled too.
async fn await_build(
    queue: &RunQueue,
    task: &Task,
    options: &BuildOptions,
) -> Result<Option<BuildTask>> {
    let token = task.cancellation();
    let workspace = task.workspace();

    let mut build = queue.builder.build(workspace, task.project(), options).await?;
    tracing::info!("Task {} waits for build {}", task.id(), build.task_id);

    loop {
        task.attach_build(build.clone());

        match build.status {
            BuildStatus::Successful => return Ok(Some(build)),
            BuildStatus::Failed => {
                return Err(SchedulerError::Build(build_failure(&build, "failed")));
            }
            BuildStatus::Cancelled => {
                return Err(SchedulerError::Build(build_failure(&build, "was cancelled")));
            }
            BuildStatus::InQueue | BuildStatus::InProgress => {}
        }

        tokio::select! {
            _ = token.cancelled() => {
                if let Err(e) = queue.builder.cancel(workspace, build.task_id).await {
                    tracing::warn!("Failed to cancel build {}: {}", build.task_id, e);
                }
                return Ok(None);
            }
            _ = tokio::time::sleep(queue.config.build_poll_interval) => {}
        }

        build = queue.builder.status(workspace, build.task_id).await?;
    }
}

fn build_failure(build: &BuildTask, what: &str) -> String {
    match build.log_url() {
        Some(url) => format!("Build {} {}, see the build log at {}", build.task_id, what, url),
        None => format!("Build {} {}", build.task_id, what),
    }
}

/// Poll candidate runners until one has capacity for the task
///
/// Returns `None` when the task was cancelled first.
async fn select_runner(queue: &RunQueue, task: &Task) -> Result<Option<Candidate>> {
    let token = task.cancellation();
    let spec = task.spec();
    let environment = EnvironmentId::parse(&spec.environment_id)?;

    let mut supported: HashMap<RunnerHandle, bool> = HashMap::new();
    let mut disk_warned: HashSet<RunnerHandle> = HashSet::new();

    loop {
        let handles = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            handles = queue.pool.candidates(task.infra(), &spec.workspace, &spec.project) => handles,
        };

        let mut qualifying = Vec::new();
        for handle in handles.into_iter().filter(|h| h.name() == spec.runner) {
            if environment.scope == EnvironmentScope::System {
                match supports(&mut supported, &handle, &environment.name, token).await {
                    Some(true) => {}
                    Some(false) => continue,
                    None => return Ok(None),
                }
            }

            let state = tokio::select! {
                _ = token.cancelled() => return Ok(None),
                state = handle.live_state() => state,
            };
            let state = match state {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!("Skipping runner {} on {}: {}", handle.name(), handle.address(), e);
                    continue;
                }
            };

            if state.free_memory_mb < spec.memory_size_mb {
                continue;
            }

            let free_disk = state.free_disk_percent();
            if free_disk < DISK_REFUSE_PERCENT {
                tracing::debug!(
                    "Runner {} on {} has only {:.1}% free disk, skipping",
                    handle.name(),
                    handle.address(),
                    free_disk
                );
                continue;
            }
            if free_disk < DISK_WARN_PERCENT && disk_warned.insert(handle.clone()) {
                tracing::warn!(
                    "Runner {} on {} is low on disk space ({:.1}% free)",
                    handle.name(),
                    handle.address(),
                    free_disk
                );
            }

            qualifying.push(Candidate { handle, state });
        }

        if let Some(candidate) = queue.strategy.select(&qualifying) {
            return Ok(Some(candidate.clone()));
        }

        tokio::select! {
            _ = token.cancelled() => return Ok(None),
            _ = tokio::time::sleep(queue.config.selection_poll_interval) => {}
        }
    }
}

/// Whether `handle` offers `environment`, remembered per run body
///
/// `None` means the task was cancelled while asking.
async fn supports(
    cache: &mut HashMap<RunnerHandle, bool>,
    handle: &RunnerHandle,
    environment: &str,
    token: &CancellationToken,
) -> Option<bool> {
    if let Some(known) = cache.get(handle) {
        return Some(*known);
    }

    let answer = tokio::select! {
        _ = token.cancelled() => return None,
        answer = handle.supports_environment(environment) => answer,
    };

    match answer {
        Ok(supported) => {
            cache.insert(handle.clone(), supported);
            Some(supported)
        }
        Err(e) => {
            tracing::warn!("Skipping runner {} on {}: {}", handle.name(), handle.address(), e);
            Some(false)
        }
    }
}
