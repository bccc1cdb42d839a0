//! Run queue
//!
//! The orchestrator. `run` resolves what to run and where, admits the request
//! against its workspace's memory, registers a task and hands it to a run body
//! executing in the background. The queue owns the worker pool and the task
//! table; nothing is global, so independent queues can coexist.

mod reclaimer;
mod run_body;

pub use reclaimer::Reclaimer;

use chrono::Utc;
use dashmap::DashMap;
use runq_core::domain::build::BuildOptions;
use runq_core::domain::environment::{EnvironmentId, EnvironmentScope};
use runq_core::domain::event::{RunEvent, RunEventKind};
use runq_core::domain::process::ProcessDescriptor;
use runq_core::domain::project::{ProjectDescriptor, WorkspaceDescriptor};
use runq_core::domain::spec::{RunSpecification, UNLIMITED_LIFETIME};
use runq_core::dto::run::RunOptions;
use runq_core::dto::task::TaskSummary;
use runq_core::dto::worker::{RegisterWorker, WorkerNodeInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::accountant::ResourceAccountant;
use crate::collaborators::{BuildTrigger, Collaborators, ProjectProvider, WorkspaceProvider};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::events::EventBus;
use crate::pool::{WorkerConnector, WorkerPool};
use crate::selection::SelectionStrategy;
use crate::task::Task;

/// Recipe file names that determine the runner of a project environment
const RECIPE_RUNNERS: &[(&str, &str)] = &[("Dockerfile", "docker")];

/// Filter for [`RunQueue::processes`]; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    pub workspace: Option<String>,
    pub project: Option<String>,
    pub account: Option<String>,
}

pub struct RunQueue {
    config: SchedulerConfig,
    pool: WorkerPool,
    tasks: Arc<DashMap<u64, Arc<Task>>>,
    accountant: ResourceAccountant,
    strategy: Arc<dyn SelectionStrategy>,
    projects: Arc<dyn ProjectProvider>,
    workspaces: Arc<dyn WorkspaceProvider>,
    builder: Arc<dyn BuildTrigger>,
    events: Arc<dyn EventBus>,
    sequence: AtomicU64,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RunQueue {
    pub fn new(
        config: SchedulerConfig,
        connector: Arc<dyn WorkerConnector>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            pool: WorkerPool::new(connector),
            tasks: Arc::new(DashMap::new()),
            accountant: ResourceAccountant::new(
                config.accounting_partitions,
                config.max_memory_mb,
            ),
            strategy: config.selection_strategy.build(),
            projects: collaborators.projects,
            workspaces: collaborators.workspaces,
            builder: collaborators.builder,
            events: collaborators.events,
            sequence: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
            config,
        }
    }

    /// Start the periodic reclamation sweep
    ///
    /// Each tick also refreshes the runner lists of registered workers.
    pub fn start(self: &Arc<Self>) {
        let reclaimer = Reclaimer::new(
            Arc::clone(&self.tasks),
            Arc::clone(&self.events),
            chrono::Duration::from_std(self.config.cleanup_grace)
                .unwrap_or(chrono::Duration::MAX),
        );
        let queue = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.cleanup_period;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                reclaimer.sweep_at(Utc::now()).await;
                match queue.upgrade() {
                    Some(queue) => queue.pool.refresh().await,
                    None => break,
                }
            }
            tracing::debug!("Reclamation sweep stopped");
        });

        *self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
        tracing::info!(
            "Run queue started (sweep every {:?}, waiting limit {:?})",
            period,
            self.config.max_waiting_time
        );
    }

    /// Stop the sweep, cancel every waiting task and drop all registries
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        let waiting: Vec<Arc<Task>> = self
            .tasks
            .iter()
            .filter(|entry| entry.is_waiting())
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for task in &waiting {
            task.expire("Scheduler is shutting down").await;
        }

        self.tasks.clear();
        self.pool.clear();
        tracing::info!("Run queue shut down, {} waiting tasks cancelled", waiting.len());
    }

    /// Submit a run request
    ///
    /// Resolution and admission failures are returned immediately; anything
    /// after that is reported through the returned task's status.
    pub async fn run(
        self: &Arc<Self>,
        workspace: &str,
        project: &str,
        options: RunOptions,
    ) -> Result<Arc<Task>> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::Unavailable(
                "Run queue is shut down".to_string(),
            ));
        }

        let descriptor = self.projects.project(workspace, project).await?;
        let environment = options
            .environment_id
            .clone()
            .or_else(|| descriptor.runners.default.clone())
            .ok_or_else(|| SchedulerError::NoEnvironment(project.to_string()))?;

        let ws = self.workspaces.workspace(workspace).await?;
        let infra = ws.infra().to_string();
        let environment_id = EnvironmentId::parse(&environment)?;
        let runner = self
            .resolve_runner(&environment_id, &infra, workspace, project)
            .await?;

        let runner_config = descriptor.runners.configs.get(&environment);
        let memory_size_mb = options
            .memory_size_mb
            .filter(|mb| *mb > 0)
            .or_else(|| runner_config.and_then(|config| config.ram_mb))
            .unwrap_or(self.config.default_memory_mb);

        let admission = self.accountant.admit(&ws, memory_size_mb, &self.tasks).await?;

        let lifetime_secs = resolve_lifetime(&ws, self.config.default_lifetime);
        let run_options = if options.options.is_empty() {
            runner_config.map(|c| c.options.clone()).unwrap_or_default()
        } else {
            options.options.clone()
        };
        let variables = if options.variables.is_empty() {
            runner_config.map(|c| c.variables.clone()).unwrap_or_default()
        } else {
            options.variables.clone()
        };
        let build = resolve_build(&descriptor, &options);

        let id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let spec = RunSpecification {
            id,
            workspace: workspace.to_string(),
            project: project.to_string(),
            project_descriptor: descriptor,
            environment_id: environment,
            runner,
            memory_size_mb,
            lifetime_secs,
            debug: options.debug,
            options: run_options,
            variables,
            build_task: None,
        };

        let task = Arc::new(Task::new(
            spec,
            infra,
            ws.account_id.clone(),
            Utc::now(),
            chrono::Duration::from_std(self.config.max_waiting_time)
                .unwrap_or(chrono::Duration::MAX),
        ));
        self.tasks.insert(id, Arc::clone(&task));
        drop(admission);

        tracing::info!(
            "Task {} queued: {}:{} on runner {} with {} MB{}",
            id,
            workspace,
            project,
            task.spec().runner,
            memory_size_mb,
            if build.is_some() { " after build" } else { "" }
        );
        self.publish(&task, RunEventKind::Queued, None);

        tokio::spawn(run_body::execute(Arc::clone(self), Arc::clone(&task), build));
        Ok(task)
    }

    /// Find the runner able to serve `environment`
    async fn resolve_runner(
        &self,
        environment: &EnvironmentId,
        infra: &str,
        workspace: &str,
        project: &str,
    ) -> Result<String> {
        let candidates = self.pool.candidates(infra, workspace, project).await;

        match environment.scope {
            EnvironmentScope::System => {
                for handle in candidates.iter().filter(|h| h.name() == environment.category) {
                    match handle.supports_environment(&environment.name).await {
                        Ok(true) => return Ok(environment.category.clone()),
                        Ok(false) => {}
                        Err(e) => tracing::warn!("Skipping runner on {}: {}", handle.address(), e),
                    }
                }
                Err(SchedulerError::NoRunner(format!(
                    "No runner '{}' offering environment '{}' is available",
                    environment.category, environment
                )))
            }
            EnvironmentScope::Project => {
                let recipes = self
                    .projects
                    .recipes(workspace, project, &environment.name)
                    .await?;
                let runner = infer_runner(&recipes).ok_or_else(|| {
                    SchedulerError::NoRunner(format!(
                        "Cannot determine a runner for environment '{}' from its recipes [{}]",
                        environment,
                        recipes.join(", ")
                    ))
                })?;

                if candidates.iter().any(|h| h.name() == runner) {
                    Ok(runner.to_string())
                } else {
                    Err(SchedulerError::NoRunner(format!(
                        "No runner '{}' for environment '{}' is available",
                        runner, environment
                    )))
                }
            }
        }
    }

    /// Look up a task of `workspace`
    pub fn task(&self, workspace: &str, id: u64) -> Result<Arc<Task>> {
        self.tasks
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|task| task.workspace() == workspace)
            .ok_or_else(|| {
                SchedulerError::NotFound(format!(
                    "Process {} not found in workspace {}",
                    id, workspace
                ))
            })
    }

    pub async fn status(&self, workspace: &str, id: u64) -> Result<ProcessDescriptor> {
        self.task(workspace, id)?
            .descriptor(&self.config.public_url)
            .await
    }

    /// Status of a task that was just admitted
    ///
    /// Falls back to the scheduler's own view when the worker cannot be asked.
    pub async fn describe(&self, task: &Task) -> ProcessDescriptor {
        match task.descriptor(&self.config.public_url).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::debug!("Describing task {} from local state: {}", task.id(), e);
                task.local_snapshot(&self.config.public_url)
            }
        }
    }

    /// Stop a task in any state; stopping twice is harmless
    pub async fn stop(&self, workspace: &str, id: u64) -> Result<ProcessDescriptor> {
        let task = self.task(workspace, id)?;

        if task.stop().await? {
            let kind = if task.is_cancelled() {
                RunEventKind::Cancelled
            } else {
                RunEventKind::Stopped
            };
            tracing::info!("Task {} stopped by request ({})", id, kind);
            self.publish(&task, kind, None);
        }

        task.descriptor(&self.config.public_url).await
    }

    /// Current output of the task's process
    ///
    /// Every returned line is also published as a `log_line` event.
    pub async fn logs(&self, workspace: &str, id: u64) -> Result<String> {
        let task = self.task(workspace, id)?;
        let process = task.process().ok_or_else(|| {
            SchedulerError::Unavailable(format!("Logs are not available, process {} has not started", id))
        })?;

        let logs = process.logs().await?;
        for line in logs.lines() {
            self.publish(&task, RunEventKind::LogLine, Some(line.to_string()));
        }
        Ok(logs)
    }

    /// Recipe the task's process was started from
    pub async fn recipe(&self, workspace: &str, id: u64) -> Result<String> {
        let task = self.task(workspace, id)?;
        let process = task.process().ok_or_else(|| {
            SchedulerError::Unavailable(format!("Recipe is not available, process {} has not started", id))
        })?;
        process.recipe().await
    }

    /// Snapshots of the tasks matching `filter`, oldest first
    ///
    /// Tasks whose remote process vanished are left out.
    pub async fn processes(&self, filter: &ProcessFilter) -> Vec<ProcessDescriptor> {
        let mut tasks: Vec<Arc<Task>> = self
            .tasks
            .iter()
            .filter(|entry| {
                filter.workspace.as_deref().is_none_or(|ws| entry.workspace() == ws)
                    && filter.project.as_deref().is_none_or(|p| entry.project() == p)
                    && filter
                        .account
                        .as_deref()
                        .is_none_or(|account| entry.account_id() == Some(account))
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        tasks.sort_by_key(|task| task.id());

        let mut descriptors = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.descriptor(&self.config.public_url).await {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::warn!("Failed to describe task {}: {}", task.id(), e),
            }
        }
        descriptors
    }

    /// The full task table, oldest first
    pub fn tasks(&self) -> Vec<TaskSummary> {
        let mut summaries: Vec<TaskSummary> =
            self.tasks.iter().map(|entry| entry.summary()).collect();
        summaries.sort_by_key(|summary| summary.id);
        summaries
    }

    pub async fn register_worker(&self, req: RegisterWorker) -> Result<bool> {
        self.pool.register(req).await
    }

    pub fn unregister_worker(&self, address: &str) -> bool {
        self.pool.unregister(address)
    }

    pub async fn workers(&self) -> Vec<WorkerNodeInfo> {
        self.pool.describe().await
    }

    fn publish(&self, task: &Task, kind: RunEventKind, message: Option<String>) {
        let mut event = RunEvent::new(kind, task.id(), task.workspace(), task.project());
        event.message = message;
        self.events.publish(event);
    }
}

/// Runner implied by the first recognized recipe file
fn infer_runner(recipes: &[String]) -> Option<&'static str> {
    recipes.iter().find_map(|recipe| {
        let file_name = recipe.rsplit('/').next().unwrap_or(recipe);
        RECIPE_RUNNERS
            .iter()
            .find(|(name, _)| *name == file_name)
            .map(|(_, runner)| *runner)
    })
}

/// Workspace override, else the default; zero or less means unlimited
fn resolve_lifetime(workspace: &WorkspaceDescriptor, default: Duration) -> u64 {
    match workspace.lifetime_override() {
        Some(secs) if secs <= 0 => UNLIMITED_LIFETIME,
        Some(secs) => secs as u64,
        None if default.is_zero() => UNLIMITED_LIFETIME,
        None => default.as_secs(),
    }
}

/// Build options for the run, or `None` to deploy without building
fn resolve_build(project: &ProjectDescriptor, options: &RunOptions) -> Option<BuildOptions> {
    if options.skip_build {
        return None;
    }

    let mut build = match (&options.build_options, &project.builders.default) {
        (Some(build), _) => build.clone(),
        (None, Some(builder)) => BuildOptions {
            builder_name: Some(builder.clone()),
            ..Default::default()
        },
        (None, None) => return None,
    };
    build.include_dependencies = true;
    build.skip_test = true;
    Some(build)
}
