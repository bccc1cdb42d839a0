//! Scheduler task
//!
//! One admitted run request, from admission until the reclaimer forgets it.
//!
//! A task carries two independent flags: `user_stopped` records an explicit
//! stop by a caller, `execution_cancelled` records that the run body was
//! interrupted by the scheduler. Status rendering combines them with the run
//! body's outcome, which is assigned exactly once.

use chrono::{DateTime, Utc};
use runq_core::domain::build::BuildTask;
use runq_core::domain::process::{ProcessDescriptor, ProcessStatus, Stat};
use runq_core::domain::spec::RunSpecification;
use runq_core::dto::task::{TaskPhase, TaskSummary};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SchedulerError};
use crate::links;
use crate::pool::RemoteProcess;

/// How the run body ended
#[derive(Debug)]
pub enum TaskOutcome {
    /// A remote process was started
    Started(Arc<RemoteProcess>),
    /// The run body was interrupted before any process existed
    Abandoned,
    /// The build failed or the start call was rejected
    Failed(String),
}

pub struct Task {
    id: u64,
    spec: RunSpecification,
    infra: String,
    account_id: Option<String>,
    creation_time: DateTime<Utc>,
    waiting_timeout: DateTime<Utc>,
    phase: AtomicU8,
    outcome: OnceLock<TaskOutcome>,
    user_stopped: AtomicBool,
    execution_cancelled: AtomicBool,
    cancel: CancellationToken,
    cancel_reason: OnceLock<String>,
    build: Mutex<Option<BuildTask>>,
    /// Orders outcome assignment against cancellation
    handoff: Mutex<()>,
    done: watch::Sender<bool>,
}

impl Task {
    pub fn new(
        spec: RunSpecification,
        infra: impl Into<String>,
        account_id: Option<String>,
        creation_time: DateTime<Utc>,
        max_waiting_time: chrono::Duration,
    ) -> Self {
        let waiting_timeout = creation_time
            .checked_add_signed(max_waiting_time)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let (done, _) = watch::channel(false);

        Self {
            id: spec.id,
            spec,
            infra: infra.into(),
            account_id,
            creation_time,
            waiting_timeout,
            phase: AtomicU8::new(encode(TaskPhase::Waiting)),
            outcome: OnceLock::new(),
            user_stopped: AtomicBool::new(false),
            execution_cancelled: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            cancel_reason: OnceLock::new(),
            build: Mutex::new(None),
            handoff: Mutex::new(()),
            done,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn spec(&self) -> &RunSpecification {
        &self.spec
    }

    pub fn workspace(&self) -> &str {
        &self.spec.workspace
    }

    pub fn project(&self) -> &str {
        &self.spec.project
    }

    pub fn infra(&self) -> &str {
        &self.infra
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn waiting_timeout(&self) -> DateTime<Utc> {
        self.waiting_timeout
    }

    /// Token the run body races its sleeps and wire calls against
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True until the run body has produced its outcome
    pub fn is_waiting(&self) -> bool {
        self.outcome.get().is_none()
    }

    pub fn is_stopped(&self) -> bool {
        self.user_stopped.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.execution_cancelled.load(Ordering::SeqCst)
    }

    pub fn process(&self) -> Option<&Arc<RemoteProcess>> {
        match self.outcome.get() {
            Some(TaskOutcome::Started(process)) => Some(process),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self.outcome.get() {
            Some(TaskOutcome::Failed(message)) => Some(message),
            _ => None,
        }
    }

    pub fn build(&self) -> Option<BuildTask> {
        self.build
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn attach_build(&self, build: BuildTask) {
        *self
            .build
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(build);
    }

    pub(crate) fn set_phase(&self, phase: TaskPhase) {
        self.phase.store(encode(phase), Ordering::SeqCst);
    }

    pub fn phase(&self) -> TaskPhase {
        match self.outcome.get() {
            Some(TaskOutcome::Started(_)) if self.is_stopped() => TaskPhase::Stopped,
            Some(TaskOutcome::Started(_)) if self.is_cancelled() => TaskPhase::Cancelled,
            Some(TaskOutcome::Started(_)) => TaskPhase::Running,
            Some(TaskOutcome::Failed(_)) => TaskPhase::Error,
            Some(TaskOutcome::Abandoned) | None if self.is_stopped() => TaskPhase::Stopped,
            Some(TaskOutcome::Abandoned) => TaskPhase::Cancelled,
            None if self.is_cancelled() => TaskPhase::Cancelled,
            None => decode(self.phase.load(Ordering::SeqCst)),
        }
    }

    /// Record the run body's outcome; only the first call has an effect
    ///
    /// A cancel that lands after this call finds the process and stops it. A
    /// cancel that landed before it has already tripped the token, so the
    /// run body must check `cancellation()` once the outcome is recorded.
    pub(crate) fn complete(&self, outcome: TaskOutcome) -> bool {
        let assigned = {
            let _handoff = self
                .handoff
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.outcome.set(outcome).is_ok()
        };
        self.done.send_replace(true);
        assigned
    }

    /// Wait until the run body has produced its outcome
    pub async fn wait(&self) {
        let mut receiver = self.done.subscribe();
        let _ = receiver.wait_for(|done| *done).await;
    }

    /// Explicit caller stop
    ///
    /// Returns `false` when the task was already stopped.
    pub async fn stop(&self) -> Result<bool> {
        if self
            .user_stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        self.cancel().await?;
        Ok(true)
    }

    /// Interrupt the run body, or stop the remote process once one exists
    pub async fn cancel(&self) -> Result<()> {
        let process = {
            let _handoff = self
                .handoff
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let process = self.process().cloned();
            if process.is_none() {
                self.execution_cancelled.store(true, Ordering::SeqCst);
                self.cancel.cancel();
            }
            process
        };

        match process {
            Some(process) => match process.stop().await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e),
            },
            None => Ok(()),
        }
    }

    /// Cancel a task that waited too long for a runner
    pub(crate) async fn expire(&self, reason: &str) {
        let _ = self.cancel_reason.set(reason.to_string());
        if let Err(e) = self.cancel().await {
            tracing::warn!("Failed to cancel task {}: {}", self.id, e);
        }
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.get().map(String::as_str)
    }

    pub fn waiting_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_waiting() && now >= self.waiting_timeout
    }

    /// Whether the task's memory still counts against its workspace
    ///
    /// Waiting tasks always count. Running tasks count while their remote
    /// process is NEW or RUNNING; a process the worker no longer knows is
    /// gone. A probe that fails for any other reason counts the task.
    pub async fn holds_memory(&self) -> bool {
        if self.is_waiting() {
            return true;
        }
        let Some(process) = self.process() else {
            return false;
        };

        match process.status().await {
            Ok(descriptor) => descriptor.status.is_active(),
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!(
                    "Could not probe process of task {}, counting its memory: {}",
                    self.id,
                    e
                );
                true
            }
        }
    }

    /// Status snapshot as seen by callers
    pub async fn descriptor(&self, base_url: &str) -> Result<ProcessDescriptor> {
        if let Some(process) = self.process() {
            return self.remote_descriptor(process, base_url).await;
        }

        let mut descriptor = self.local_descriptor();
        if self.is_stopped() {
            descriptor.status = ProcessStatus::Stopped;
            descriptor.links = links::local_links(base_url, self.id, self.workspace(), false);
        } else if let Some(message) = self.error() {
            descriptor.status = ProcessStatus::Failed;
            descriptor.error = Some(message.to_string());
            descriptor.links = links::local_links(base_url, self.id, self.workspace(), false);
        } else if self.is_cancelled() || !self.is_waiting() {
            descriptor.status = ProcessStatus::Cancelled;
            descriptor.error = self.cancel_reason().map(str::to_string);
            descriptor.links = links::local_links(base_url, self.id, self.workspace(), false);
        } else {
            descriptor.stats = self.waiting_stats();
            descriptor.links = links::local_links(base_url, self.id, self.workspace(), true);
        }
        Ok(descriptor)
    }

    async fn remote_descriptor(
        &self,
        process: &RemoteProcess,
        base_url: &str,
    ) -> Result<ProcessDescriptor> {
        let remote = process.status().await.map_err(|e| {
            if e.is_not_found() {
                SchedulerError::NotFound(format!("Process of task {} is gone", self.id))
            } else {
                e
            }
        })?;

        let mut descriptor = self.local_descriptor();
        descriptor.status = remote.status;
        descriptor.creation_time = remote.creation_time;
        descriptor.start_time = remote.start_time;
        descriptor.stop_time = remote.stop_time;
        descriptor.runner = Some(process.runner().to_string());
        descriptor.server_url = remote
            .server_url
            .or_else(|| Some(process.address().to_string()));
        descriptor.stats = remote.stats;
        descriptor.links = links::rewrite_links(base_url, self.id, self.workspace(), &remote.links);
        descriptor.error = remote.error;
        Ok(descriptor)
    }

    /// Snapshot built from local state only, for when the worker cannot be asked
    pub fn local_snapshot(&self, base_url: &str) -> ProcessDescriptor {
        let mut descriptor = self.local_descriptor();
        descriptor.status = match self.phase() {
            TaskPhase::Running => ProcessStatus::Running,
            TaskPhase::Stopped => ProcessStatus::Stopped,
            TaskPhase::Cancelled => ProcessStatus::Cancelled,
            TaskPhase::Error => ProcessStatus::Failed,
            TaskPhase::Waiting | TaskPhase::ResolvingBuild | TaskPhase::SelectingRunner => {
                ProcessStatus::New
            }
        };
        if let Some(process) = self.process() {
            descriptor.runner = Some(process.runner().to_string());
            descriptor.server_url = Some(process.address().to_string());
        }
        descriptor.error = self
            .error()
            .or_else(|| self.cancel_reason())
            .map(str::to_string);
        descriptor.links = links::local_links(
            base_url,
            self.id,
            self.workspace(),
            descriptor.status.is_active(),
        );
        descriptor
    }

    fn local_descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor {
            process_id: self.id,
            status: ProcessStatus::New,
            creation_time: self.creation_time,
            start_time: None,
            stop_time: None,
            workspace: Some(self.spec.workspace.clone()),
            project: Some(self.spec.project.clone()),
            memory_size_mb: Some(self.spec.memory_size_mb),
            environment_id: Some(self.spec.environment_id.clone()),
            runner: Some(self.spec.runner.clone()),
            server_url: None,
            stats: Vec::new(),
            build_stats: self.build_stats(),
            links: Vec::new(),
            error: None,
        }
    }

    fn waiting_stats(&self) -> Vec<Stat> {
        let lifetime = if self.spec.has_unlimited_lifetime() {
            "unlimited".to_string()
        } else {
            format!("{} sec", self.spec.lifetime_secs)
        };

        vec![
            Stat::new("waiting time limit", self.waiting_timeout.to_rfc3339())
                .described("Time after which the application stops waiting for resources"),
            Stat::new("lifetime", lifetime)
                .described("Time after which the application is terminated"),
        ]
    }

    fn build_stats(&self) -> Vec<Stat> {
        let Some(build) = self.build() else {
            return Vec::new();
        };

        let mut stats = vec![
            Stat::new("build task", build.task_id.to_string()),
            Stat::new("build status", format!("{:?}", build.status)),
        ];
        if let Some(url) = build.log_url() {
            stats.push(Stat::new("build log", url));
        }
        stats
    }

    pub fn summary(&self) -> TaskSummary {
        let process = self.process();
        TaskSummary {
            id: self.id,
            workspace: self.spec.workspace.clone(),
            project: self.spec.project.clone(),
            environment_id: self.spec.environment_id.clone(),
            runner: self.spec.runner.clone(),
            memory_size_mb: self.spec.memory_size_mb,
            creation_time: self.creation_time,
            phase: self.phase(),
            stopped: self.is_stopped(),
            process_id: process.map(|p| p.process_id()),
            server_url: process.map(|p| p.address().to_string()),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("workspace", &self.spec.workspace)
            .field("project", &self.spec.project)
            .field("phase", &self.phase())
            .finish()
    }
}

fn encode(phase: TaskPhase) -> u8 {
    match phase {
        TaskPhase::Waiting => 0,
        TaskPhase::ResolvingBuild => 1,
        TaskPhase::SelectingRunner => 2,
        TaskPhase::Running => 3,
        TaskPhase::Stopped => 4,
        TaskPhase::Cancelled => 5,
        TaskPhase::Error => 6,
    }
}

fn decode(value: u8) -> TaskPhase {
    match value {
        1 => TaskPhase::ResolvingBuild,
        2 => TaskPhase::SelectingRunner,
        3 => TaskPhase::Running,
        4 => TaskPhase::Stopped,
        5 => TaskPhase::Cancelled,
        6 => TaskPhase::Error,
        _ => TaskPhase::Waiting,
    }
}
