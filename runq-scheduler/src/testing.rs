//! In-memory stand-ins for worker nodes and collaborating services

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runq_client::{ClientError, WorkerApi};
use runq_core::domain::build::{BuildOptions, BuildStatus, BuildTask, LINK_REL_BUILD_LOG};
use runq_core::domain::event::{RunEvent, RunEventKind};
use runq_core::domain::process::{Link, ProcessDescriptor, ProcessStatus};
use runq_core::domain::project::{ProjectDescriptor, WorkspaceDescriptor};
use runq_core::domain::runner::{EnvironmentDescriptor, RunnerDescriptor, RunnerState};
use runq_core::domain::spec::RunSpecification;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::collaborators::{BuildTrigger, Collaborators, ProjectProvider, WorkspaceProvider};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::events::EventBus;
use crate::links;
use crate::pool::WorkerConnector;
use crate::queue::RunQueue;

/// Ordered record of remote calls shared between fakes
pub type Journal = Arc<Mutex<Vec<String>>>;

const DISK_TOTAL: u64 = 100 * 1024 * 1024 * 1024;

pub fn run_spec(id: u64, workspace: &str, memory_size_mb: u64) -> RunSpecification {
    RunSpecification {
        id,
        workspace: workspace.to_string(),
        project: "/app".to_string(),
        project_descriptor: ProjectDescriptor::default(),
        environment_id: "project:/docker/default".to_string(),
        runner: "docker".to_string(),
        memory_size_mb,
        lifetime_secs: 900,
        debug: false,
        options: HashMap::new(),
        variables: HashMap::new(),
        build_task: None,
    }
}

/// Configuration with millisecond polling
pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        public_url: "http://sched".to_string(),
        selection_poll_interval: Duration::from_millis(10),
        build_poll_interval: Duration::from_millis(10),
        cleanup_period: Duration::from_millis(50),
        ..SchedulerConfig::default()
    }
}

struct FakeRunner {
    name: String,
    environments: Vec<String>,
    state: RunnerState,
}

pub struct FakeWorker {
    address: String,
    alive: AtomicBool,
    fail_starts: AtomicBool,
    start_delay: Mutex<Duration>,
    runners: Mutex<Vec<FakeRunner>>,
    processes: Mutex<HashMap<u64, ProcessDescriptor>>,
    next_process: AtomicU64,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    started: Mutex<Vec<RunSpecification>>,
    journal: Mutex<Option<Journal>>,
}

impl FakeWorker {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            alive: AtomicBool::new(true),
            fail_starts: AtomicBool::new(false),
            start_delay: Mutex::new(Duration::ZERO),
            runners: Mutex::new(Vec::new()),
            processes: Mutex::new(HashMap::new()),
            next_process: AtomicU64::new(100),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            journal: Mutex::new(None),
        })
    }

    /// Add (or replace) a runner with 10% of its disk used
    pub fn add_runner(
        &self,
        name: &str,
        environments: &[&str],
        free_memory_mb: u64,
        last_usage_time: Option<DateTime<Utc>>,
    ) {
        let mut runners = self.runners.lock().unwrap();
        runners.retain(|runner| runner.name != name);
        runners.push(FakeRunner {
            name: name.to_string(),
            environments: environments.iter().map(|env| env.to_string()).collect(),
            state: RunnerState {
                free_memory_mb,
                total_memory_mb: free_memory_mb.max(1024),
                total_disk_bytes: DISK_TOTAL,
                used_disk_bytes: DISK_TOTAL / 10,
                last_usage_time,
            },
        });
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Make every start call take this long before the process exists
    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = delay;
    }

    pub fn set_free_memory(&self, runner: &str, free_memory_mb: u64) {
        self.with_runner(runner, |r| r.state.free_memory_mb = free_memory_mb);
    }

    pub fn set_disk(&self, runner: &str, total_bytes: u64, used_bytes: u64) {
        self.with_runner(runner, |r| {
            r.state.total_disk_bytes = total_bytes;
            r.state.used_disk_bytes = used_bytes;
        });
    }

    /// Make `start` report a FAILED process
    pub fn fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    pub fn set_journal(&self, journal: &Journal) {
        *self.journal.lock().unwrap() = Some(Arc::clone(journal));
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn started_specs(&self) -> Vec<RunSpecification> {
        self.started.lock().unwrap().clone()
    }

    pub fn set_process_status(&self, process_id: u64, status: ProcessStatus) {
        if let Some(process) = self.processes.lock().unwrap().get_mut(&process_id) {
            process.status = status;
        }
    }

    pub fn remove_process(&self, process_id: u64) {
        self.processes.lock().unwrap().remove(&process_id);
    }

    fn with_runner(&self, name: &str, f: impl FnOnce(&mut FakeRunner)) {
        if let Some(runner) = self.runners.lock().unwrap().iter_mut().find(|r| r.name == name) {
            f(runner);
        }
    }

    fn record(&self, call: String) {
        if let Some(journal) = self.journal.lock().unwrap().as_ref() {
            journal.lock().unwrap().push(call);
        }
    }

    fn check_alive(&self) -> runq_client::Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::api_error(503, format!("{} is offline", self.address)))
        }
    }

    fn runner<T>(&self, name: &str, f: impl FnOnce(&FakeRunner) -> T) -> runq_client::Result<T> {
        self.runners
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == name)
            .map(f)
            .ok_or_else(|| ClientError::api_error(404, format!("Runner {} not found", name)))
    }

    fn process(&self, process_id: u64) -> runq_client::Result<ProcessDescriptor> {
        self.processes
            .lock()
            .unwrap()
            .get(&process_id)
            .cloned()
            .ok_or_else(|| ClientError::api_error(404, format!("Process {} not found", process_id)))
    }
}

#[async_trait]
impl WorkerApi for FakeWorker {
    fn address(&self) -> &str {
        &self.address
    }

    async fn ping(&self) -> runq_client::Result<()> {
        self.check_alive()
    }

    async fn runners(&self) -> runq_client::Result<Vec<RunnerDescriptor>> {
        self.check_alive()?;
        Ok(self
            .runners
            .lock()
            .unwrap()
            .iter()
            .map(|r| RunnerDescriptor {
                name: r.name.clone(),
                description: None,
            })
            .collect())
    }

    async fn environments(&self, runner: &str) -> runq_client::Result<Vec<EnvironmentDescriptor>> {
        self.check_alive()?;
        self.runner(runner, |r| {
            r.environments
                .iter()
                .map(|name| EnvironmentDescriptor {
                    name: name.clone(),
                    description: None,
                })
                .collect()
        })
    }

    async fn runner_state(&self, runner: &str) -> runq_client::Result<RunnerState> {
        self.check_alive()?;
        self.record(format!("state {} {}", self.address, runner));
        self.runner(runner, |r| r.state.clone())
    }

    async fn start(
        &self,
        runner: &str,
        spec: &RunSpecification,
    ) -> runq_client::Result<ProcessDescriptor> {
        self.check_alive()?;
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("start {} {}", self.address, runner));
        self.started.lock().unwrap().push(spec.clone());

        let delay = *self.start_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let process_id = self.next_process.fetch_add(1, Ordering::SeqCst);
        let failed = self.fail_starts.load(Ordering::SeqCst);
        let base = format!("{}/processes/{}", self.address, process_id);
        let descriptor = ProcessDescriptor {
            process_id,
            status: if failed {
                ProcessStatus::Failed
            } else {
                ProcessStatus::Running
            },
            creation_time: Utc::now(),
            start_time: Some(Utc::now()),
            stop_time: None,
            workspace: Some(spec.workspace.clone()),
            project: Some(spec.project.clone()),
            memory_size_mb: Some(spec.memory_size_mb),
            environment_id: Some(spec.environment_id.clone()),
            runner: Some(runner.to_string()),
            server_url: Some(self.address.clone()),
            stats: Vec::new(),
            build_stats: Vec::new(),
            links: vec![
                Link::new(links::REL_STATUS, "GET", base.clone()),
                Link::new(links::REL_STOP, "POST", format!("{}/stop", base)),
                Link::new(links::REL_LOGS, "GET", format!("{}/logs", base)),
                Link::new(
                    links::REL_WEB_URL,
                    "GET",
                    format!("http://app-{}.example.com", process_id),
                ),
            ],
            error: failed.then(|| "out of disk".to_string()),
        };

        self.processes
            .lock()
            .unwrap()
            .insert(process_id, descriptor.clone());
        self.set_free_memory(
            runner,
            self.runner(runner, |r| r.state.free_memory_mb)?
                .saturating_sub(spec.memory_size_mb),
        );
        Ok(descriptor)
    }

    async fn process_status(&self, process_id: u64) -> runq_client::Result<ProcessDescriptor> {
        self.check_alive()?;
        self.process(process_id)
    }

    async fn stop_process(&self, process_id: u64) -> runq_client::Result<ProcessDescriptor> {
        self.check_alive()?;
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("stop {} {}", self.address, process_id));
        self.set_process_status(process_id, ProcessStatus::Stopped);
        self.process(process_id)
    }

    async fn process_logs(&self, process_id: u64) -> runq_client::Result<String> {
        self.check_alive()?;
        self.process(process_id)?;
        Ok(format!("[STDOUT] process {} started\n[STDOUT] listening on 8080\n", process_id))
    }

    async fn process_recipe(&self, process_id: u64) -> runq_client::Result<String> {
        self.check_alive()?;
        self.process(process_id)?;
        Ok("FROM busybox\nCMD [\"httpd\"]\n".to_string())
    }
}

/// Hands out registered fake workers by address
#[derive(Default)]
pub struct FakeConnector {
    workers: Mutex<HashMap<String, Arc<FakeWorker>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, worker: Arc<FakeWorker>) {
        self.workers
            .lock()
            .unwrap()
            .insert(worker.address.clone(), worker);
    }
}

impl WorkerConnector for FakeConnector {
    fn connect(&self, address: &str) -> Arc<dyn WorkerApi> {
        match self.workers.lock().unwrap().get(address) {
            Some(worker) => Arc::clone(worker) as Arc<dyn WorkerApi>,
            None => {
                let offline = FakeWorker::new(address);
                offline.set_alive(false);
                offline
            }
        }
    }
}

#[derive(Default)]
pub struct FakeProjects {
    projects: Mutex<HashMap<String, ProjectDescriptor>>,
    recipes: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeProjects {
    pub fn add(&self, project: ProjectDescriptor) {
        self.projects
            .lock()
            .unwrap()
            .insert(project.path.clone(), project);
    }

    /// Recipe file names declared for the environment named `environment`
    pub fn add_recipes(&self, environment: &str, files: &[&str]) {
        self.recipes.lock().unwrap().insert(
            environment.to_string(),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }
}

#[async_trait]
impl ProjectProvider for FakeProjects {
    async fn project(&self, _workspace: &str, project: &str) -> Result<ProjectDescriptor> {
        self.projects
            .lock()
            .unwrap()
            .get(project)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(format!("Project {} not found", project)))
    }

    async fn recipes(
        &self,
        _workspace: &str,
        _project: &str,
        environment: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .recipes
            .lock()
            .unwrap()
            .get(environment)
            .cloned()
            .unwrap_or_default())
    }
}

/// Unknown workspaces resolve to a descriptor without attributes
#[derive(Default)]
pub struct FakeWorkspaces {
    workspaces: Mutex<HashMap<String, WorkspaceDescriptor>>,
}

impl FakeWorkspaces {
    pub fn add(&self, workspace: WorkspaceDescriptor) {
        self.workspaces
            .lock()
            .unwrap()
            .insert(workspace.id.clone(), workspace);
    }
}

#[async_trait]
impl WorkspaceProvider for FakeWorkspaces {
    async fn workspace(&self, workspace: &str) -> Result<WorkspaceDescriptor> {
        Ok(self
            .workspaces
            .lock()
            .unwrap()
            .get(workspace)
            .cloned()
            .unwrap_or_else(|| WorkspaceDescriptor::new(workspace)))
    }
}

/// Builder that walks through a scripted sequence of statuses
///
/// The last status repeats forever.
#[derive(Default)]
pub struct FakeBuilder {
    statuses: Mutex<VecDeque<BuildStatus>>,
    triggers: AtomicUsize,
    cancels: AtomicUsize,
    options: Mutex<Vec<BuildOptions>>,
    journal: Mutex<Option<Journal>>,
}

impl FakeBuilder {
    pub fn script(&self, statuses: &[BuildStatus]) {
        *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
    }

    pub fn set_journal(&self, journal: &Journal) {
        *self.journal.lock().unwrap() = Some(Arc::clone(journal));
    }

    pub fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<BuildOptions> {
        self.options.lock().unwrap().last().cloned()
    }

    fn record(&self, call: &str) {
        if let Some(journal) = self.journal.lock().unwrap().as_ref() {
            journal.lock().unwrap().push(call.to_string());
        }
    }

    fn task(status: BuildStatus) -> BuildTask {
        BuildTask {
            task_id: 1,
            status,
            start_time: None,
            end_time: None,
            links: vec![Link::new(
                LINK_REL_BUILD_LOG,
                "GET",
                "http://builder/builds/1/log",
            )],
        }
    }
}

#[async_trait]
impl BuildTrigger for FakeBuilder {
    async fn build(
        &self,
        _workspace: &str,
        _project: &str,
        options: &BuildOptions,
    ) -> Result<BuildTask> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(options.clone());
        self.record("build");
        Ok(Self::task(BuildStatus::InQueue))
    }

    async fn status(&self, _workspace: &str, _task_id: u64) -> Result<BuildTask> {
        self.record("build status");
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().copied()
        };
        Ok(Self::task(status.unwrap_or(BuildStatus::InProgress)))
    }

    async fn cancel(&self, _workspace: &str, _task_id: u64) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.record("build cancel");
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingEventBus {
    pub fn kinds(&self, task_id: u64) -> Vec<RunEventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.task_id == task_id)
            .map(|event| event.kind)
            .collect()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventBus for RecordingEventBus {
    fn publish(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A run queue wired to fakes, with handles on every fake
pub struct Harness {
    pub connector: Arc<FakeConnector>,
    pub projects: Arc<FakeProjects>,
    pub workspaces: Arc<FakeWorkspaces>,
    pub builder: Arc<FakeBuilder>,
    pub events: Arc<RecordingEventBus>,
    pub journal: Journal,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        let builder = Arc::new(FakeBuilder::default());
        builder.set_journal(&journal);

        Self {
            connector: Arc::new(FakeConnector::new()),
            projects: Arc::new(FakeProjects::default()),
            workspaces: Arc::new(FakeWorkspaces::default()),
            builder,
            events: Arc::new(RecordingEventBus::default()),
            journal,
        }
    }

    /// A reachable worker known to the connector, recording into the journal
    pub fn worker(&self, address: &str) -> Arc<FakeWorker> {
        let worker = FakeWorker::new(address);
        worker.set_journal(&self.journal);
        self.connector.add(Arc::clone(&worker));
        worker
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            projects: self.projects.clone(),
            workspaces: self.workspaces.clone(),
            builder: self.builder.clone(),
            events: self.events.clone(),
        }
    }

    pub fn queue(&self, config: SchedulerConfig) -> Arc<RunQueue> {
        Arc::new(RunQueue::new(
            config,
            self.connector.clone(),
            self.collaborators(),
        ))
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}
