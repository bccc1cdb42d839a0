//! Runner handle
//!
//! A typed reference to one named runner on one worker node. Handles are
//! recreated on every registry refresh, so identity is `(address, name)`.

use chrono::{DateTime, TimeZone, Utc};
use runq_client::WorkerApi;
use runq_core::domain::process::ProcessStatus;
use runq_core::domain::runner::RunnerState;
use runq_core::domain::spec::RunSpecification;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{Result, SchedulerError};
use crate::pool::process::RemoteProcess;

const NEVER_USED: i64 = i64::MIN;

#[derive(Clone)]
pub struct RunnerHandle {
    name: String,
    description: Option<String>,
    api: Arc<dyn WorkerApi>,
    /// Milliseconds since the epoch, as last reported by the worker
    last_usage: Arc<AtomicI64>,
}

impl RunnerHandle {
    pub fn new(name: impl Into<String>, description: Option<String>, api: Arc<dyn WorkerApi>) -> Self {
        Self {
            name: name.into(),
            description,
            api,
            last_usage: Arc::new(AtomicI64::new(NEVER_USED)),
        }
    }

    /// Base URL of the worker node offering this runner
    pub fn address(&self) -> &str {
        self.api.address()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether the runner's environment catalog lists `environment`
    pub async fn supports_environment(&self, environment: &str) -> Result<bool> {
        let environments = self
            .api
            .environments(&self.name)
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))?;

        Ok(environments.iter().any(|env| env.name == environment))
    }

    /// Fetch the runner's live resource state
    ///
    /// Also refreshes [`RunnerHandle::last_usage_time`].
    pub async fn live_state(&self) -> Result<RunnerState> {
        let state = self
            .api
            .runner_state(&self.name)
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))?;

        let millis = state
            .last_usage_time
            .map(|time| time.timestamp_millis())
            .unwrap_or(NEVER_USED);
        self.last_usage.store(millis, Ordering::Relaxed);

        Ok(state)
    }

    /// Ask the worker to start `spec` on this runner
    pub async fn start(&self, spec: &RunSpecification) -> Result<RemoteProcess> {
        let descriptor = self
            .api
            .start(&self.name, spec)
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))?;

        if descriptor.status == ProcessStatus::Failed {
            return Err(SchedulerError::StartFailed(format!(
                "Runner '{}' on {} failed to start the application: {}",
                self.name,
                self.address(),
                descriptor.error.as_deref().unwrap_or("unknown error")
            )));
        }

        Ok(RemoteProcess::new(&descriptor, &self.name, Arc::clone(&self.api)))
    }

    /// Last time the runner started an application, if it ever did
    pub fn last_usage_time(&self) -> Option<DateTime<Utc>> {
        match self.last_usage.load(Ordering::Relaxed) {
            NEVER_USED => None,
            millis => Utc.timestamp_millis_opt(millis).single(),
        }
    }
}

impl PartialEq for RunnerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address() && self.name == other.name
    }
}

impl Eq for RunnerHandle {}

impl Hash for RunnerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
        self.name.hash(state);
    }
}

impl std::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("address", &self.address())
            .field("name", &self.name)
            .finish()
    }
}
