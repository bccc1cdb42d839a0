//! Remote process handle
//!
//! The live binding to one execution on one worker node. Owned by the task
//! whose run body started it.

use chrono::{DateTime, Utc};
use runq_client::WorkerApi;
use runq_core::domain::process::ProcessDescriptor;
use std::sync::Arc;

use crate::error::{Result, SchedulerError};

pub struct RemoteProcess {
    process_id: u64,
    creation_time: DateTime<Utc>,
    runner: String,
    api: Arc<dyn WorkerApi>,
}

impl RemoteProcess {
    pub fn new(descriptor: &ProcessDescriptor, runner: &str, api: Arc<dyn WorkerApi>) -> Self {
        Self {
            process_id: descriptor.process_id,
            creation_time: descriptor.creation_time,
            runner: runner.to_string(),
            api,
        }
    }

    /// Process id on the worker node (not the scheduler task id)
    pub fn process_id(&self) -> u64 {
        self.process_id
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn runner(&self) -> &str {
        &self.runner
    }

    /// Base URL of the worker node running the process
    pub fn address(&self) -> &str {
        self.api.address()
    }

    pub async fn status(&self) -> Result<ProcessDescriptor> {
        self.api
            .process_status(self.process_id)
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))
    }

    pub async fn stop(&self) -> Result<ProcessDescriptor> {
        tracing::debug!("Stopping process {} on {}", self.process_id, self.address());

        self.api
            .stop_process(self.process_id)
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))
    }

    pub async fn logs(&self) -> Result<String> {
        self.api
            .process_logs(self.process_id)
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))
    }

    pub async fn recipe(&self) -> Result<String> {
        self.api
            .process_recipe(self.process_id)
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))
    }
}

impl std::fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("process_id", &self.process_id)
            .field("address", &self.address())
            .field("runner", &self.runner)
            .finish()
    }
}
