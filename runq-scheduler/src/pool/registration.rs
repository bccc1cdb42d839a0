//! Worker registration
//!
//! One registered worker node: its address, what it is dedicated to and the
//! runners it offers.

use chrono::{DateTime, Utc};
use runq_client::WorkerApi;
use runq_core::domain::runner::WorkerStatus;
use runq_core::dto::worker::{RunnerInfo, WorkerNodeInfo};
use std::sync::Arc;

use crate::error::{Result, SchedulerError};
use crate::pool::handle::RunnerHandle;

/// Bucket key of the worker pool
///
/// `None` means "not dedicated"; `(infra, None, None)` is the shared pool of
/// an infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub infra: String,
    pub workspace: Option<String>,
    pub project: Option<String>,
}

impl PoolKey {
    pub fn new(infra: &str, workspace: Option<&str>, project: Option<&str>) -> Self {
        Self {
            infra: infra.to_string(),
            workspace: workspace.map(str::to_string),
            project: project.map(str::to_string),
        }
    }

    /// Keys to search for a request, most specific first
    pub fn lookup_order(infra: &str, workspace: &str, project: &str) -> [PoolKey; 3] {
        [
            PoolKey::new(infra, Some(workspace), Some(project)),
            PoolKey::new(infra, Some(workspace), None),
            PoolKey::new(infra, None, None),
        ]
    }
}

pub struct WorkerRegistration {
    api: Arc<dyn WorkerApi>,
    key: PoolKey,
    registered_at: DateTime<Utc>,
}

impl WorkerRegistration {
    pub fn new(api: Arc<dyn WorkerApi>, key: PoolKey) -> Self {
        Self {
            api,
            key,
            registered_at: Utc::now(),
        }
    }

    pub fn address(&self) -> &str {
        self.api.address()
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub async fn is_alive(&self) -> bool {
        match self.api.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Worker {} failed liveness probe: {}", self.address(), e);
                false
            }
        }
    }

    /// Fetch the runners currently offered by the node
    pub async fn runner_handles(&self) -> Result<Vec<RunnerHandle>> {
        let runners = self
            .api
            .runners()
            .await
            .map_err(|e| SchedulerError::worker(self.address(), e))?;

        Ok(runners
            .into_iter()
            .map(|runner| RunnerHandle::new(runner.name, runner.description, Arc::clone(&self.api)))
            .collect())
    }

    /// Describe the node and the live state of each runner for the admin surface
    pub async fn describe(&self) -> WorkerNodeInfo {
        let alive = self.is_alive().await;

        let mut runners = Vec::new();
        if alive {
            match self.runner_handles().await {
                Ok(handles) => {
                    for handle in handles {
                        let state = handle.live_state().await.ok();
                        runners.push(RunnerInfo {
                            name: handle.name().to_string(),
                            description: handle.description().map(str::to_string),
                            state,
                        });
                    }
                }
                Err(e) => tracing::warn!("Failed to list runners of {}: {}", self.address(), e),
            }
        }

        WorkerNodeInfo {
            address: self.address().to_string(),
            infra: self.key.infra.clone(),
            workspace: self.key.workspace.clone(),
            project: self.key.project.clone(),
            status: if alive {
                WorkerStatus::Online
            } else {
                WorkerStatus::Offline
            },
            runners,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_order_is_most_specific_first() {
        let keys = PoolKey::lookup_order("community", "ws1", "/app");
        assert_eq!(keys[0], PoolKey::new("community", Some("ws1"), Some("/app")));
        assert_eq!(keys[1], PoolKey::new("community", Some("ws1"), None));
        assert_eq!(keys[2], PoolKey::new("community", None, None));
    }
}
