//! Resource accountant
//!
//! Admission control by workspace memory. Committed memory is recomputed from
//! the live task table on every admission instead of being reserved, so tasks
//! that vanish without bookkeeping never leak capacity.
//!
//! Workspaces hash onto a fixed array of locks. Admissions for one workspace
//! are serialized; unrelated workspaces only contend when they collide.

use dashmap::DashMap;
use runq_core::domain::project::WorkspaceDescriptor;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, SchedulerError};
use crate::task::Task;

/// A granted admission
///
/// Holds the workspace's partition lock. The caller must register its task
/// before dropping it so the next admission sees the new commitment.
#[derive(Debug)]
pub struct Admission {
    _guard: OwnedMutexGuard<()>,
    pub committed_mb: u64,
    pub ceiling_mb: u64,
}

pub struct ResourceAccountant {
    partitions: Vec<Arc<Mutex<()>>>,
    default_ceiling_mb: u64,
}

impl ResourceAccountant {
    pub fn new(partitions: usize, default_ceiling_mb: u64) -> Self {
        Self {
            partitions: (0..partitions.max(1))
                .map(|_| Arc::new(Mutex::new(())))
                .collect(),
            default_ceiling_mb,
        }
    }

    fn partition(&self, workspace: &str) -> Arc<Mutex<()>> {
        let mut hasher = DefaultHasher::new();
        workspace.hash(&mut hasher);
        let index = (hasher.finish() % self.partitions.len() as u64) as usize;
        Arc::clone(&self.partitions[index])
    }

    /// Admit `requested_mb` for `workspace` or explain why not
    pub async fn admit(
        &self,
        workspace: &WorkspaceDescriptor,
        requested_mb: u64,
        tasks: &DashMap<u64, Arc<Task>>,
    ) -> Result<Admission> {
        let guard = self.partition(&workspace.id).lock_owned().await;

        if workspace.resources_locked() {
            return Err(SchedulerError::ResourcesLocked(workspace.id.clone()));
        }

        let ceiling_mb = workspace.max_memory_mb().unwrap_or(self.default_ceiling_mb);

        let live: Vec<Arc<Task>> = tasks
            .iter()
            .filter(|entry| entry.workspace() == workspace.id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut committed_mb = 0u64;
        for task in live {
            if task.holds_memory().await {
                committed_mb = committed_mb.saturating_add(task.spec().memory_size_mb);
            }
        }

        let available_mb = ceiling_mb.saturating_sub(committed_mb);
        if available_mb < requested_mb {
            tracing::info!(
                "Rejected {} MB for workspace {}: {} of {} MB committed",
                requested_mb,
                workspace.id,
                committed_mb,
                ceiling_mb
            );
            return Err(SchedulerError::NotEnoughMemory {
                requested_mb,
                available_mb,
                ceiling_mb,
            });
        }

        Ok(Admission {
            _guard: guard,
            committed_mb,
            ceiling_mb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run_spec;
    use chrono::Utc;
    use runq_core::domain::project::{ATTR_MAX_MEMORY, ATTR_RESOURCES_LOCKED};

    fn waiting_task(id: u64, workspace: &str, memory_mb: u64) -> Arc<Task> {
        Arc::new(Task::new(
            run_spec(id, workspace, memory_mb),
            "community",
            None,
            Utc::now(),
            chrono::Duration::minutes(10),
        ))
    }

    #[tokio::test]
    async fn test_rejection_names_requested_and_available() {
        let accountant = ResourceAccountant::new(16, 1024);
        let tasks = DashMap::new();
        tasks.insert(1, waiting_task(1, "ws1", 600));

        let workspace = WorkspaceDescriptor::new("ws1").with_attribute(ATTR_MAX_MEMORY, "1000");
        let err = accountant.admit(&workspace, 512, &tasks).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("512"), "{}", message);
        assert!(message.contains("400"), "{}", message);
    }

    #[tokio::test]
    async fn test_other_workspaces_do_not_count() {
        let accountant = ResourceAccountant::new(16, 1024);
        let tasks = DashMap::new();
        tasks.insert(1, waiting_task(1, "ws2", 1000));

        let admission = accountant
            .admit(&WorkspaceDescriptor::new("ws1"), 1024, &tasks)
            .await
            .unwrap();
        assert_eq!(admission.committed_mb, 0);
        assert_eq!(admission.ceiling_mb, 1024);
    }

    #[tokio::test]
    async fn test_locked_workspace_is_rejected() {
        let accountant = ResourceAccountant::new(16, 1024);
        let workspace =
            WorkspaceDescriptor::new("ws1").with_attribute(ATTR_RESOURCES_LOCKED, "true");

        let err = accountant
            .admit(&workspace, 1, &DashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ResourcesLocked(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_stay_under_ceiling() {
        let accountant = Arc::new(ResourceAccountant::new(1, 1000));
        let tasks = Arc::new(DashMap::new());
        let workspace = WorkspaceDescriptor::new("ws1");

        let mut handles = Vec::new();
        for id in 1..=8u64 {
            let accountant = Arc::clone(&accountant);
            let tasks = Arc::clone(&tasks);
            let workspace = workspace.clone();
            handles.push(tokio::spawn(async move {
                let admission = accountant.admit(&workspace, 300, &tasks).await?;
                tokio::task::yield_now().await;
                tasks.insert(id, waiting_task(id, "ws1", 300));
                drop(admission);
                Ok::<_, SchedulerError>(())
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(tasks.len(), 3);
    }
}
