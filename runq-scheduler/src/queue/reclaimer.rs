//! Reclamation sweep
//!
//! Expires tasks that waited too long for a runner and forgets tasks whose
//! remote process outlived its lifetime plus a grace period. The worker node
//! stays the source of truth for whether a process still runs; the sweep only
//! drops the scheduler's own bookkeeping.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use runq_core::domain::event::{RunEvent, RunEventKind};
use std::sync::Arc;

use crate::error::NO_RESOURCES_MESSAGE;
use crate::events::EventBus;
use crate::task::Task;

pub struct Reclaimer {
    tasks: Arc<DashMap<u64, Arc<Task>>>,
    events: Arc<dyn EventBus>,
    cleanup_grace: chrono::Duration,
}

impl Reclaimer {
    pub fn new(
        tasks: Arc<DashMap<u64, Arc<Task>>>,
        events: Arc<dyn EventBus>,
        cleanup_grace: chrono::Duration,
    ) -> Self {
        Self {
            tasks,
            events,
            cleanup_grace,
        }
    }

    /// Run one sweep as of `now`; returns how many tasks were removed
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let tasks: Vec<Arc<Task>> = self
            .tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut removed = 0;
        for task in tasks {
            if self.is_reclaimable(&task, now).await {
                self.tasks.remove(&task.id());
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!("Reclaimed {} tasks", removed);
        }
        removed
    }

    async fn is_reclaimable(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if task.is_waiting() {
            if task.is_stopped() {
                return true;
            }
            if task.waiting_expired(now) {
                tracing::warn!(
                    "Task {} of {} found no runner before {}",
                    task.id(),
                    task.workspace(),
                    task.waiting_timeout()
                );
                task.expire(NO_RESOURCES_MESSAGE).await;
                self.events.publish(
                    RunEvent::new(
                        RunEventKind::QueueTimeout,
                        task.id(),
                        task.workspace(),
                        task.project(),
                    )
                    .with_message(NO_RESOURCES_MESSAGE),
                );
                return true;
            }
            return false;
        }

        let Some(process) = task.process() else {
            return true;
        };

        let spec = task.spec();
        if spec.has_unlimited_lifetime() {
            return false;
        }

        let deadline = i64::try_from(spec.lifetime_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| lifetime.checked_add(&self.cleanup_grace))
            .and_then(|keep| process.creation_time().checked_add_signed(keep));
        if !deadline.is_some_and(|deadline| now >= deadline) {
            return false;
        }

        match process.status().await {
            Ok(descriptor) => !descriptor.status.is_active(),
            Err(e) => {
                tracing::debug!("Forgetting process of task {}: {}", task.id(), e);
                true
            }
        }
    }
}
