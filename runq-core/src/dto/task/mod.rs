//! Task DTOs
//!
//! Summaries of the scheduler's task table for the admin surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPhase {
    Waiting,
    ResolvingBuild,
    SelectingRunner,
    Running,
    Stopped,
    Cancelled,
    Error,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskPhase::Stopped | TaskPhase::Cancelled | TaskPhase::Error
        )
    }
}

/// One row of the task table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: u64,
    pub workspace: String,
    pub project: String,
    pub environment_id: String,
    pub runner: String,
    pub memory_size_mb: u64,
    pub creation_time: DateTime<Utc>,
    pub phase: TaskPhase,
    pub stopped: bool,
    pub process_id: Option<u64>,
    pub server_url: Option<String>,
}
