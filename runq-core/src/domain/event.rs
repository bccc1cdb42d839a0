//! Lifecycle events
//!
//! Published by the scheduler on every task transition. Consumers (UI push,
//! audit logging) live outside the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    Queued,
    PreparationStarted,
    Started,
    Stopped,
    Error,
    QueueTimeout,
    Cancelled,
    LogLine,
}

impl std::fmt::Display for RunEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunEventKind::Queued => "queued",
            RunEventKind::PreparationStarted => "preparation_started",
            RunEventKind::Started => "started",
            RunEventKind::Stopped => "stopped",
            RunEventKind::Error => "error",
            RunEventKind::QueueTimeout => "queue_timeout",
            RunEventKind::Cancelled => "cancelled",
            RunEventKind::LogLine => "log_line",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub kind: RunEventKind,
    pub task_id: u64,
    pub workspace: String,
    pub project: String,
    pub timestamp: DateTime<Utc>,
    /// Error text for `error` events, the log line for `log_line` events
    pub message: Option<String>,
}

impl RunEvent {
    pub fn new(
        kind: RunEventKind,
        task_id: u64,
        workspace: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            task_id,
            workspace: workspace.into(),
            project: project.into(),
            timestamp: Utc::now(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
