//! Process domain types
//!
//! A process is one execution of an application on a worker node, as reported
//! either by the worker itself or by the scheduler on behalf of a queued task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an application process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    /// Accepted but not running yet (queued, building or waiting for a runner)
    New,
    Running,
    Stopped,
    Cancelled,
    Failed,
}

impl ProcessStatus {
    /// Whether a process in this status still holds resources on a worker
    pub fn is_active(&self) -> bool {
        matches!(self, ProcessStatus::New | ProcessStatus::Running)
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::New => write!(f, "NEW"),
            ProcessStatus::Running => write!(f, "RUNNING"),
            ProcessStatus::Stopped => write!(f, "STOPPED"),
            ProcessStatus::Cancelled => write!(f, "CANCELLED"),
            ProcessStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// A hypermedia link attached to a process descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    pub method: String,
}

impl Link {
    pub fn new(rel: impl Into<String>, method: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            method: method.into(),
        }
    }
}

/// A named metric exposed in a process descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
}

impl Stat {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Snapshot of an application process
///
/// Worker nodes return this from `start` and status calls; the scheduler
/// renders the same shape for tasks that have no remote process yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub process_id: u64,
    pub status: ProcessStatus,
    pub creation_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub workspace: Option<String>,
    pub project: Option<String>,
    pub memory_size_mb: Option<u64>,
    pub environment_id: Option<String>,
    pub runner: Option<String>,
    pub server_url: Option<String>,
    #[serde(default)]
    pub stats: Vec<Stat>,
    #[serde(default)]
    pub build_stats: Vec<Stat>,
    #[serde(default)]
    pub links: Vec<Link>,
    pub error: Option<String>,
}

impl ProcessDescriptor {
    /// Find a link by its relation name
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.rel == rel)
    }
}
