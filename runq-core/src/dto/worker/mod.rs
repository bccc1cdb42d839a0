//! Worker DTOs
//!
//! Bodies for the admin registration surface and for reporting the state of
//! registered worker nodes.

use serde::{Deserialize, Serialize};

use crate::domain::runner::{RunnerState, WorkerStatus};

/// Request to register a worker node with the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorker {
    /// Base URL of the worker node (e.g., "http://worker-1:8090")
    pub address: String,

    /// Infrastructure tag; the default infrastructure when omitted
    pub infra: Option<String>,

    /// Dedicate the node to a single workspace
    pub workspace: Option<String>,

    /// Dedicate the node to a single project of `workspace`
    pub project: Option<String>,
}

/// Request to remove a worker node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterWorker {
    pub address: String,
}

/// Outcome of a registration change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationChange {
    pub changed: bool,
}

/// One runner of a registered node with its live state, when reachable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerInfo {
    pub name: String,
    pub description: Option<String>,
    pub state: Option<RunnerState>,
}

/// A registered worker node as reported by the admin surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNodeInfo {
    pub address: String,
    pub infra: String,
    pub workspace: Option<String>,
    pub project: Option<String>,
    pub status: WorkerStatus,
    pub runners: Vec<RunnerInfo>,
}
