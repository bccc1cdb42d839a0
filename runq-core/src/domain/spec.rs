//! Run specification
//!
//! The fully resolved description of one run request. The scheduler builds it
//! once per admitted request and sends it to the chosen worker on `start`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::build::BuildTask;
use crate::domain::project::ProjectDescriptor;

/// Lifetime sentinel for applications that may run forever
pub const UNLIMITED_LIFETIME: u64 = u64::MAX;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpecification {
    /// Scheduler-assigned task id
    pub id: u64,
    pub workspace: String,
    pub project: String,
    pub project_descriptor: ProjectDescriptor,
    pub environment_id: String,
    pub runner: String,
    pub memory_size_mb: u64,
    /// Seconds, or [`UNLIMITED_LIFETIME`]
    pub lifetime_secs: u64,
    pub debug: bool,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Successful build whose result should be deployed
    pub build_task: Option<BuildTask>,
}

impl RunSpecification {
    pub fn has_unlimited_lifetime(&self) -> bool {
        self.lifetime_secs == UNLIMITED_LIFETIME
    }
}
