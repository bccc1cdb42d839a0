//! Build domain types
//!
//! Builds are executed by an external builder service. The scheduler triggers
//! them, polls their status and attaches the successful result to a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::process::Link;

/// Link relation under which a builder exposes the build log
pub const LINK_REL_BUILD_LOG: &str = "view build log";
/// Link relation under which a builder exposes the built artifact
pub const LINK_REL_DOWNLOAD_RESULT: &str = "download result";

/// Status of a build as reported by the builder service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    InQueue,
    InProgress,
    Successful,
    Failed,
    Cancelled,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Successful | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }
}

/// Options forwarded to the builder service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub builder_name: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub skip_test: bool,
    #[serde(default)]
    pub include_dependencies: bool,
}

/// A build task known to the builder service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTask {
    pub task_id: u64,
    pub status: BuildStatus,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl BuildTask {
    pub fn log_url(&self) -> Option<&str> {
        self.link(LINK_REL_BUILD_LOG)
    }

    pub fn result_url(&self) -> Option<&str> {
        self.link(LINK_REL_DOWNLOAD_RESULT)
    }

    fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == rel)
            .map(|link| link.href.as_str())
    }
}
