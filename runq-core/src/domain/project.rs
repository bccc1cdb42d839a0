//! Project and workspace descriptors
//!
//! These are owned by external services; the scheduler only reads them to
//! resolve environments, memory sizes, lifetimes and build settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Workspace attribute holding the per-workspace memory ceiling in megabytes
pub const ATTR_MAX_MEMORY: &str = "runner.max_memory_size";
/// Workspace attribute overriding the application lifetime in seconds
pub const ATTR_LIFETIME: &str = "runner.lifetime";
/// Workspace attribute locking every new admission when set to `true`
pub const ATTR_RESOURCES_LOCKED: &str = "resources.locked";
/// Workspace attribute selecting the infrastructure a workspace runs on
pub const ATTR_INFRA: &str = "runner.infra";

/// Infrastructure tag used when a workspace does not name one
pub const DEFAULT_INFRA: &str = "community";

/// Project metadata as returned by the project service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub runners: RunnersConfig,
    #[serde(default)]
    pub builders: BuildersConfig,
}

/// Runner section of a project descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnersConfig {
    /// Environment used when a run request does not name one
    pub default: Option<String>,
    /// Per-environment overrides keyed by environment id
    #[serde(default)]
    pub configs: HashMap<String, RunnerConfiguration>,
}

/// Declared settings for one environment of a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfiguration {
    pub ram_mb: Option<u64>,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Builder section of a project descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildersConfig {
    pub default: Option<String>,
}

/// Workspace metadata as returned by the workspace service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub account_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl WorkspaceDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Memory ceiling for the workspace, if one is configured and valid
    pub fn max_memory_mb(&self) -> Option<u64> {
        self.attributes
            .get(ATTR_MAX_MEMORY)
            .and_then(|v| v.trim().parse().ok())
    }

    /// Lifetime override in seconds; may be zero or negative to mean unlimited
    pub fn lifetime_override(&self) -> Option<i64> {
        self.attributes
            .get(ATTR_LIFETIME)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn resources_locked(&self) -> bool {
        self.attributes
            .get(ATTR_RESOURCES_LOCKED)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn infra(&self) -> &str {
        self.attributes
            .get(ATTR_INFRA)
            .map(String::as_str)
            .unwrap_or(DEFAULT_INFRA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_attribute_accessors() {
        let ws = WorkspaceDescriptor::new("ws1")
            .with_attribute(ATTR_MAX_MEMORY, "2048")
            .with_attribute(ATTR_LIFETIME, "-1")
            .with_attribute(ATTR_RESOURCES_LOCKED, "TRUE")
            .with_attribute(ATTR_INFRA, "paid");

        assert_eq!(ws.max_memory_mb(), Some(2048));
        assert_eq!(ws.lifetime_override(), Some(-1));
        assert!(ws.resources_locked());
        assert_eq!(ws.infra(), "paid");
    }

    #[test]
    fn test_workspace_defaults() {
        let ws = WorkspaceDescriptor::new("ws1").with_attribute(ATTR_MAX_MEMORY, "lots");

        assert_eq!(ws.max_memory_mb(), None);
        assert_eq!(ws.lifetime_override(), None);
        assert!(!ws.resources_locked());
        assert_eq!(ws.infra(), DEFAULT_INFRA);
    }
}
