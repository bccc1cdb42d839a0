//! Environment identifiers
//!
//! An environment id has the form `<scope>:/<category>/<name>`, e.g.
//! `system:/java/web/tomcat7` or `project:/docker/default`. The category is
//! everything between the scope and the last path segment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an environment is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentScope {
    /// Provided by a runner on a worker node
    System,
    /// Declared by the project through recipe files
    Project,
}

impl std::fmt::Display for EnvironmentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentScope::System => write!(f, "system"),
            EnvironmentScope::Project => write!(f, "project"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid environment id '{id}': {reason}")]
pub struct EnvironmentIdError {
    pub id: String,
    pub reason: &'static str,
}

/// A parsed environment id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentId {
    pub scope: EnvironmentScope,
    pub category: String,
    pub name: String,
}

impl EnvironmentId {
    pub fn parse(id: &str) -> Result<Self, EnvironmentIdError> {
        let err = |reason| EnvironmentIdError {
            id: id.to_string(),
            reason,
        };

        let (scope, path) = id.split_once(":/").ok_or_else(|| err("missing scope"))?;
        let scope = match scope {
            "system" => EnvironmentScope::System,
            "project" => EnvironmentScope::Project,
            _ => return Err(err("unknown scope")),
        };

        let path = path.trim_matches('/');
        let (category, name) = path
            .rsplit_once('/')
            .ok_or_else(|| err("expected <category>/<name>"))?;
        if category.is_empty() || name.is_empty() {
            return Err(err("expected <category>/<name>"));
        }

        Ok(Self {
            scope,
            category: category.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:/{}/{}", self.scope, self.category, self.name)
    }
}
