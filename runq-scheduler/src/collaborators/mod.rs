//! Collaborating services
//!
//! Project metadata, workspace limits and builds live in other services. The
//! run queue reaches them only through these traits.

pub mod http;

use async_trait::async_trait;
use runq_core::domain::build::{BuildOptions, BuildTask};
use runq_core::domain::project::{ProjectDescriptor, WorkspaceDescriptor};
use std::sync::Arc;

use crate::error::Result;
use crate::events::EventBus;

#[async_trait]
pub trait ProjectProvider: Send + Sync {
    async fn project(&self, workspace: &str, project: &str) -> Result<ProjectDescriptor>;

    /// File names of the recipes a project declares for one of its environments
    async fn recipes(&self, workspace: &str, project: &str, environment: &str)
    -> Result<Vec<String>>;
}

#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn workspace(&self, workspace: &str) -> Result<WorkspaceDescriptor>;
}

#[async_trait]
pub trait BuildTrigger: Send + Sync {
    /// Queue a build of `project`
    async fn build(&self, workspace: &str, project: &str, options: &BuildOptions)
    -> Result<BuildTask>;

    async fn status(&self, workspace: &str, task_id: u64) -> Result<BuildTask>;

    async fn cancel(&self, workspace: &str, task_id: u64) -> Result<()>;
}

/// Everything the run queue consumes from outside the scheduler
#[derive(Clone)]
pub struct Collaborators {
    pub projects: Arc<dyn ProjectProvider>,
    pub workspaces: Arc<dyn WorkspaceProvider>,
    pub builder: Arc<dyn BuildTrigger>,
    pub events: Arc<dyn EventBus>,
}
