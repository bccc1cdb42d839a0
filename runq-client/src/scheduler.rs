//! Scheduler API client
//!
//! Used by the CLI to submit runs, inspect and stop tasks and administer the
//! worker pool.

use reqwest::Client;
use runq_core::domain::process::ProcessDescriptor;
use runq_core::dto::run::RunOptions;
use runq_core::dto::task::TaskSummary;
use runq_core::dto::worker::{
    RegisterWorker, RegistrationChange, UnregisterWorker, WorkerNodeInfo,
};

use crate::error::Result;
use crate::{handle_response, handle_text_response, trim_base_url};

/// HTTP client for the runq scheduler API
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    /// Base URL of the scheduler (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl SchedulerClient {
    /// Create a new scheduler client
    ///
    /// # Example
    /// ```
    /// use runq_client::SchedulerClient;
    ///
    /// let client = SchedulerClient::new("http://localhost:8080");
    /// assert_eq!(client.base_url(), "http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            client: Client::new(),
        }
    }

    /// Get the base URL of the scheduler
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Runs
    // =============================================================================

    /// Submit a run of `project` in `workspace`
    ///
    /// Returns as soon as the request is admitted; the process is usually still
    /// `NEW` at that point.
    pub async fn run(
        &self,
        workspace: &str,
        project: &str,
        options: &RunOptions,
    ) -> Result<ProcessDescriptor> {
        let url = format!("{}/runner/{}/run", self.base_url, workspace);
        let response = self
            .client
            .post(&url)
            .query(&[("project", project)])
            .json(options)
            .send()
            .await?;

        handle_response(response).await
    }

    pub async fn status(&self, workspace: &str, id: u64) -> Result<ProcessDescriptor> {
        let url = format!("{}/runner/{}/status/{}", self.base_url, workspace, id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    pub async fn stop(&self, workspace: &str, id: u64) -> Result<ProcessDescriptor> {
        let url = format!("{}/runner/{}/stop/{}", self.base_url, workspace, id);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }

    pub async fn logs(&self, workspace: &str, id: u64) -> Result<String> {
        let url = format!("{}/runner/{}/logs/{}", self.base_url, workspace, id);
        let response = self.client.get(&url).send().await?;

        handle_text_response(response).await
    }

    /// List processes of a workspace, optionally restricted to one project
    pub async fn processes(
        &self,
        workspace: &str,
        project: Option<&str>,
    ) -> Result<Vec<ProcessDescriptor>> {
        let url = format!("{}/runner/{}/processes", self.base_url, workspace);
        let mut request = self.client.get(&url);
        if let Some(project) = project {
            request = request.query(&[("project", project)]);
        }
        let response = request.send().await?;

        handle_response(response).await
    }

    // =============================================================================
    // Admin
    // =============================================================================

    pub async fn register_worker(&self, req: &RegisterWorker) -> Result<RegistrationChange> {
        let url = format!("{}/admin/runner/server/register", self.base_url);
        let response = self.client.post(&url).json(req).send().await?;

        handle_response(response).await
    }

    pub async fn unregister_worker(&self, address: &str) -> Result<RegistrationChange> {
        let url = format!("{}/admin/runner/server/unregister", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&UnregisterWorker {
                address: address.to_string(),
            })
            .send()
            .await?;

        handle_response(response).await
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerNodeInfo>> {
        let url = format!("{}/admin/runner/servers", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskSummary>> {
        let url = format!("{}/admin/runner/tasks", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_run_sends_project_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runner/ws1/run"))
            .and(query_param("project", "/app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "process_id": 1,
                "status": "NEW",
                "creation_time": "2026-01-01T00:00:00Z",
                "start_time": null,
                "stop_time": null,
                "workspace": "ws1",
                "project": "/app",
                "memory_size_mb": 256,
                "environment_id": null,
                "runner": null,
                "server_url": null,
                "error": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SchedulerClient::new(server.uri());
        let process = client
            .run("ws1", "/app", &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(process.process_id, 1);
        assert!(process.links.is_empty());
    }

    #[tokio::test]
    async fn test_admission_rejection_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runner/ws1/run"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": "Not enough memory to start application"
            })))
            .mount(&server)
            .await;

        let client = SchedulerClient::new(server.uri());
        let err = client
            .run("ws1", "/app", &RunOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Not enough memory"));
    }
}
