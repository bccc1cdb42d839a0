//! Worker wire protocol
//!
//! Every worker node exposes the same small HTTP surface:
//!
//! | Method | Path                              | Body / Result                 |
//! |--------|-----------------------------------|-------------------------------|
//! | GET    | `/health`                         | liveness                      |
//! | GET    | `/runners`                        | `Vec<RunnerDescriptor>`       |
//! | GET    | `/runners/{name}/environments`    | `Vec<EnvironmentDescriptor>`  |
//! | GET    | `/runners/{name}/state`           | `RunnerState`                 |
//! | POST   | `/runners/{name}/start`           | `RunSpecification` -> process |
//! | GET    | `/processes/{id}`                 | `ProcessDescriptor`           |
//! | POST   | `/processes/{id}/stop`            | `ProcessDescriptor`           |
//! | GET    | `/processes/{id}/logs`            | plain text                    |
//! | GET    | `/processes/{id}/recipe`          | plain text                    |

use async_trait::async_trait;
use reqwest::Client;
use runq_core::domain::process::ProcessDescriptor;
use runq_core::domain::runner::{EnvironmentDescriptor, RunnerDescriptor, RunnerState};
use runq_core::domain::spec::RunSpecification;

use crate::error::Result;
use crate::{handle_empty_response, handle_response, handle_text_response, trim_base_url};

/// Operations the scheduler needs from one worker node
///
/// Implemented over HTTP by [`WorkerClient`]; tests substitute in-memory nodes.
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Base URL of the node; the node's identity inside the scheduler
    fn address(&self) -> &str;

    /// Liveness probe
    async fn ping(&self) -> Result<()>;

    /// Runners currently offered by the node
    async fn runners(&self) -> Result<Vec<RunnerDescriptor>>;

    /// Environment catalog of one runner
    async fn environments(&self, runner: &str) -> Result<Vec<EnvironmentDescriptor>>;

    /// Live resource state of one runner
    async fn runner_state(&self, runner: &str) -> Result<RunnerState>;

    /// Start an application; the returned descriptor identifies the new process
    async fn start(&self, runner: &str, spec: &RunSpecification) -> Result<ProcessDescriptor>;

    async fn process_status(&self, process_id: u64) -> Result<ProcessDescriptor>;

    async fn stop_process(&self, process_id: u64) -> Result<ProcessDescriptor>;

    async fn process_logs(&self, process_id: u64) -> Result<String>;

    async fn process_recipe(&self, process_id: u64) -> Result<String>;
}

/// HTTP client for one worker node
#[derive(Debug, Clone)]
pub struct WorkerClient {
    /// Base URL of the worker (e.g., "http://worker-1:8090")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl WorkerClient {
    /// Create a new worker client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new worker client sharing a configured reqwest Client
    ///
    /// The scheduler shares one client (and its connection pool and timeouts)
    /// across every registered node.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl WorkerApi for WorkerClient {
    fn address(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        handle_empty_response(response).await
    }

    async fn runners(&self) -> Result<Vec<RunnerDescriptor>> {
        let response = self.client.get(self.url("/runners")).send().await?;
        handle_response(response).await
    }

    async fn environments(&self, runner: &str) -> Result<Vec<EnvironmentDescriptor>> {
        let url = self.url(&format!("/runners/{}/environments", runner));
        let response = self.client.get(&url).send().await?;
        handle_response(response).await
    }

    async fn runner_state(&self, runner: &str) -> Result<RunnerState> {
        let url = self.url(&format!("/runners/{}/state", runner));
        let response = self.client.get(&url).send().await?;
        handle_response(response).await
    }

    async fn start(&self, runner: &str, spec: &RunSpecification) -> Result<ProcessDescriptor> {
        tracing::debug!("Starting task {} on {} runner {}", spec.id, self.base_url, runner);

        let url = self.url(&format!("/runners/{}/start", runner));
        let response = self.client.post(&url).json(spec).send().await?;
        handle_response(response).await
    }

    async fn process_status(&self, process_id: u64) -> Result<ProcessDescriptor> {
        let url = self.url(&format!("/processes/{}", process_id));
        let response = self.client.get(&url).send().await?;
        handle_response(response).await
    }

    async fn stop_process(&self, process_id: u64) -> Result<ProcessDescriptor> {
        let url = self.url(&format!("/processes/{}/stop", process_id));
        let response = self.client.post(&url).send().await?;
        handle_response(response).await
    }

    async fn process_logs(&self, process_id: u64) -> Result<String> {
        let url = self.url(&format!("/processes/{}/logs", process_id));
        let response = self.client.get(&url).send().await?;
        handle_text_response(response).await
    }

    async fn process_recipe(&self, process_id: u64) -> Result<String> {
        let url = self.url(&format!("/processes/{}/recipe", process_id));
        let response = self.client.get(&url).send().await?;
        handle_text_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runq_core::domain::process::ProcessStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn process_json(id: u64, status: &str) -> serde_json::Value {
        json!({
            "process_id": id,
            "status": status,
            "creation_time": "2026-01-01T00:00:00Z",
            "start_time": null,
            "stop_time": null,
            "workspace": "ws1",
            "project": "/app",
            "memory_size_mb": 256,
            "environment_id": "system:/java/web/tomcat7",
            "runner": "java/web",
            "server_url": null,
            "links": [{"rel": "stop", "href": "http://worker/processes/7/stop", "method": "POST"}],
            "error": null
        })
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = WorkerClient::new("http://worker-1:8090/");
        assert_eq!(client.address(), "http://worker-1:8090");
    }

    #[tokio::test]
    async fn test_runner_state_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/runners/java/web/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "free_memory_mb": 900,
                "total_memory_mb": 2048,
                "total_disk_bytes": 1000,
                "used_disk_bytes": 250,
                "last_usage_time": "2026-01-01T10:00:00Z"
            })))
            .mount(&server)
            .await;

        let client = WorkerClient::new(server.uri());
        let state = client.runner_state("java/web").await.unwrap();

        assert_eq!(state.free_memory_mb, 900);
        assert_eq!(state.free_disk_percent(), 75.0);
        assert!(state.last_usage_time.is_some());
    }

    #[tokio::test]
    async fn test_process_status_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/processes/42"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Process 42 not found"))
            .mount(&server)
            .await;

        let client = WorkerClient::new(server.uri());
        let err = client.process_status(42).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("Process 42 not found"));
    }

    #[tokio::test]
    async fn test_stop_process_returns_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processes/7/stop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(process_json(7, "STOPPED")))
            .expect(1)
            .mount(&server)
            .await;

        let client = WorkerClient::new(server.uri());
        let process = client.stop_process(7).await.unwrap();

        assert_eq!(process.process_id, 7);
        assert_eq!(process.status, ProcessStatus::Stopped);
        assert!(process.link("stop").is_some());
    }

    #[tokio::test]
    async fn test_malformed_start_response_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runners/docker/start"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let spec = RunSpecification {
            id: 1,
            workspace: "ws1".into(),
            project: "/app".into(),
            project_descriptor: Default::default(),
            environment_id: "project:/docker/default".into(),
            runner: "docker".into(),
            memory_size_mb: 256,
            lifetime_secs: 60,
            debug: false,
            options: Default::default(),
            variables: Default::default(),
            build_task: None,
        };

        let client = WorkerClient::new(server.uri());
        let err = client.start("docker", &spec).await.unwrap_err();

        assert!(matches!(err, crate::ClientError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_logs_are_returned_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/processes/3/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("line 1\nline 2\n"))
            .mount(&server)
            .await;

        let client = WorkerClient::new(server.uri());
        let logs = client.process_logs(3).await.unwrap();

        assert_eq!(logs.lines().count(), 2);
    }
}
