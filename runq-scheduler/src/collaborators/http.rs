//! HTTP collaborators
//!
//! | Service   | Method | Path                                              |
//! |-----------|--------|---------------------------------------------------|
//! | project   | GET    | `/project/{ws}?path={project}`                    |
//! | project   | GET    | `/project/{ws}/recipes?path={project}&environment={name}` |
//! | workspace | GET    | `/workspace/{ws}`                                 |
//! | builder   | POST   | `/builder/{ws}/build?project={project}`           |
//! | builder   | GET    | `/builder/{ws}/status/{id}`                       |
//! | builder   | POST   | `/builder/{ws}/cancel/{id}`                       |

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use runq_core::domain::build::{BuildOptions, BuildTask};
use runq_core::domain::project::{ProjectDescriptor, WorkspaceDescriptor};
use serde::de::DeserializeOwned;

use crate::collaborators::{BuildTrigger, ProjectProvider, WorkspaceProvider};
use crate::error::{Result, SchedulerError};

/// Send `request` and decode its JSON body, translating failures into scheduler errors
async fn fetch<T: DeserializeOwned>(service: &'static str, request: RequestBuilder) -> Result<T> {
    let response = send(service, request).await?;

    response
        .json()
        .await
        .map_err(|e| SchedulerError::collaborator(service, format!("invalid response: {}", e)))
}

async fn send(service: &'static str, request: RequestBuilder) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| SchedulerError::collaborator(service, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(SchedulerError::NotFound(if body.is_empty() {
            format!("{} resource not found", service)
        } else {
            body
        }));
    }

    Err(SchedulerError::collaborator(
        service,
        format!("status {}: {}", status.as_u16(), body),
    ))
}

fn trim(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

pub struct HttpProjectProvider {
    base_url: String,
    client: Client,
}

impl HttpProjectProvider {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: trim(base_url),
            client,
        }
    }
}

#[async_trait]
impl ProjectProvider for HttpProjectProvider {
    async fn project(&self, workspace: &str, project: &str) -> Result<ProjectDescriptor> {
        let url = format!("{}/project/{}", self.base_url, workspace);
        fetch("project", self.client.get(&url).query(&[("path", project)])).await
    }

    async fn recipes(
        &self,
        workspace: &str,
        project: &str,
        environment: &str,
    ) -> Result<Vec<String>> {
        let url = format!("{}/project/{}/recipes", self.base_url, workspace);
        let request = self
            .client
            .get(&url)
            .query(&[("path", project), ("environment", environment)]);
        fetch("project", request).await
    }
}

pub struct HttpWorkspaceProvider {
    base_url: String,
    client: Client,
}

impl HttpWorkspaceProvider {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: trim(base_url),
            client,
        }
    }
}

#[async_trait]
impl WorkspaceProvider for HttpWorkspaceProvider {
    async fn workspace(&self, workspace: &str) -> Result<WorkspaceDescriptor> {
        let url = format!("{}/workspace/{}", self.base_url, workspace);
        fetch("workspace", self.client.get(&url)).await
    }
}

pub struct HttpBuildTrigger {
    base_url: String,
    client: Client,
}

impl HttpBuildTrigger {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: trim(base_url),
            client,
        }
    }
}

#[async_trait]
impl BuildTrigger for HttpBuildTrigger {
    async fn build(
        &self,
        workspace: &str,
        project: &str,
        options: &BuildOptions,
    ) -> Result<BuildTask> {
        let url = format!("{}/builder/{}/build", self.base_url, workspace);
        let request = self
            .client
            .post(&url)
            .query(&[("project", project)])
            .json(options);
        fetch("builder", request).await
    }

    async fn status(&self, workspace: &str, task_id: u64) -> Result<BuildTask> {
        let url = format!("{}/builder/{}/status/{}", self.base_url, workspace, task_id);
        fetch("builder", self.client.get(&url)).await
    }

    async fn cancel(&self, workspace: &str, task_id: u64) -> Result<()> {
        let url = format!("{}/builder/{}/cancel/{}", self.base_url, workspace, task_id);
        send("builder", self.client.post(&url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runq_core::domain::build::BuildStatus;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_project_is_fetched_by_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/ws1"))
            .and(query_param("path", "/app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "path": "/app",
                "name": "app",
                "runners": {
                    "default": "system:/java/web/tomcat7",
                    "configs": { "system:/java/web/tomcat7": { "ram_mb": 256 } }
                },
                "builders": { "default": "maven" }
            })))
            .mount(&server)
            .await;

        let provider = HttpProjectProvider::new(server.uri(), Client::new());
        let project = provider.project("ws1", "/app").await.unwrap();

        assert_eq!(project.runners.default.as_deref(), Some("system:/java/web/tomcat7"));
        assert_eq!(project.builders.default.as_deref(), Some("maven"));
        assert_eq!(
            project.runners.configs["system:/java/web/tomcat7"].ram_mb,
            Some(256)
        );
    }

    #[tokio::test]
    async fn test_missing_workspace_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspace/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Workspace ghost not found"))
            .mount(&server)
            .await;

        let provider = HttpWorkspaceProvider::new(server.uri(), Client::new());
        let err = provider.workspace("ghost").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Workspace ghost not found");
    }

    #[tokio::test]
    async fn test_build_posts_options() {
        let server = MockServer::start().await;
        let options = BuildOptions {
            skip_test: true,
            include_dependencies: true,
            ..Default::default()
        };
        Mock::given(method("POST"))
            .and(path("/builder/ws1/build"))
            .and(query_param("project", "/app"))
            .and(body_json(&options))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "task_id": 9,
                "status": "IN_QUEUE",
                "start_time": null,
                "end_time": null,
                "links": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let builder = HttpBuildTrigger::new(format!("{}/", server.uri()), Client::new());
        let task = builder.build("ws1", "/app", &options).await.unwrap();

        assert_eq!(task.task_id, 9);
        assert_eq!(task.status, BuildStatus::InQueue);
    }

    #[tokio::test]
    async fn test_builder_failure_is_collaborator_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/builder/ws1/cancel/9"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let builder = HttpBuildTrigger::new(server.uri(), Client::new());
        let err = builder.cancel("ws1", 9).await.unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::Collaborator {
                service: "builder",
                ..
            }
        ));
    }
}
