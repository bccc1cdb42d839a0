//! Runq HTTP Clients
//!
//! Type-safe HTTP clients for the two remote surfaces of the runq system:
//!
//! - [`WorkerClient`] speaks the worker wire protocol. The scheduler uses it
//!   through the [`WorkerApi`] trait to list runners, read live resource state
//!   and start, query and stop processes on a worker node.
//! - [`SchedulerClient`] speaks the scheduler's public and admin API and backs
//!   the command-line interface.
//!
//! # Example
//!
//! ```no_run
//! use runq_client::{WorkerApi, WorkerClient};
//!
//! #[tokio::main]
//! async fn main() -> runq_client::Result<()> {
//!     let worker = WorkerClient::new("http://worker-1:8090");
//!     for runner in worker.runners().await? {
//!         println!("{}: {:?}", runner.name, worker.runner_state(&runner.name).await?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod scheduler;
mod worker;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use scheduler::SchedulerClient;
pub use worker::{WorkerApi, WorkerClient};

use serde::de::DeserializeOwned;

// =============================================================================
// Response Handlers
// =============================================================================

/// Check the status code of a response and deserialize its JSON body
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Check the status code of a response and return its body as text
async fn handle_text_response(response: reqwest::Response) -> Result<String> {
    let response = check_status(response).await?;

    response
        .text()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to read response body: {}", e)))
}

/// Check the status code of a response that carries no useful body
async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(response)
}

fn trim_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_base_url() {
        assert_eq!(trim_base_url("http://localhost:8080/"), "http://localhost:8080");
        assert_eq!(trim_base_url("http://localhost:8080"), "http://localhost:8080");
    }
}
