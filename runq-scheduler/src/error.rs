//! Scheduler error type
//!
//! Every failure leaving the pool, the handles, the accountant or the run
//! queue is a [`SchedulerError`]; worker-side client errors are wrapped at the
//! boundary so callers never see transport types.

use runq_client::ClientError;
use runq_core::domain::environment::EnvironmentIdError;
use thiserror::Error;

/// Message reported for tasks that never found a runner in time
pub const NO_RESOURCES_MESSAGE: &str =
    "No resources available to start the application. Please contact support.";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(
        "Not enough memory to start the application: requested {requested_mb} MB, \
         available {available_mb} MB of the {ceiling_mb} MB workspace limit"
    )]
    NotEnoughMemory {
        requested_mb: u64,
        available_mb: u64,
        ceiling_mb: u64,
    },

    #[error("Resources of workspace '{0}' are locked, new applications cannot be started")]
    ResourcesLocked(String),

    #[error("No environment requested and project '{0}' declares no default runner environment")]
    NoEnvironment(String),

    #[error(transparent)]
    InvalidEnvironment(#[from] EnvironmentIdError),

    #[error("{0}")]
    NoRunner(String),

    #[error("{0}")]
    Build(String),

    #[error("{0}")]
    StartFailed(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Worker {address} is unreachable: {source}")]
    WorkerUnreachable {
        address: String,
        #[source]
        source: ClientError,
    },

    #[error("Worker {address} request failed: {source}")]
    Worker {
        address: String,
        #[source]
        source: ClientError,
    },

    #[error("{service} service request failed: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    #[error("{0}")]
    Unavailable(String),
}

impl SchedulerError {
    /// Wrap a worker-side failure; connect errors and timeouts become `WorkerUnreachable`
    pub fn worker(address: &str, source: ClientError) -> Self {
        let address = address.to_string();
        if source.is_unreachable() {
            Self::WorkerUnreachable { address, source }
        } else {
            Self::Worker { address, source }
        }
    }

    pub fn collaborator(service: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            service,
            message: message.to_string(),
        }
    }

    /// True when the addressed entity is gone, locally or on a worker node
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Worker { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_message_names_numbers() {
        let err = SchedulerError::NotEnoughMemory {
            requested_mb: 512,
            available_mb: 400,
            ceiling_mb: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("512"));
        assert!(msg.contains("400"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn test_worker_not_found_is_not_found() {
        let err = SchedulerError::worker("http://w1", ClientError::api_error(404, "gone"));
        assert!(err.is_not_found());

        let err = SchedulerError::worker("http://w1", ClientError::api_error(500, "boom"));
        assert!(!err.is_not_found());
        assert!(matches!(err, SchedulerError::Worker { .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        use runq_client::{WorkerApi, WorkerClient};

        let source = WorkerClient::new("http://127.0.0.1:1").ping().await.unwrap_err();
        let err = SchedulerError::worker("http://127.0.0.1:1", source);

        assert!(matches!(err, SchedulerError::WorkerUnreachable { .. }));
        assert!(!err.is_not_found());
    }
}
