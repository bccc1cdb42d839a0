//! API Module
//!
//! HTTP API layer for the scheduler.
//! Each submodule handles endpoints for a specific domain.

pub mod admin;
pub mod error;
pub mod health;
pub mod run;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::queue::RunQueue;

/// Create the main API router with all endpoints
pub fn create_router(queue: Arc<RunQueue>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Run endpoints
        .route("/runner/processes", get(run::account_processes))
        .route("/runner/{ws}/run", post(run::run))
        .route("/runner/{ws}/status/{id}", get(run::status))
        .route("/runner/{ws}/stop/{id}", post(run::stop))
        .route("/runner/{ws}/logs/{id}", get(run::logs))
        .route("/runner/{ws}/recipe/{id}", get(run::recipe))
        .route("/runner/{ws}/processes", get(run::workspace_processes))
        // Admin endpoints
        .route("/admin/runner/server/register", post(admin::register_worker))
        .route("/admin/runner/server/unregister", post(admin::unregister_worker))
        .route("/admin/runner/servers", get(admin::list_workers))
        .route("/admin/runner/tasks", get(admin::list_tasks))
        // Add state and middleware
        .with_state(queue)
        .layer(TraceLayer::new_for_http())
}
