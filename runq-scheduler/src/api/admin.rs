//! Admin API Handlers
//!
//! Worker node registration and introspection of the task table.

use axum::{Json, extract::State};
use runq_core::dto::task::TaskSummary;
use runq_core::dto::worker::{
    RegisterWorker, RegistrationChange, UnregisterWorker, WorkerNodeInfo,
};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::queue::RunQueue;

/// POST /admin/runner/server/register
/// Register a worker node, or move it to another pool bucket
pub async fn register_worker(
    State(queue): State<Arc<RunQueue>>,
    Json(req): Json<RegisterWorker>,
) -> ApiResult<Json<RegistrationChange>> {
    tracing::info!("Registering worker: {}", req.address);

    if req.address.trim().is_empty() {
        return Err(ApiError::BadRequest("Worker address is required".to_string()));
    }
    if req.project.is_some() && req.workspace.is_none() {
        return Err(ApiError::BadRequest(
            "A worker dedicated to a project must also name its workspace".to_string(),
        ));
    }

    let changed = queue.register_worker(req).await?;
    Ok(Json(RegistrationChange { changed }))
}

/// POST /admin/runner/server/unregister
pub async fn unregister_worker(
    State(queue): State<Arc<RunQueue>>,
    Json(req): Json<UnregisterWorker>,
) -> ApiResult<Json<RegistrationChange>> {
    tracing::info!("Unregistering worker: {}", req.address);

    let changed = queue.unregister_worker(&req.address);
    Ok(Json(RegistrationChange { changed }))
}

/// GET /admin/runner/servers
/// Registered worker nodes with the live state of their runners
pub async fn list_workers(State(queue): State<Arc<RunQueue>>) -> Json<Vec<WorkerNodeInfo>> {
    tracing::debug!("Listing worker nodes");

    Json(queue.workers().await)
}

/// GET /admin/runner/tasks
pub async fn list_tasks(State(queue): State<Arc<RunQueue>>) -> Json<Vec<TaskSummary>> {
    Json(queue.tasks())
}
