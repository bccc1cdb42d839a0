//! Run API Handlers
//!
//! Public endpoints for submitting runs and following their processes. Every
//! process is addressed by its scheduler task id within a workspace.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use runq_core::domain::process::ProcessDescriptor;
use runq_core::dto::run::{RunOptions, RunQuery};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::queue::{ProcessFilter, RunQueue};

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    pub project: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account: Option<String>,
}

// =============================================================================
// Submission
// =============================================================================

/// POST /runner/{ws}/run?project=
/// Submit a run; answers once the request is admitted
pub async fn run(
    State(queue): State<Arc<RunQueue>>,
    Path(workspace): Path<String>,
    Query(query): Query<RunQuery>,
    Json(options): Json<RunOptions>,
) -> ApiResult<Json<ProcessDescriptor>> {
    tracing::info!("Run requested for {}:{}", workspace, query.project);

    let task = queue.run(&workspace, &query.project, options).await?;

    Ok(Json(queue.describe(&task).await))
}

// =============================================================================
// Process Endpoints
// =============================================================================

/// GET /runner/{ws}/status/{id}
pub async fn status(
    State(queue): State<Arc<RunQueue>>,
    Path((workspace, id)): Path<(String, u64)>,
) -> ApiResult<Json<ProcessDescriptor>> {
    tracing::debug!("Status of process {} in {}", id, workspace);

    Ok(Json(queue.status(&workspace, id).await?))
}

/// POST /runner/{ws}/stop/{id}
/// Stop a process in any state; repeated stops return the same status
pub async fn stop(
    State(queue): State<Arc<RunQueue>>,
    Path((workspace, id)): Path<(String, u64)>,
) -> ApiResult<Json<ProcessDescriptor>> {
    tracing::info!("Stopping process {} in {}", id, workspace);

    Ok(Json(queue.stop(&workspace, id).await?))
}

/// GET /runner/{ws}/logs/{id}
pub async fn logs(
    State(queue): State<Arc<RunQueue>>,
    Path((workspace, id)): Path<(String, u64)>,
) -> ApiResult<String> {
    tracing::debug!("Logs of process {} in {}", id, workspace);

    Ok(queue.logs(&workspace, id).await?)
}

/// GET /runner/{ws}/recipe/{id}
pub async fn recipe(
    State(queue): State<Arc<RunQueue>>,
    Path((workspace, id)): Path<(String, u64)>,
) -> ApiResult<String> {
    Ok(queue.recipe(&workspace, id).await?)
}

/// GET /runner/{ws}/processes?project=
pub async fn workspace_processes(
    State(queue): State<Arc<RunQueue>>,
    Path(workspace): Path<String>,
    Query(query): Query<ProjectQuery>,
) -> ApiResult<Json<Vec<ProcessDescriptor>>> {
    tracing::debug!("Listing processes of {}", workspace);

    let filter = ProcessFilter {
        workspace: Some(workspace),
        project: query.project,
        account: None,
    };
    Ok(Json(queue.processes(&filter).await))
}

/// GET /runner/processes?account=
/// Processes of every workspace, optionally only those of one account
pub async fn account_processes(
    State(queue): State<Arc<RunQueue>>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<Vec<ProcessDescriptor>>> {
    let filter = ProcessFilter {
        account: query.account,
        ..Default::default()
    };
    Ok(Json(queue.processes(&filter).await))
}
