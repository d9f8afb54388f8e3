use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use cadence_shared::{InstanceStatus, TaskExecution, WorkflowInstance, WorkflowStats};

use crate::error::ApiResult;
use crate::workflows::instances::StartRequest;
use crate::AppState;

#[derive(Deserialize)]
pub struct InstanceQuery {
    pub tenant_id: Uuid,
    pub status: Option<InstanceStatus>,
}

#[derive(Serialize)]
pub struct InstanceResponse {
    #[serde(flatten)]
    pub instance: WorkflowInstance,
    pub executions: Vec<TaskExecution>,
}

pub fn instance_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_instances).post(start_instance))
        .route("/stats", get(get_stats))
        .route("/:id", get(get_instance))
        .route("/:id/pause", post(pause_instance))
        .route("/:id/resume", post(resume_instance))
        .route("/:id/cancel", post(cancel_instance))
        .route("/executions/:id/dispatch", post(dispatch_execution))
}

async fn start_instance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowInstance>)> {
    let instance = state.instances.start(request).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn list_instances(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InstanceQuery>,
) -> ApiResult<Json<Vec<WorkflowInstance>>> {
    let instances = state.instances.list(params.tenant_id, params.status).await?;
    Ok(Json(instances))
}

async fn get_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<InstanceResponse>> {
    let instance = state.instances.get(id).await?;
    let executions = state.instances.executions(id).await?;
    Ok(Json(InstanceResponse {
        instance,
        executions,
    }))
}

async fn pause_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowInstance>> {
    Ok(Json(state.instances.pause(id).await?))
}

async fn resume_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowInstance>> {
    Ok(Json(state.instances.resume(id).await?))
}

async fn cancel_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowInstance>> {
    Ok(Json(state.instances.cancel(id).await?))
}

/// Manually dispatch a pending execution, e.g. to retry after a failure was
/// fixed upstream. Goes through the same claim as the poller.
async fn dispatch_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskExecution>> {
    Ok(Json(state.engine.execute_now(id).await?))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InstanceQuery>,
) -> ApiResult<Json<WorkflowStats>> {
    Ok(Json(state.instances.stats(params.tenant_id).await?))
}
