use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use cadence_shared::{HitlNotification, TaskExecution};

use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub approved: bool,
    pub resolved_by: Option<Uuid>,
    pub note: Option<String>,
}

pub fn hitl_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pending", get(list_pending))
        .route("/executions/:id/resolve", post(resolve_execution))
}

async fn list_pending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TenantQuery>,
) -> ApiResult<Json<Vec<HitlNotification>>> {
    let pending = state.storage.hitl.pending_notifications(params.tenant_id).await?;
    Ok(Json(pending))
}

/// Approve or reject a parked execution. Approval runs the task's executor
/// and the instance advances on its outcome; rejection skips the task and
/// advances directly.
async fn resolve_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<TaskExecution>> {
    let execution = state
        .engine
        .resolve_hitl(id, request.approved, request.resolved_by, request.note)
        .await?;
    Ok(Json(execution))
}
