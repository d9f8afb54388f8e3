use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use cadence_shared::{DelayUnit, Industry, TaskType, WorkflowTask, WorkflowTemplate};

use crate::error::{ApiResult, AppError, ValidationBuilder};
use crate::workflows::catalog;
use crate::AppState;

#[derive(Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

#[derive(Deserialize, Validate)]
pub struct TaskInput {
    #[validate(length(min = 1, max = 200, message = "Task name must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub task_type: String,
    pub assigned_agent_type: Option<String>,
    #[serde(default)]
    pub delay_value: i32,
    #[serde(default = "default_delay_unit")]
    pub delay_unit: DelayUnit,
    #[serde(default)]
    pub is_hitl: bool,
    #[serde(default)]
    pub is_optional: bool,
    pub branch_condition: Option<serde_json::Value>,
    #[serde(default = "default_action_config")]
    pub action_config: serde_json::Value,
}

fn default_delay_unit() -> DelayUnit {
    DelayUnit::Minutes
}

fn default_action_config() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Deserialize, Validate)]
pub struct CreateTemplateRequest {
    pub tenant_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Template name must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    /// Raw industry label; aliases like "DENTAL" fold into the canonical set.
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub trigger_config: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(nested)]
    pub tasks: Vec<TaskInput>,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Validate)]
pub struct UpdateTemplateRequest {
    #[validate(length(min = 1, max = 200, message = "Template name must be 1-200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub is_active: Option<bool>,
    pub trigger_config: Option<serde_json::Value>,
    /// When present, replaces the whole task list.
    #[validate(nested)]
    pub tasks: Option<Vec<TaskInput>>,
}

#[derive(Serialize)]
pub struct TemplateResponse {
    #[serde(flatten)]
    pub template: WorkflowTemplate,
    pub tasks: Vec<WorkflowTask>,
}

pub fn template_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route(
            "/:id",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route("/seed", post(seed_templates))
        .route("/catalog/:industry", get(get_task_catalog))
}

/// Turn task inputs into task rows, normalizing unknown task types to
/// CUSTOM so drafts with ad-hoc keys still save.
fn materialize_tasks(template_id: Uuid, inputs: &[TaskInput]) -> ApiResult<Vec<WorkflowTask>> {
    let mut builder = ValidationBuilder::new();
    for (i, input) in inputs.iter().enumerate() {
        if input.delay_value < 0 {
            builder = builder.error(
                &format!("tasks[{}].delay_value", i),
                "Delay must be non-negative",
            );
        }
    }
    if let Some(error) = builder.build() {
        return Err(error);
    }

    Ok(inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let task_type = match TaskType::parse(&input.task_type) {
                Some(t) => t.as_str().to_string(),
                None => {
                    tracing::debug!(
                        raw = %input.task_type,
                        "Unknown task type normalized to CUSTOM"
                    );
                    TaskType::Custom.as_str().to_string()
                }
            };
            WorkflowTask {
                id: Uuid::new_v4(),
                template_id,
                name: input.name.clone(),
                description: input.description.clone(),
                display_order: i as i32,
                task_type,
                assigned_agent_type: input.assigned_agent_type.clone(),
                delay_value: input.delay_value,
                delay_unit: input.delay_unit,
                is_hitl: input.is_hitl,
                is_optional: input.is_optional,
                branch_condition: input.branch_condition.clone(),
                action_config: input.action_config.clone(),
            }
        })
        .collect())
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TenantQuery>,
) -> ApiResult<Json<Vec<WorkflowTemplate>>> {
    let templates = state.storage.templates.list_templates(params.tenant_id).await?;
    Ok(Json(templates))
}

async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TemplateResponse>> {
    let template = state
        .storage
        .templates
        .get_template(id)
        .await?
        .ok_or(AppError::TemplateNotFound(id))?;
    let tasks = state.storage.templates.template_tasks(id).await?;
    Ok(Json(TemplateResponse { template, tasks }))
}

async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTemplateRequest>,
) -> ApiResult<(StatusCode, Json<TemplateResponse>)> {
    request.validate()?;

    let template = WorkflowTemplate {
        id: Uuid::new_v4(),
        tenant_id: request.tenant_id,
        name: request.name.clone(),
        description: request.description.clone(),
        industry: request
            .industry
            .as_deref()
            .map(Industry::normalize)
            .unwrap_or(Industry::Generic),
        is_active: request.is_active,
        trigger_config: request.trigger_config.clone(),
        created_at: Utc::now(),
        updated_at: None,
    };
    let tasks = materialize_tasks(template.id, &request.tasks)?;

    state.storage.templates.create_template(&template, &tasks).await?;
    tracing::info!(template_id = %template.id, name = %template.name, "Template created");

    Ok((
        StatusCode::CREATED,
        Json(TemplateResponse { template, tasks }),
    ))
}

async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTemplateRequest>,
) -> ApiResult<Json<TemplateResponse>> {
    request.validate()?;

    let mut template = state
        .storage
        .templates
        .get_template(id)
        .await?
        .ok_or(AppError::TemplateNotFound(id))?;

    if let Some(name) = request.name {
        template.name = name;
    }
    if let Some(description) = request.description {
        template.description = Some(description);
    }
    if let Some(industry) = request.industry.as_deref() {
        template.industry = Industry::normalize(industry);
    }
    if let Some(is_active) = request.is_active {
        template.is_active = is_active;
    }
    if let Some(trigger_config) = request.trigger_config {
        template.trigger_config = Some(trigger_config);
    }
    template.updated_at = Some(Utc::now());

    let tasks = match &request.tasks {
        Some(inputs) => Some(materialize_tasks(template.id, inputs)?),
        None => None,
    };
    state
        .storage
        .templates
        .update_template(&template, tasks.as_deref())
        .await?;

    let tasks = state.storage.templates.template_tasks(id).await?;
    Ok(Json(TemplateResponse { template, tasks }))
}

async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .storage
        .templates
        .get_template(id)
        .await?
        .ok_or(AppError::TemplateNotFound(id))?;

    // Running work must finish or be cancelled before the definition goes
    let active = state.storage.instances.count_active_for_template(id).await?;
    if active > 0 {
        return Err(AppError::Conflict(format!(
            "Template has {} active instance(s); cancel them before deleting",
            active
        )));
    }

    state.storage.templates.delete_template(id).await?;
    tracing::info!(template_id = %id, "Template deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn seed_templates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TenantQuery>,
) -> ApiResult<(StatusCode, Json<Vec<WorkflowTemplate>>)> {
    let created = catalog::seed_builtin_templates(&state.storage, params.tenant_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_task_catalog(Path(industry): Path<String>) -> Json<Vec<&'static str>> {
    let industry = Industry::normalize(&industry);
    Json(
        catalog::task_catalog(industry)
            .into_iter()
            .map(|t| t.as_str())
            .collect(),
    )
}
