// Instance Manager - instance lifecycle: start, pause, resume, cancel, stats

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use cadence_shared::{
    Binding, ExecutionStatus, InstanceStatus, TaskExecution, WorkflowInstance, WorkflowStats,
};

use crate::error::{ApiResult, AppError};
use crate::storage::Storage;
use crate::workflows::engine::WorkflowEngine;

/// How an instance came to be started; recorded on the instance.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub template_id: Uuid,
    pub tenant_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub trigger_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

pub struct InstanceManager {
    storage: Storage,
    engine: Arc<WorkflowEngine>,
}

impl InstanceManager {
    pub fn new(storage: Storage, engine: Arc<WorkflowEngine>) -> Self {
        Self { storage, engine }
    }

    /// Start an instance: validate the template and entity, materialize one
    /// execution per task, and dispatch the first task in the background.
    ///
    /// The insert enforces at-most-one-active-instance atomically, so under
    /// concurrent starts exactly one caller succeeds and the rest get a
    /// conflict.
    pub async fn start(&self, request: StartRequest) -> ApiResult<WorkflowInstance> {
        let template = self
            .storage
            .templates
            .get_template(request.template_id)
            .await?
            .ok_or(AppError::TemplateNotFound(request.template_id))?;

        if !template.is_active {
            return Err(AppError::TemplateInactive(template.id));
        }

        let tasks = self.storage.templates.template_tasks(template.id).await?;
        if tasks.is_empty() {
            return Err(AppError::TemplateHasNoTasks(template.id));
        }

        let binding = Binding::from_ids(request.lead_id, request.deal_id, request.contact_id)
            .ok_or_else(|| {
                AppError::BadRequest(
                    "Exactly one of lead_id, deal_id, contact_id must be provided".to_string(),
                )
            })?;
        self.verify_entity(&binding, request.tenant_id).await?;

        let now = Utc::now();
        let instance = WorkflowInstance {
            id: Uuid::new_v4(),
            template_id: template.id,
            tenant_id: request.tenant_id,
            lead_id: binding.lead_id(),
            deal_id: binding.deal_id(),
            contact_id: binding.contact_id(),
            status: InstanceStatus::Active,
            current_task_id: Some(tasks[0].id),
            trigger_type: request.trigger_type.unwrap_or_else(|| "MANUAL".to_string()),
            metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
            started_at: now,
            completed_at: None,
        };

        // The full plan is visible up front: the first task starts now, the
        // rest wait unscheduled until their predecessor completes.
        let executions: Vec<TaskExecution> = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| TaskExecution {
                id: Uuid::new_v4(),
                instance_id: instance.id,
                task_id: task.id,
                status: if i == 0 {
                    ExecutionStatus::InProgress
                } else {
                    ExecutionStatus::Pending
                },
                scheduled_for: (i == 0).then_some(now),
                started_at: (i == 0).then_some(now),
                completed_at: None,
                result: None,
                error_message: None,
                agent_used: None,
                hitl_pending: false,
                hitl_resolved_by: None,
                hitl_note: None,
            })
            .collect();

        self.storage
            .instances
            .insert_instance(&instance, &executions)
            .await?;

        tracing::info!(
            instance_id = %instance.id,
            template = %template.name,
            "Workflow instance started"
        );

        // Fire-and-forget: the caller gets the instance back immediately
        let engine = self.engine.clone();
        let first_execution_id = executions[0].id;
        tokio::spawn(async move {
            if let Err(e) = engine.execute_now(first_execution_id).await {
                tracing::error!(
                    execution_id = %first_execution_id,
                    "First task dispatch failed: {}",
                    e
                );
            }
        });

        Ok(instance)
    }

    async fn verify_entity(&self, binding: &Binding, tenant_id: Uuid) -> ApiResult<()> {
        let found = match binding {
            Binding::Lead(id) => self
                .storage
                .entities
                .get_lead(*id)
                .await?
                .is_some_and(|l| l.tenant_id == tenant_id),
            Binding::Deal(id) => self
                .storage
                .entities
                .get_deal(*id)
                .await?
                .is_some_and(|d| d.tenant_id == tenant_id),
            Binding::Contact(id) => self
                .storage
                .entities
                .get_contact(*id)
                .await?
                .is_some_and(|c| c.tenant_id == tenant_id),
        };
        if !found {
            let what = match binding {
                Binding::Lead(_) => "Lead",
                Binding::Deal(_) => "Deal",
                Binding::Contact(_) => "Contact",
            };
            return Err(AppError::EntityNotFound(what.to_string()));
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<WorkflowInstance> {
        self.storage
            .instances
            .get_instance(id)
            .await?
            .ok_or(AppError::InstanceNotFound(id))
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<InstanceStatus>,
    ) -> ApiResult<Vec<WorkflowInstance>> {
        Ok(self.storage.instances.list_instances(tenant_id, status).await?)
    }

    pub async fn executions(&self, instance_id: Uuid) -> ApiResult<Vec<TaskExecution>> {
        Ok(self
            .storage
            .executions
            .executions_for_instance(instance_id)
            .await?)
    }

    /// Pause an ACTIVE instance. Work already handed to an executor finishes
    /// and records its result; nothing new is dispatched.
    pub async fn pause(&self, id: Uuid) -> ApiResult<WorkflowInstance> {
        let instance = self.get(id).await?;
        if instance.status != InstanceStatus::Active {
            return Err(AppError::InvalidTransition(format!(
                "Cannot pause an instance in status {:?}",
                instance.status
            )));
        }
        self.storage
            .instances
            .set_instance_status(id, InstanceStatus::Paused, None)
            .await?;
        tracing::info!(instance_id = %id, "Workflow instance paused");
        self.get(id).await
    }

    /// Resume a PAUSED instance and re-dispatch any execution that came due
    /// while it slept.
    pub async fn resume(&self, id: Uuid) -> ApiResult<WorkflowInstance> {
        let instance = self.get(id).await?;
        if instance.status != InstanceStatus::Paused {
            return Err(AppError::InvalidTransition(format!(
                "Cannot resume an instance in status {:?}",
                instance.status
            )));
        }
        self.storage
            .instances
            .set_instance_status(id, InstanceStatus::Active, None)
            .await?;
        tracing::info!(instance_id = %id, "Workflow instance resumed");

        let now = Utc::now();
        let due = self
            .storage
            .executions
            .executions_for_instance(id)
            .await?
            .into_iter()
            .find(|e| {
                e.status == ExecutionStatus::Pending
                    && e.scheduled_for.is_some_and(|when| when <= now)
            });
        if let Some(execution) = due {
            let engine = self.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.execute_now(execution.id).await {
                    tracing::error!(execution_id = %execution.id, "Resume dispatch failed: {}", e);
                }
            });
        }

        self.get(id).await
    }

    /// Cancel an instance. Terminal: every remaining PENDING execution is
    /// SKIPPED, and in-flight work persists its result without advancing.
    pub async fn cancel(&self, id: Uuid) -> ApiResult<WorkflowInstance> {
        let instance = self.get(id).await?;
        match instance.status {
            InstanceStatus::Active | InstanceStatus::Paused => {}
            _ => {
                return Err(AppError::InvalidTransition(format!(
                    "Cannot cancel an instance in status {:?}",
                    instance.status
                )))
            }
        }

        self.storage
            .instances
            .set_instance_status(id, InstanceStatus::Cancelled, Some(Utc::now()))
            .await?;
        let skipped = self.storage.executions.skip_pending_for_instance(id).await?;
        tracing::info!(instance_id = %id, skipped, "Workflow instance cancelled");
        self.get(id).await
    }

    pub async fn stats(&self, tenant_id: Uuid) -> ApiResult<WorkflowStats> {
        Ok(WorkflowStats {
            total_templates: self.storage.templates.count_templates(tenant_id).await?,
            active_instances: self
                .storage
                .instances
                .count_by_status(tenant_id, InstanceStatus::Active)
                .await?,
            completed_instances: self
                .storage
                .instances
                .count_by_status(tenant_id, InstanceStatus::Completed)
                .await?,
            pending_approvals: self.storage.hitl.count_pending(tenant_id).await?,
        })
    }
}
