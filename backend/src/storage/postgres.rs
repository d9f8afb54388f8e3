// Postgres storage - runtime sqlx queries against the workflow schema.
//
// The at-most-one-active-instance invariant lives in the database as a
// partial unique index (uq_workflow_instances_active_binding); the insert
// translates that violation into `DuplicateActiveInstance` so concurrent
// starters observe a clean conflict instead of a second active instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cadence_shared::{
    Contact, Deal, ExecutionStatus, HitlNotification, HitlStatus, InstanceStatus, Lead,
    TaskExecution, WorkflowInstance, WorkflowTask, WorkflowTemplate,
};

use super::{
    EntityStore, EventLedger, ExecutionStore, HitlStore, InstanceStore, StorageError,
    StorageResult, TemplateStore,
};

const ACTIVE_BINDING_INDEX: &str = "uq_workflow_instances_active_binding";

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_task(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        task: &WorkflowTask,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_tasks
                (id, template_id, name, description, display_order, task_type,
                 assigned_agent_type, delay_value, delay_unit, is_hitl, is_optional,
                 branch_condition, action_config)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(task.id)
        .bind(task.template_id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.display_order)
        .bind(&task.task_type)
        .bind(&task.assigned_agent_type)
        .bind(task.delay_value)
        .bind(task.delay_unit)
        .bind(task.is_hitl)
        .bind(task.is_optional)
        .bind(&task.branch_condition)
        .bind(&task.action_config)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for PgStorage {
    async fn get_template(&self, id: Uuid) -> StorageResult<Option<WorkflowTemplate>> {
        let template = sqlx::query_as::<_, WorkflowTemplate>(
            "SELECT * FROM workflow_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn template_tasks(&self, template_id: Uuid) -> StorageResult<Vec<WorkflowTask>> {
        let tasks = sqlx::query_as::<_, WorkflowTask>(
            "SELECT * FROM workflow_tasks WHERE template_id = $1 ORDER BY display_order ASC",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn list_templates(&self, tenant_id: Uuid) -> StorageResult<Vec<WorkflowTemplate>> {
        let templates = sqlx::query_as::<_, WorkflowTemplate>(
            "SELECT * FROM workflow_templates WHERE tenant_id = $1 ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn active_templates(&self, tenant_id: Uuid) -> StorageResult<Vec<WorkflowTemplate>> {
        let templates = sqlx::query_as::<_, WorkflowTemplate>(
            "SELECT * FROM workflow_templates
             WHERE tenant_id = $1 AND is_active = TRUE
             ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn create_template(
        &self,
        template: &WorkflowTemplate,
        tasks: &[WorkflowTask],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflow_templates
                (id, tenant_id, name, description, industry, is_active, trigger_config,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(template.id)
        .bind(template.tenant_id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.industry)
        .bind(template.is_active)
        .bind(&template.trigger_config)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&mut *tx)
        .await?;

        for task in tasks {
            Self::insert_task(&mut tx, task).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_template(
        &self,
        template: &WorkflowTemplate,
        tasks: Option<&[WorkflowTask]>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE workflow_templates
            SET name = $2, description = $3, industry = $4, is_active = $5,
                trigger_config = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.industry)
        .bind(template.is_active)
        .bind(&template.trigger_config)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("Workflow template"));
        }

        if let Some(tasks) = tasks {
            sqlx::query("DELETE FROM workflow_tasks WHERE template_id = $1")
                .bind(template.id)
                .execute(&mut *tx)
                .await?;
            for task in tasks {
                Self::insert_task(&mut tx, task).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_template(&self, id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM workflow_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("Workflow template"));
        }
        Ok(())
    }

    async fn count_templates(&self, tenant_id: Uuid) -> StorageResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM workflow_templates WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    async fn get_task(&self, id: Uuid) -> StorageResult<Option<WorkflowTask>> {
        let task = sqlx::query_as::<_, WorkflowTask>("SELECT * FROM workflow_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }
}

#[async_trait]
impl InstanceStore for PgStorage {
    async fn insert_instance(
        &self,
        instance: &WorkflowInstance,
        executions: &[TaskExecution],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO workflow_instances
                (id, template_id, tenant_id, lead_id, deal_id, contact_id, status,
                 current_task_id, trigger_type, metadata, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(instance.id)
        .bind(instance.template_id)
        .bind(instance.tenant_id)
        .bind(instance.lead_id)
        .bind(instance.deal_id)
        .bind(instance.contact_id)
        .bind(instance.status)
        .bind(instance.current_task_id)
        .bind(&instance.trigger_type)
        .bind(&instance.metadata)
        .bind(instance.started_at)
        .bind(instance.completed_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if let sqlx::Error::Database(db) = &e {
                if db.constraint() == Some(ACTIVE_BINDING_INDEX) {
                    return Err(StorageError::DuplicateActiveInstance);
                }
            }
            return Err(e.into());
        }

        for execution in executions {
            sqlx::query(
                r#"
                INSERT INTO task_executions
                    (id, instance_id, task_id, status, scheduled_for, started_at,
                     completed_at, result, error_message, agent_used, hitl_pending,
                     hitl_resolved_by, hitl_note)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(execution.id)
            .bind(execution.instance_id)
            .bind(execution.task_id)
            .bind(execution.status)
            .bind(execution.scheduled_for)
            .bind(execution.started_at)
            .bind(execution.completed_at)
            .bind(&execution.result)
            .bind(&execution.error_message)
            .bind(&execution.agent_used)
            .bind(execution.hitl_pending)
            .bind(execution.hitl_resolved_by)
            .bind(&execution.hitl_note)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> StorageResult<Option<WorkflowInstance>> {
        let instance = sqlx::query_as::<_, WorkflowInstance>(
            "SELECT * FROM workflow_instances WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(instance)
    }

    async fn list_instances(
        &self,
        tenant_id: Uuid,
        status: Option<InstanceStatus>,
    ) -> StorageResult<Vec<WorkflowInstance>> {
        let instances = match status {
            Some(status) => {
                sqlx::query_as::<_, WorkflowInstance>(
                    "SELECT * FROM workflow_instances
                     WHERE tenant_id = $1 AND status = $2
                     ORDER BY started_at ASC",
                )
                .bind(tenant_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, WorkflowInstance>(
                    "SELECT * FROM workflow_instances WHERE tenant_id = $1 ORDER BY started_at ASC",
                )
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(instances)
    }

    async fn set_instance_status(
        &self,
        id: Uuid,
        status: InstanceStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE workflow_instances
             SET status = $2, completed_at = COALESCE($3, completed_at)
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("Workflow instance"));
        }
        Ok(())
    }

    async fn set_current_task(&self, id: Uuid, task_id: Option<Uuid>) -> StorageResult<()> {
        let result = sqlx::query("UPDATE workflow_instances SET current_task_id = $2 WHERE id = $1")
            .bind(id)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("Workflow instance"));
        }
        Ok(())
    }

    async fn count_by_status(
        &self,
        tenant_id: Uuid,
        status: InstanceStatus,
    ) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workflow_instances WHERE tenant_id = $1 AND status = $2",
        )
        .bind(tenant_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    async fn count_active_for_template(&self, template_id: Uuid) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workflow_instances WHERE template_id = $1 AND status = $2",
        )
        .bind(template_id)
        .bind(InstanceStatus::Active)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl ExecutionStore for PgStorage {
    async fn get_execution(&self, id: Uuid) -> StorageResult<Option<TaskExecution>> {
        let execution =
            sqlx::query_as::<_, TaskExecution>("SELECT * FROM task_executions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(execution)
    }

    async fn executions_for_instance(&self, instance_id: Uuid) -> StorageResult<Vec<TaskExecution>> {
        let executions = sqlx::query_as::<_, TaskExecution>(
            r#"
            SELECT te.*
            FROM task_executions te
            LEFT JOIN workflow_tasks wt ON wt.id = te.task_id
            WHERE te.instance_id = $1
            ORDER BY wt.display_order ASC NULLS LAST, te.scheduled_for ASC NULLS LAST
            "#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(executions)
    }

    async fn due_executions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<TaskExecution>> {
        let executions = sqlx::query_as::<_, TaskExecution>(
            "SELECT * FROM task_executions
             WHERE status = $1 AND scheduled_for IS NOT NULL AND scheduled_for <= $2
             ORDER BY scheduled_for ASC
             LIMIT $3",
        )
        .bind(ExecutionStatus::Pending)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(executions)
    }

    async fn claim_execution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<TaskExecution>> {
        // Conditional update so two racing workers cannot both claim
        let claimed = sqlx::query_as::<_, TaskExecution>(
            "UPDATE task_executions
             SET status = $3, started_at = $2
             WHERE id = $1 AND status = $4
             RETURNING *",
        )
        .bind(id)
        .bind(now)
        .bind(ExecutionStatus::InProgress)
        .bind(ExecutionStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed)
    }

    async fn update_execution(&self, execution: &TaskExecution) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE task_executions
            SET status = $2, scheduled_for = $3, started_at = $4, completed_at = $5,
                result = $6, error_message = $7, agent_used = $8, hitl_pending = $9,
                hitl_resolved_by = $10, hitl_note = $11
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status)
        .bind(execution.scheduled_for)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(&execution.result)
        .bind(&execution.error_message)
        .bind(&execution.agent_used)
        .bind(execution.hitl_pending)
        .bind(execution.hitl_resolved_by)
        .bind(&execution.hitl_note)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("Task execution"));
        }
        Ok(())
    }

    async fn skip_pending_for_instance(&self, instance_id: Uuid) -> StorageResult<u64> {
        let result = sqlx::query(
            "UPDATE task_executions SET status = $2 WHERE instance_id = $1 AND status = $3",
        )
        .bind(instance_id)
        .bind(ExecutionStatus::Skipped)
        .bind(ExecutionStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn stale_in_progress(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<TaskExecution>> {
        let executions = sqlx::query_as::<_, TaskExecution>(
            "SELECT * FROM task_executions
             WHERE status = $1 AND hitl_pending = FALSE AND started_at < $2",
        )
        .bind(ExecutionStatus::InProgress)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(executions)
    }
}

#[async_trait]
impl EntityStore for PgStorage {
    async fn get_lead(&self, id: Uuid) -> StorageResult<Option<Lead>> {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lead)
    }

    async fn get_deal(&self, id: Uuid) -> StorageResult<Option<Deal>> {
        let deal = sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(deal)
    }

    async fn get_contact(&self, id: Uuid) -> StorageResult<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contact)
    }
}

#[async_trait]
impl EventLedger for PgStorage {
    async fn record_event(&self, event_id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO workflow_events (event_id, received_at)
             VALUES ($1, NOW())
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl HitlStore for PgStorage {
    async fn create_notification(&self, notification: &HitlNotification) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hitl_notifications
                (id, tenant_id, execution_id, task_name, workflow_name, contact_name,
                 contact_email, contact_phone, urgency, status, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(notification.id)
        .bind(notification.tenant_id)
        .bind(notification.execution_id)
        .bind(&notification.task_name)
        .bind(&notification.workflow_name)
        .bind(&notification.contact_name)
        .bind(&notification.contact_email)
        .bind(&notification.contact_phone)
        .bind(&notification.urgency)
        .bind(notification.status)
        .bind(notification.created_at)
        .bind(notification.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_notifications(&self, tenant_id: Uuid) -> StorageResult<Vec<HitlNotification>> {
        let notifications = sqlx::query_as::<_, HitlNotification>(
            "SELECT * FROM hitl_notifications
             WHERE tenant_id = $1 AND status = $2
             ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .bind(HitlStatus::Pending)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    async fn resolve_for_execution(
        &self,
        execution_id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE hitl_notifications
             SET status = $2, resolved_at = $3
             WHERE execution_id = $1 AND status = $4",
        )
        .bind(execution_id)
        .bind(HitlStatus::Resolved)
        .bind(at)
        .bind(HitlStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_pending(&self, tenant_id: Uuid) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM hitl_notifications WHERE tenant_id = $1 AND status = $2",
        )
        .bind(tenant_id)
        .bind(HitlStatus::Pending)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}
