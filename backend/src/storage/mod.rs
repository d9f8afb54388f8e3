// Storage ports - persistence boundaries for the workflow engine
//
// Each engine component talks to storage through one of these traits so the
// engine itself never assumes a concrete database. Production wires the
// Postgres implementation; tests wire the in-memory one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use cadence_shared::{
    Contact, Deal, HitlNotification, InstanceStatus, Lead, TaskExecution, WorkflowInstance,
    WorkflowTask, WorkflowTemplate,
};

mod memory;
mod postgres;

pub use memory::InMemoryStorage;
pub use postgres::PgStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("an active instance already exists for this template and entity")]
    DuplicateActiveInstance,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Templates and their tasks. Read-mostly from the engine's point of view;
/// writes come from the template CRUD boundary.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_template(&self, id: Uuid) -> StorageResult<Option<WorkflowTemplate>>;
    /// Tasks of a template ordered by `display_order`.
    async fn template_tasks(&self, template_id: Uuid) -> StorageResult<Vec<WorkflowTask>>;
    async fn list_templates(&self, tenant_id: Uuid) -> StorageResult<Vec<WorkflowTemplate>>;
    async fn active_templates(&self, tenant_id: Uuid) -> StorageResult<Vec<WorkflowTemplate>>;
    async fn create_template(
        &self,
        template: &WorkflowTemplate,
        tasks: &[WorkflowTask],
    ) -> StorageResult<()>;
    /// Replaces template metadata, and the task list when one is given.
    /// Existing executions keep referencing the old task rows' data; they
    /// are never rewritten retroactively.
    async fn update_template(
        &self,
        template: &WorkflowTemplate,
        tasks: Option<&[WorkflowTask]>,
    ) -> StorageResult<()>;
    async fn delete_template(&self, id: Uuid) -> StorageResult<()>;
    async fn count_templates(&self, tenant_id: Uuid) -> StorageResult<i64>;
    /// Look up a single task row (executions reference tasks by id).
    async fn get_task(&self, id: Uuid) -> StorageResult<Option<WorkflowTask>>;
}

/// Workflow instances. The insert enforces the at-most-one-active-instance
/// invariant atomically and fails with `DuplicateActiveInstance` otherwise.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn insert_instance(
        &self,
        instance: &WorkflowInstance,
        executions: &[TaskExecution],
    ) -> StorageResult<()>;
    async fn get_instance(&self, id: Uuid) -> StorageResult<Option<WorkflowInstance>>;
    async fn list_instances(
        &self,
        tenant_id: Uuid,
        status: Option<InstanceStatus>,
    ) -> StorageResult<Vec<WorkflowInstance>>;
    async fn set_instance_status(
        &self,
        id: Uuid,
        status: InstanceStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;
    async fn set_current_task(&self, id: Uuid, task_id: Option<Uuid>) -> StorageResult<()>;
    async fn count_by_status(
        &self,
        tenant_id: Uuid,
        status: InstanceStatus,
    ) -> StorageResult<i64>;
    async fn count_active_for_template(&self, template_id: Uuid) -> StorageResult<i64>;
}

/// Task executions. `claim` is the concurrency linchpin: a conditional
/// PENDING -> IN_PROGRESS transition so racing workers cannot both win.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn get_execution(&self, id: Uuid) -> StorageResult<Option<TaskExecution>>;
    /// Executions of an instance in task display order.
    async fn executions_for_instance(&self, instance_id: Uuid) -> StorageResult<Vec<TaskExecution>>;
    /// PENDING executions with `scheduled_for <= now`, ordered by `scheduled_for`.
    async fn due_executions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<TaskExecution>>;
    /// Atomically flip PENDING -> IN_PROGRESS. Returns `None` when another
    /// worker won the race or the execution is no longer claimable.
    async fn claim_execution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<TaskExecution>>;
    async fn update_execution(&self, execution: &TaskExecution) -> StorageResult<()>;
    /// Cancellation path: every remaining PENDING execution becomes SKIPPED.
    async fn skip_pending_for_instance(&self, instance_id: Uuid) -> StorageResult<u64>;
    /// IN_PROGRESS executions started before `cutoff`, excluding ones
    /// legitimately parked at a HITL gate.
    async fn stale_in_progress(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<TaskExecution>>;
}

/// Bound CRM entities, read-only at this boundary.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_lead(&self, id: Uuid) -> StorageResult<Option<Lead>>;
    async fn get_deal(&self, id: Uuid) -> StorageResult<Option<Deal>>;
    async fn get_contact(&self, id: Uuid) -> StorageResult<Option<Contact>>;
}

/// Dedupe ledger for trigger events, making at-least-once delivery safe.
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Record an event id. Returns `false` when it was already recorded.
    async fn record_event(&self, event_id: Uuid) -> StorageResult<bool>;
}

/// HITL approval requests.
#[async_trait]
pub trait HitlStore: Send + Sync {
    async fn create_notification(&self, notification: &HitlNotification) -> StorageResult<()>;
    async fn pending_notifications(&self, tenant_id: Uuid) -> StorageResult<Vec<HitlNotification>>;
    async fn resolve_for_execution(
        &self,
        execution_id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;
    async fn count_pending(&self, tenant_id: Uuid) -> StorageResult<i64>;
}

/// Bundle of storage ports handed to the engine components.
#[derive(Clone)]
pub struct Storage {
    pub templates: Arc<dyn TemplateStore>,
    pub instances: Arc<dyn InstanceStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub entities: Arc<dyn EntityStore>,
    pub events: Arc<dyn EventLedger>,
    pub hitl: Arc<dyn HitlStore>,
}

impl Storage {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStorage::new(pool));
        Self {
            templates: store.clone(),
            instances: store.clone(),
            executions: store.clone(),
            entities: store.clone(),
            events: store.clone(),
            hitl: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(InMemoryStorage::new()))
    }

    pub fn from_memory(store: Arc<InMemoryStorage>) -> Self {
        Self {
            templates: store.clone(),
            instances: store.clone(),
            executions: store.clone(),
            entities: store.clone(),
            events: store.clone(),
            hitl: store,
        }
    }
}
