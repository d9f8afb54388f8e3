// In-memory storage - mutex-guarded maps upholding the same atomicity
// contracts as the Postgres implementation. Used by tests and demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use cadence_shared::{
    Contact, Deal, ExecutionStatus, HitlNotification, HitlStatus, InstanceStatus, Lead,
    TaskExecution, WorkflowInstance, WorkflowTask, WorkflowTemplate,
};

use super::{
    EntityStore, EventLedger, ExecutionStore, HitlStore, InstanceStore, StorageError,
    StorageResult, TemplateStore,
};

#[derive(Default)]
struct Inner {
    templates: HashMap<Uuid, WorkflowTemplate>,
    tasks: HashMap<Uuid, Vec<WorkflowTask>>,
    instances: HashMap<Uuid, WorkflowInstance>,
    executions: HashMap<Uuid, TaskExecution>,
    /// Execution ids per instance, in materialization (display) order.
    execution_order: HashMap<Uuid, Vec<Uuid>>,
    leads: HashMap<Uuid, Lead>,
    deals: HashMap<Uuid, Deal>,
    contacts: HashMap<Uuid, Contact>,
    seen_events: HashSet<Uuid>,
    hitl: HashMap<Uuid, HitlNotification>,
}

pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a holder panicked; the data is
        // still usable for the remaining test assertions.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Seeding helpers for tests and demos.

    pub fn put_lead(&self, lead: Lead) {
        self.lock().leads.insert(lead.id, lead);
    }

    pub fn put_deal(&self, deal: Deal) {
        self.lock().deals.insert(deal.id, deal);
    }

    pub fn put_contact(&self, contact: Contact) {
        self.lock().contacts.insert(contact.id, contact);
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateStore for InMemoryStorage {
    async fn get_template(&self, id: Uuid) -> StorageResult<Option<WorkflowTemplate>> {
        Ok(self.lock().templates.get(&id).cloned())
    }

    async fn template_tasks(&self, template_id: Uuid) -> StorageResult<Vec<WorkflowTask>> {
        let mut tasks = self
            .lock()
            .tasks
            .get(&template_id)
            .cloned()
            .unwrap_or_default();
        tasks.sort_by_key(|t| t.display_order);
        Ok(tasks)
    }

    async fn list_templates(&self, tenant_id: Uuid) -> StorageResult<Vec<WorkflowTemplate>> {
        let mut templates: Vec<_> = self
            .lock()
            .templates
            .values()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();
        templates.sort_by_key(|t| t.created_at);
        Ok(templates)
    }

    async fn active_templates(&self, tenant_id: Uuid) -> StorageResult<Vec<WorkflowTemplate>> {
        let mut templates: Vec<_> = self
            .lock()
            .templates
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.is_active)
            .cloned()
            .collect();
        templates.sort_by_key(|t| t.created_at);
        Ok(templates)
    }

    async fn create_template(
        &self,
        template: &WorkflowTemplate,
        tasks: &[WorkflowTask],
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.templates.insert(template.id, template.clone());
        inner.tasks.insert(template.id, tasks.to_vec());
        Ok(())
    }

    async fn update_template(
        &self,
        template: &WorkflowTemplate,
        tasks: Option<&[WorkflowTask]>,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        if !inner.templates.contains_key(&template.id) {
            return Err(StorageError::NotFound("Workflow template"));
        }
        inner.templates.insert(template.id, template.clone());
        if let Some(tasks) = tasks {
            inner.tasks.insert(template.id, tasks.to_vec());
        }
        Ok(())
    }

    async fn delete_template(&self, id: Uuid) -> StorageResult<()> {
        let mut inner = self.lock();
        inner
            .templates
            .remove(&id)
            .ok_or(StorageError::NotFound("Workflow template"))?;
        inner.tasks.remove(&id);
        Ok(())
    }

    async fn count_templates(&self, tenant_id: Uuid) -> StorageResult<i64> {
        Ok(self
            .lock()
            .templates
            .values()
            .filter(|t| t.tenant_id == tenant_id)
            .count() as i64)
    }

    async fn get_task(&self, id: Uuid) -> StorageResult<Option<WorkflowTask>> {
        Ok(self
            .lock()
            .tasks
            .values()
            .flatten()
            .find(|t| t.id == id)
            .cloned())
    }
}

#[async_trait]
impl InstanceStore for InMemoryStorage {
    async fn insert_instance(
        &self,
        instance: &WorkflowInstance,
        executions: &[TaskExecution],
    ) -> StorageResult<()> {
        let mut inner = self.lock();

        // Check-and-insert under a single lock; the Postgres store gets the
        // same guarantee from its partial unique index.
        let duplicate = inner.instances.values().any(|existing| {
            existing.template_id == instance.template_id
                && existing.status == InstanceStatus::Active
                && existing.lead_id == instance.lead_id
                && existing.deal_id == instance.deal_id
                && existing.contact_id == instance.contact_id
        });
        if duplicate && instance.status == InstanceStatus::Active {
            return Err(StorageError::DuplicateActiveInstance);
        }

        inner.instances.insert(instance.id, instance.clone());
        let order: Vec<Uuid> = executions.iter().map(|e| e.id).collect();
        for execution in executions {
            inner.executions.insert(execution.id, execution.clone());
        }
        inner.execution_order.insert(instance.id, order);
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> StorageResult<Option<WorkflowInstance>> {
        Ok(self.lock().instances.get(&id).cloned())
    }

    async fn list_instances(
        &self,
        tenant_id: Uuid,
        status: Option<InstanceStatus>,
    ) -> StorageResult<Vec<WorkflowInstance>> {
        let mut instances: Vec<_> = self
            .lock()
            .instances
            .values()
            .filter(|i| i.tenant_id == tenant_id && status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        instances.sort_by_key(|i| i.started_at);
        Ok(instances)
    }

    async fn set_instance_status(
        &self,
        id: Uuid,
        status: InstanceStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        let instance = inner
            .instances
            .get_mut(&id)
            .ok_or(StorageError::NotFound("Workflow instance"))?;
        instance.status = status;
        if completed_at.is_some() {
            instance.completed_at = completed_at;
        }
        Ok(())
    }

    async fn set_current_task(&self, id: Uuid, task_id: Option<Uuid>) -> StorageResult<()> {
        let mut inner = self.lock();
        let instance = inner
            .instances
            .get_mut(&id)
            .ok_or(StorageError::NotFound("Workflow instance"))?;
        instance.current_task_id = task_id;
        Ok(())
    }

    async fn count_by_status(
        &self,
        tenant_id: Uuid,
        status: InstanceStatus,
    ) -> StorageResult<i64> {
        Ok(self
            .lock()
            .instances
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.status == status)
            .count() as i64)
    }

    async fn count_active_for_template(&self, template_id: Uuid) -> StorageResult<i64> {
        Ok(self
            .lock()
            .instances
            .values()
            .filter(|i| i.template_id == template_id && i.status == InstanceStatus::Active)
            .count() as i64)
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStorage {
    async fn get_execution(&self, id: Uuid) -> StorageResult<Option<TaskExecution>> {
        Ok(self.lock().executions.get(&id).cloned())
    }

    async fn executions_for_instance(&self, instance_id: Uuid) -> StorageResult<Vec<TaskExecution>> {
        let inner = self.lock();
        let ids = inner
            .execution_order
            .get(&instance_id)
            .cloned()
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| inner.executions.get(id).cloned())
            .collect())
    }

    async fn due_executions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<TaskExecution>> {
        let inner = self.lock();
        let mut due: Vec<_> = inner
            .executions
            .values()
            .filter(|e| {
                e.status == ExecutionStatus::Pending
                    && e.scheduled_for.map_or(false, |at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|e| e.scheduled_for);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_execution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<TaskExecution>> {
        let mut inner = self.lock();
        let Some(execution) = inner.executions.get_mut(&id) else {
            return Ok(None);
        };
        if execution.status != ExecutionStatus::Pending {
            return Ok(None);
        }
        execution.status = ExecutionStatus::InProgress;
        execution.started_at = Some(now);
        Ok(Some(execution.clone()))
    }

    async fn update_execution(&self, execution: &TaskExecution) -> StorageResult<()> {
        let mut inner = self.lock();
        if !inner.executions.contains_key(&execution.id) {
            return Err(StorageError::NotFound("Task execution"));
        }
        inner.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn skip_pending_for_instance(&self, instance_id: Uuid) -> StorageResult<u64> {
        let mut inner = self.lock();
        let mut skipped = 0;
        for execution in inner.executions.values_mut() {
            if execution.instance_id == instance_id && execution.status == ExecutionStatus::Pending
            {
                execution.status = ExecutionStatus::Skipped;
                skipped += 1;
            }
        }
        Ok(skipped)
    }

    async fn stale_in_progress(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<TaskExecution>> {
        Ok(self
            .lock()
            .executions
            .values()
            .filter(|e| {
                e.status == ExecutionStatus::InProgress
                    && !e.hitl_pending
                    && e.started_at.map_or(false, |at| at < cutoff)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EntityStore for InMemoryStorage {
    async fn get_lead(&self, id: Uuid) -> StorageResult<Option<Lead>> {
        Ok(self.lock().leads.get(&id).cloned())
    }

    async fn get_deal(&self, id: Uuid) -> StorageResult<Option<Deal>> {
        Ok(self.lock().deals.get(&id).cloned())
    }

    async fn get_contact(&self, id: Uuid) -> StorageResult<Option<Contact>> {
        Ok(self.lock().contacts.get(&id).cloned())
    }
}

#[async_trait]
impl EventLedger for InMemoryStorage {
    async fn record_event(&self, event_id: Uuid) -> StorageResult<bool> {
        Ok(self.lock().seen_events.insert(event_id))
    }
}

#[async_trait]
impl HitlStore for InMemoryStorage {
    async fn create_notification(&self, notification: &HitlNotification) -> StorageResult<()> {
        self.lock()
            .hitl
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn pending_notifications(&self, tenant_id: Uuid) -> StorageResult<Vec<HitlNotification>> {
        let mut pending: Vec<_> = self
            .lock()
            .hitl
            .values()
            .filter(|n| n.tenant_id == tenant_id && n.status == HitlStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|n| n.created_at);
        Ok(pending)
    }

    async fn resolve_for_execution(
        &self,
        execution_id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        for notification in inner.hitl.values_mut() {
            if notification.execution_id == execution_id
                && notification.status == HitlStatus::Pending
            {
                notification.status = HitlStatus::Resolved;
                notification.resolved_at = Some(at);
            }
        }
        Ok(())
    }

    async fn count_pending(&self, tenant_id: Uuid) -> StorageResult<i64> {
        Ok(self
            .lock()
            .hitl
            .values()
            .filter(|n| n.tenant_id == tenant_id && n.status == HitlStatus::Pending)
            .count() as i64)
    }
}
