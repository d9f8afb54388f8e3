// Workflow Engine - claims due executions, runs executors, advances instances

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use cadence_shared::{
    Binding, ExecutionStatus, HitlNotification, HitlStatus, Industry, InstanceStatus, TaskExecution,
    TaskType, WorkflowInstance, WorkflowTask,
};

use crate::config::EngineConfig;
use crate::error::{ApiResult, AppError};
use crate::storage::Storage;
use crate::workflows::conditions::{BranchCondition, BranchTarget};
use crate::workflows::executors::{EntityContext, ExecutionOutcome, ExecutorRegistry};
use crate::workflows::scheduler::TaskScheduler;

/// The dispatch core. One instance progresses serially: exactly one of its
/// executions is IN_PROGRESS at a time, and every transition re-checks the
/// instance's status so pause/cancel take effect between tasks.
pub struct WorkflowEngine {
    storage: Storage,
    registry: ExecutorRegistry,
    scheduler: TaskScheduler,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(storage: Storage, registry: ExecutorRegistry, config: EngineConfig) -> Self {
        let scheduler = TaskScheduler::new(storage.clone());
        Self {
            storage,
            registry,
            scheduler,
            config,
        }
    }

    /// One poller tick: claim and run every due execution. Returns how many
    /// executions were claimed.
    pub async fn poll_due(&self) -> anyhow::Result<usize> {
        let now = Utc::now();
        let due = self
            .scheduler
            .due(now, self.config.due_batch_size)
            .await?;

        let mut claimed_count = 0;
        for execution in due {
            // The claim is the race arbiter; a None means another worker
            // (or a cancellation) got there first.
            match self.storage.executions.claim_execution(execution.id, now).await? {
                Some(claimed) => {
                    claimed_count += 1;
                    if let Err(e) = self.run_chain(claimed).await {
                        tracing::error!(execution_id = %execution.id, "Dispatch failed: {}", e);
                    }
                }
                None => {
                    tracing::debug!(execution_id = %execution.id, "Lost claim race, skipping");
                }
            }
        }
        Ok(claimed_count)
    }

    /// Dispatch a single execution now. Accepts a freshly seeded IN_PROGRESS
    /// execution (instance start) or claims a PENDING one (manual dispatch).
    pub async fn execute_now(&self, execution_id: Uuid) -> ApiResult<TaskExecution> {
        let execution = self
            .storage
            .executions
            .get_execution(execution_id)
            .await?
            .ok_or(AppError::ExecutionNotFound(execution_id))?;

        let runnable = match execution.status {
            ExecutionStatus::InProgress if !execution.hitl_pending => execution,
            ExecutionStatus::Pending => self
                .storage
                .executions
                .claim_execution(execution_id, Utc::now())
                .await?
                .ok_or_else(|| {
                    AppError::Conflict("Execution was claimed by another worker".to_string())
                })?,
            _ => {
                return Err(AppError::InvalidTransition(format!(
                    "Execution {} is not dispatchable in its current state",
                    execution_id
                )))
            }
        };

        let id = runnable.id;
        self.run_chain(runnable).await?;

        let refreshed = self
            .storage
            .executions
            .get_execution(id)
            .await?
            .ok_or(AppError::ExecutionNotFound(id))?;
        Ok(refreshed)
    }

    /// Run an execution and keep going while successors come due
    /// immediately (zero-delay chains).
    async fn run_chain(&self, mut execution: TaskExecution) -> ApiResult<()> {
        loop {
            match self.process(execution, false).await? {
                Some(next) => execution = next,
                None => return Ok(()),
            }
        }
    }

    /// Run one claimed execution end to end. Returns the next execution when
    /// it is already claimed and due, so the caller can continue the chain.
    ///
    /// `hitl_cleared` is set on the approval path, where the human gate has
    /// already been satisfied for this execution.
    async fn process(
        &self,
        mut execution: TaskExecution,
        hitl_cleared: bool,
    ) -> ApiResult<Option<TaskExecution>> {
        let instance = self
            .storage
            .instances
            .get_instance(execution.instance_id)
            .await?
            .ok_or(AppError::InstanceNotFound(execution.instance_id))?;

        // Status re-check between claim and run
        match instance.status {
            InstanceStatus::Active => {}
            InstanceStatus::Paused => {
                // Put the claim back; the resume path re-dispatches.
                execution.status = ExecutionStatus::Pending;
                execution.started_at = None;
                self.storage.executions.update_execution(&execution).await?;
                return Ok(None);
            }
            InstanceStatus::Cancelled => {
                execution.status = ExecutionStatus::Skipped;
                execution.completed_at = Some(Utc::now());
                self.storage.executions.update_execution(&execution).await?;
                return Ok(None);
            }
            InstanceStatus::Completed => return Ok(None),
        }

        let Some(task) = self.storage.templates.get_task(execution.task_id).await? else {
            return self
                .record_failure(
                    execution,
                    &instance,
                    None,
                    "Task definition no longer exists",
                )
                .await;
        };

        // Human gate: park the execution and raise an approval request
        if task.is_hitl && !hitl_cleared {
            return self.park_for_approval(execution, &instance, &task).await;
        }

        let entity = match self.load_entity(&instance).await? {
            Some(entity) => entity,
            None => {
                return self
                    .record_failure(execution, &instance, Some(&task), "Bound entity no longer exists")
                    .await;
            }
        };

        let outcome = self.run_executor(&instance, &task, &entity).await;
        self.apply_outcome(execution, instance, task, entity, outcome)
            .await
    }

    async fn park_for_approval(
        &self,
        mut execution: TaskExecution,
        instance: &WorkflowInstance,
        task: &WorkflowTask,
    ) -> ApiResult<Option<TaskExecution>> {
        execution.hitl_pending = true;
        self.storage.executions.update_execution(&execution).await?;

        let entity = self.load_entity(instance).await?.unwrap_or_default();
        let workflow_name = self
            .storage
            .templates
            .get_template(instance.template_id)
            .await?
            .map(|t| t.name)
            .unwrap_or_default();

        let notification = HitlNotification {
            id: Uuid::new_v4(),
            tenant_id: instance.tenant_id,
            execution_id: execution.id,
            task_name: task.name.clone(),
            workflow_name,
            contact_name: entity.contact_person(),
            contact_email: entity.email().map(String::from),
            contact_phone: entity.phone().map(String::from),
            urgency: task
                .action_config
                .get("urgency")
                .and_then(|v| v.as_str())
                .unwrap_or("normal")
                .to_string(),
            status: HitlStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.storage.hitl.create_notification(&notification).await?;

        tracing::info!(
            execution_id = %execution.id,
            task = %task.name,
            "Execution awaiting human approval"
        );
        Ok(None)
    }

    /// Resolve a parked HITL execution. Approval runs the executor and the
    /// instance advances on its outcome; rejection skips the task and
    /// advances directly.
    pub async fn resolve_hitl(
        &self,
        execution_id: Uuid,
        approved: bool,
        resolved_by: Option<Uuid>,
        note: Option<String>,
    ) -> ApiResult<TaskExecution> {
        let mut execution = self
            .storage
            .executions
            .get_execution(execution_id)
            .await?
            .ok_or(AppError::ExecutionNotFound(execution_id))?;

        if execution.status != ExecutionStatus::InProgress || !execution.hitl_pending {
            return Err(AppError::InvalidTransition(format!(
                "Execution {} is not awaiting approval",
                execution_id
            )));
        }

        execution.hitl_pending = false;
        execution.hitl_resolved_by = resolved_by;
        execution.hitl_note = note;
        self.storage.executions.update_execution(&execution).await?;
        self.storage
            .hitl
            .resolve_for_execution(execution_id, Utc::now())
            .await?;

        if approved {
            let mut current = self.process(execution, true).await?;
            while let Some(next) = current {
                current = self.process(next, false).await?;
            }
        } else {
            let instance = self
                .storage
                .instances
                .get_instance(execution.instance_id)
                .await?
                .ok_or(AppError::InstanceNotFound(execution.instance_id))?;
            let task = self
                .storage
                .templates
                .get_task(execution.task_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Workflow task".to_string()))?;

            execution.status = ExecutionStatus::Skipped;
            execution.completed_at = Some(Utc::now());
            self.storage.executions.update_execution(&execution).await?;

            if instance.status == InstanceStatus::Active {
                let next = self
                    .advance(&instance, &task, &BranchTarget::Continue, Utc::now())
                    .await?;
                if let Some(next) = next {
                    self.run_chain(next).await?;
                }
            }
        }

        let refreshed = self
            .storage
            .executions
            .get_execution(execution_id)
            .await?
            .ok_or(AppError::ExecutionNotFound(execution_id))?;
        Ok(refreshed)
    }

    async fn run_executor(
        &self,
        instance: &WorkflowInstance,
        task: &WorkflowTask,
        entity: &EntityContext,
    ) -> ExecutionOutcome {
        let industry = match self
            .storage
            .templates
            .get_template(instance.template_id)
            .await
        {
            Ok(Some(template)) => template.industry,
            _ => Industry::Generic,
        };

        let Some(task_type) = TaskType::parse(&task.task_type) else {
            return ExecutionOutcome::failure(
                AppError::UnknownTaskType {
                    industry,
                    task_type: task.task_type.clone(),
                }
                .message(),
            );
        };

        let Some(executor) = self.registry.resolve(industry, task_type) else {
            return ExecutionOutcome::failure(
                AppError::UnknownTaskType {
                    industry,
                    task_type: task.task_type.clone(),
                }
                .message(),
            );
        };

        let timeout = Duration::from_secs(self.config.executor_timeout_secs);
        match tokio::time::timeout(timeout, executor.execute(task, instance, entity)).await {
            Ok(outcome) => outcome,
            Err(_) => ExecutionOutcome::failure(
                AppError::ExecutorTimeout {
                    seconds: self.config.executor_timeout_secs,
                }
                .message(),
            ),
        }
    }

    /// Persist an executor outcome and advance the instance.
    async fn apply_outcome(
        &self,
        mut execution: TaskExecution,
        instance: WorkflowInstance,
        task: WorkflowTask,
        entity: EntityContext,
        outcome: ExecutionOutcome,
    ) -> ApiResult<Option<TaskExecution>> {
        // Cancellation may have landed while the executor ran: keep the
        // result for the audit trail but never advance a cancelled instance.
        let instance = self
            .storage
            .instances
            .get_instance(instance.id)
            .await?
            .ok_or(AppError::InstanceNotFound(instance.id))?;
        let advance_allowed = instance.status == InstanceStatus::Active;

        if !outcome.success {
            let error = outcome
                .error
                .unwrap_or_else(|| "Executor failed without detail".to_string());
            let next = self
                .record_failure(execution, &instance, Some(&task), &error)
                .await?;
            return Ok(if advance_allowed { next } else { None });
        }

        let completed_at = Utc::now();
        execution.status = ExecutionStatus::Completed;
        execution.completed_at = Some(completed_at);
        execution.result = Some(outcome.data.clone());
        execution.agent_used = Some(
            task.assigned_agent_type
                .clone()
                .unwrap_or_else(|| "engine".to_string()),
        );
        self.storage.executions.update_execution(&execution).await?;

        tracing::info!(
            instance_id = %instance.id,
            task = %task.name,
            "Task completed"
        );

        if !advance_allowed {
            return Ok(None);
        }

        let target = self.branch_target(&task, &outcome.data, &entity, &instance);
        self.advance(&instance, &task, &target, completed_at).await
    }

    /// Mark an execution FAILED. The instance stays ACTIVE and stalls on
    /// the failed task, except optional tasks, which advance past the
    /// failure.
    async fn record_failure(
        &self,
        mut execution: TaskExecution,
        instance: &WorkflowInstance,
        task: Option<&WorkflowTask>,
        error: &str,
    ) -> ApiResult<Option<TaskExecution>> {
        execution.status = ExecutionStatus::Failed;
        execution.completed_at = Some(Utc::now());
        execution.error_message = Some(error.to_string());
        self.storage.executions.update_execution(&execution).await?;

        tracing::warn!(
            instance_id = %instance.id,
            execution_id = %execution.id,
            "Task failed: {}",
            error
        );

        if let Some(task) = task {
            if task.is_optional && instance.status == InstanceStatus::Active {
                tracing::info!(
                    instance_id = %instance.id,
                    "Optional task failed, continuing"
                );
                return self
                    .advance(instance, task, &BranchTarget::Continue, Utc::now())
                    .await;
            }
        }
        Ok(None)
    }

    /// Evaluate the task's branch condition over the result, entity, and
    /// instance metadata. Malformed conditions fall back to Continue.
    fn branch_target(
        &self,
        task: &WorkflowTask,
        result: &serde_json::Value,
        entity: &EntityContext,
        instance: &WorkflowInstance,
    ) -> BranchTarget {
        let Some(raw) = &task.branch_condition else {
            return BranchTarget::Continue;
        };
        let branch: BranchCondition = match serde_json::from_value(raw.clone()) {
            Ok(branch) => branch,
            Err(e) => {
                tracing::warn!(task_id = %task.id, "Unparseable branch condition: {}", e);
                return BranchTarget::Continue;
            }
        };

        let context = serde_json::json!({
            "result": result,
            "entity": entity.to_json(),
            "metadata": instance.metadata,
        });
        branch.decide(&context).clone()
    }

    /// Move the instance past `from_task` toward `target`: skip jumped-over
    /// executions, stamp the next due time, and claim immediately-due work.
    async fn advance(
        &self,
        instance: &WorkflowInstance,
        from_task: &WorkflowTask,
        target: &BranchTarget,
        anchor: DateTime<Utc>,
    ) -> ApiResult<Option<TaskExecution>> {
        let tasks = self
            .storage
            .templates
            .template_tasks(instance.template_id)
            .await?;
        let Some(from_index) = tasks.iter().position(|t| t.id == from_task.id) else {
            // Template was rewritten under us; finish the instance cleanly.
            self.complete_instance(instance.id).await?;
            return Ok(None);
        };

        let next_index = match target {
            BranchTarget::Continue => from_index + 1,
            BranchTarget::Skip { count } => from_index + 1 + *count as usize,
            BranchTarget::GoTo { task_id } => match tasks.iter().position(|t| t.id == *task_id) {
                Some(i) if i > from_index => i,
                _ => {
                    tracing::warn!(
                        instance_id = %instance.id,
                        "Branch go_to target is not ahead of the current task, continuing"
                    );
                    from_index + 1
                }
            },
        };

        // Jumped-over tasks are recorded as SKIPPED, not deleted
        let executions = self
            .storage
            .executions
            .executions_for_instance(instance.id)
            .await?;
        for skipped_task in tasks.iter().take(next_index.min(tasks.len())).skip(from_index + 1) {
            if let Some(mut execution) = executions
                .iter()
                .find(|e| e.task_id == skipped_task.id && e.status == ExecutionStatus::Pending)
                .cloned()
            {
                execution.status = ExecutionStatus::Skipped;
                execution.completed_at = Some(Utc::now());
                self.storage.executions.update_execution(&execution).await?;
            }
        }

        let Some(next_task) = tasks.get(next_index) else {
            self.complete_instance(instance.id).await?;
            return Ok(None);
        };

        self.storage
            .instances
            .set_current_task(instance.id, Some(next_task.id))
            .await?;

        let Some(activated) = self.scheduler.activate(instance.id, next_task, anchor).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if activated.scheduled_for.is_some_and(|due| due <= now) {
            // Zero-delay chain: claim and keep running in this worker
            return Ok(self
                .storage
                .executions
                .claim_execution(activated.id, now)
                .await?);
        }

        tracing::debug!(
            instance_id = %instance.id,
            next_task = %next_task.name,
            scheduled_for = ?activated.scheduled_for,
            "Next task scheduled"
        );
        Ok(None)
    }

    async fn complete_instance(&self, instance_id: Uuid) -> ApiResult<()> {
        self.storage
            .instances
            .set_current_task(instance_id, None)
            .await?;
        self.storage
            .instances
            .set_instance_status(instance_id, InstanceStatus::Completed, Some(Utc::now()))
            .await?;
        tracing::info!(instance_id = %instance_id, "Workflow instance completed");
        Ok(())
    }

    async fn load_entity(&self, instance: &WorkflowInstance) -> ApiResult<Option<EntityContext>> {
        let Some(binding) = instance.binding() else {
            return Ok(None);
        };
        let entity = match binding {
            Binding::Lead(id) => self
                .storage
                .entities
                .get_lead(id)
                .await?
                .map(EntityContext::for_lead),
            Binding::Deal(id) => self
                .storage
                .entities
                .get_deal(id)
                .await?
                .map(EntityContext::for_deal),
            Binding::Contact(id) => self
                .storage
                .entities
                .get_contact(id)
                .await?
                .map(EntityContext::for_contact),
        };
        Ok(entity)
    }

    /// Sweep for executions stuck IN_PROGRESS past the staleness cutoff
    /// (crashed worker, lost task). HITL-parked executions are exempt; they
    /// are waiting on a human, not on a worker.
    pub async fn recover_stale(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::minutes(self.config.stale_after_minutes);
        let stale = self.storage.executions.stale_in_progress(cutoff).await?;
        let count = stale.len();

        for mut execution in stale {
            execution.status = ExecutionStatus::Failed;
            execution.completed_at = Some(Utc::now());
            execution.error_message = Some(format!(
                "Execution abandoned: in progress for more than {} minutes",
                self.config.stale_after_minutes
            ));
            self.storage.executions.update_execution(&execution).await?;
            tracing::warn!(execution_id = %execution.id, "Recovered stale execution as FAILED");
        }
        Ok(count)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

pub type SharedEngine = Arc<WorkflowEngine>;
