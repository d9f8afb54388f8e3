// Task Scheduler - computes and activates per-task delays

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cadence_shared::{ExecutionStatus, TaskExecution, WorkflowTask};

use crate::storage::{Storage, StorageResult};

/// Decides when a task becomes due and stamps `scheduled_for` on its
/// PENDING execution. Delays are anchored to the prior task's completion,
/// never to instance start, so upstream slowness shifts the whole tail.
pub struct TaskScheduler {
    storage: Storage,
}

impl TaskScheduler {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Due time for `task` given when its predecessor finished.
    pub fn next_scheduled_for(anchor: DateTime<Utc>, task: &WorkflowTask) -> DateTime<Utc> {
        anchor + task.delay_unit.to_duration(task.delay_value)
    }

    /// Activate the execution for `task` within an instance: set its
    /// `scheduled_for` from the anchor and return the updated row.
    ///
    /// Returns `None` when the execution is not PENDING anymore (e.g. it
    /// was skipped by a branch or a cancellation won the race).
    pub async fn activate(
        &self,
        instance_id: Uuid,
        task: &WorkflowTask,
        anchor: DateTime<Utc>,
    ) -> StorageResult<Option<TaskExecution>> {
        let executions = self.storage.executions.executions_for_instance(instance_id).await?;
        let Some(mut execution) = executions.into_iter().find(|e| e.task_id == task.id) else {
            return Ok(None);
        };
        if execution.status != ExecutionStatus::Pending {
            return Ok(None);
        }

        execution.scheduled_for = Some(Self::next_scheduled_for(anchor, task));
        self.storage.executions.update_execution(&execution).await?;
        Ok(Some(execution))
    }

    /// PENDING executions whose due time has arrived.
    pub async fn due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<TaskExecution>> {
        self.storage.executions.due_executions(now, limit).await
    }
}
