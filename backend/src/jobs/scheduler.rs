// Job Scheduler - central scheduler for the engine's background jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::workflows::WorkflowEngine;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// How often the dispatch poller looks for due executions.
    pub dispatch_poll_seconds: u64,
    /// How often the stale sweep runs.
    pub stale_sweep_interval_minutes: i64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            dispatch_poll_seconds: 15,
            stale_sweep_interval_minutes: 10,
        }
    }
}

impl From<&EngineConfig> for JobConfig {
    fn from(engine: &EngineConfig) -> Self {
        Self {
            dispatch_poll_seconds: engine.dispatch_poll_seconds as u64,
            stale_sweep_interval_minutes: engine.stale_sweep_interval_minutes as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    engine: Arc<WorkflowEngine>,
    config: JobConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>, config: JobConfig) -> JobResult<Self> {
        if config.dispatch_poll_seconds == 0 || config.dispatch_poll_seconds > 59 {
            return Err(JobError::ConfigError(
                "dispatch_poll_seconds must be between 1 and 59".to_string(),
            ));
        }
        // Both intervals are interpolated into cron expressions, so they
        // share the same single-field bounds.
        if !(1..=59).contains(&config.stale_sweep_interval_minutes) {
            return Err(JobError::ConfigError(
                "stale_sweep_interval_minutes must be between 1 and 59".to_string(),
            ));
        }

        let scheduler = TokioScheduler::new().await?;
        Ok(Self {
            scheduler,
            engine,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_dispatch_poller().await?;
        self.schedule_stale_sweep().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_dispatch_poller(&self) -> JobResult<()> {
        let interval = self.config.dispatch_poll_seconds;
        let cron_expr = format!("*/{} * * * * *", interval); // Every N seconds

        let engine = self.engine.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();

                match engine.poll_due().await {
                    Ok(claimed) => {
                        if claimed > 0 {
                            info!("Dispatch poller claimed {} due execution(s)", claimed);
                        }
                        record_run(&logs, "Dispatch Poller", started_at, claimed as i32, None)
                            .await;
                    }
                    Err(e) => {
                        error!("Dispatch poller failed: {}", e);
                        record_run(
                            &logs,
                            "Dispatch Poller",
                            started_at,
                            0,
                            Some(e.to_string()),
                        )
                        .await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled dispatch poller to run every {} seconds", interval);
        Ok(())
    }

    async fn schedule_stale_sweep(&self) -> JobResult<()> {
        let interval = self.config.stale_sweep_interval_minutes;
        let cron_expr = format!("0 */{} * * * *", interval); // Every N minutes

        let engine = self.engine.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();

                match engine.recover_stale().await {
                    Ok(recovered) => {
                        if recovered > 0 {
                            info!("Stale sweep failed {} abandoned execution(s)", recovered);
                        }
                        record_run(&logs, "Stale Sweep", started_at, recovered as i32, None).await;
                    }
                    Err(e) => {
                        error!("Stale sweep failed: {}", e);
                        record_run(&logs, "Stale Sweep", started_at, 0, Some(e.to_string())).await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!(
            "Scheduled stale execution sweep to run every {} minutes",
            interval
        );
        Ok(())
    }

    /// Run a job immediately, outside its schedule.
    pub async fn run_job_now(&self, job_name: &str) -> JobResult<i32> {
        let started_at = Utc::now();
        let result = match job_name {
            "dispatch" => self.engine.poll_due().await,
            "stale_sweep" => self.engine.recover_stale().await,
            other => {
                return Err(JobError::ExecutionError(format!(
                    "Unknown job '{}'",
                    other
                )))
            }
        };

        match result {
            Ok(count) => {
                record_run(&self.execution_logs, job_name, started_at, count as i32, None).await;
                Ok(count as i32)
            }
            Err(e) => {
                record_run(
                    &self.execution_logs,
                    job_name,
                    started_at,
                    0,
                    Some(e.to_string()),
                )
                .await;
                Err(JobError::ExecutionError(e.to_string()))
            }
        }
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }
}

async fn record_run(
    logs: &Arc<RwLock<Vec<JobExecutionLog>>>,
    job_name: &str,
    started_at: DateTime<Utc>,
    items_processed: i32,
    error: Option<String>,
) {
    let completed_at = Utc::now();
    let log = JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: job_name.to_string(),
        started_at,
        completed_at: Some(completed_at),
        status: if error.is_none() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        },
        items_processed,
        errors: error.into_iter().collect(),
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    };

    let mut logs = logs.write().await;
    logs.push(log);
    // Keep only the last 100 runs
    if logs.len() > 100 {
        logs.remove(0);
    }
}
