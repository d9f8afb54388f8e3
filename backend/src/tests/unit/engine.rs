// Engine behavior: progression, delays, branching, failure, HITL, recovery

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use cadence_shared::{DelayUnit, ExecutionStatus, Industry, InstanceStatus, TaskType};

use crate::config::EngineConfig;
use crate::error::AppError;
use crate::tests::fixtures::*;
use crate::workflows::{ExecutionOutcome, ExecutorRegistry};

#[tokio::test]
async fn test_zero_delay_chain_completes_instance() {
    let executor = ScriptedExecutor::always_succeed();
    let h = harness_with(scripted_registry(executor.clone()), EngineConfig::default());

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Step one"), custom_task("Step two")],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .expect("start");

    h.wait_for_instance_status(instance.id, InstanceStatus::Completed)
        .await;

    let done = h.instances.get(instance.id).await.unwrap();
    assert_eq!(done.current_task_id, None);
    assert!(done.completed_at.is_some());

    let executions = h.instances.executions(instance.id).await.unwrap();
    assert_eq!(executions.len(), 2);
    assert!(executions
        .iter()
        .all(|e| e.status == ExecutionStatus::Completed));
    assert_eq!(executor.calls(), vec!["Step one", "Step two"]);
}

#[tokio::test]
async fn test_delayed_task_waits_for_its_due_time() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        EngineConfig::default(),
    );

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, tasks) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Now"),
            custom_task("Later").delay(2, DelayUnit::Hours),
        ],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.status == ExecutionStatus::Completed)
        .await;

    let current = h.instances.get(instance.id).await.unwrap();
    assert_eq!(current.status, InstanceStatus::Active);
    assert_eq!(current.current_task_id, Some(tasks[1].id));

    let executions = h.instances.executions(instance.id).await.unwrap();
    let first = &executions[0];
    let second = &executions[1];
    assert_eq!(second.status, ExecutionStatus::Pending);

    // Anchored to the predecessor's completion, not instance start
    let anchor = first.completed_at.expect("first completed");
    assert_eq!(
        second.scheduled_for,
        Some(anchor + chrono::Duration::hours(2))
    );

    // Nothing due yet, so a poll claims nothing
    assert_eq!(h.engine.poll_due().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_starts_yield_one_active_instance() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        EngineConfig::default(),
    );

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        // The delayed second task keeps the winner ACTIVE while rivals race
        vec![
            custom_task("A"),
            custom_task("Hold").delay(1, DelayUnit::Hours),
        ],
    )
    .await;

    let attempts = (0..5).map(|_| {
        let instances = h.instances.clone();
        let request = start_for_lead(template.id, tenant, lead.id);
        async move { instances.start(request).await }
    });
    let results = futures::future::join_all(attempts).await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::DuplicateActiveInstance)))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 4);
}

#[tokio::test]
async fn test_start_rejects_bad_templates_and_entities() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    // Unknown template
    let err = h
        .instances
        .start(start_for_lead(Uuid::new_v4(), tenant, lead.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TemplateNotFound(_)));

    // Template without tasks
    let (empty, _) = create_template(&h.storage, tenant, Industry::Generic, vec![]).await;
    let err = h
        .instances
        .start(start_for_lead(empty.id, tenant, lead.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TemplateHasNoTasks(_)));

    // Entity from another tenant is invisible
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("A")],
    )
    .await;
    let foreign_lead = seeded_lead(&h.mem, Uuid::new_v4());
    let err = h
        .instances
        .start(start_for_lead(template.id, tenant, foreign_lead.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EntityNotFound(_)));
}

#[tokio::test]
async fn test_failure_stalls_instance_without_advancing() {
    let executor = ScriptedExecutor::with_outcomes(vec![ExecutionOutcome::failure("boom")]);
    let h = harness_with(scripted_registry(executor), EngineConfig::default());

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, tasks) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Fails"), custom_task("Never runs")],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.status == ExecutionStatus::Failed)
        .await;

    let executions = h.instances.executions(instance.id).await.unwrap();
    assert_eq!(executions[0].error_message.as_deref(), Some("boom"));
    // Fail-stop: the successor was never scheduled
    assert_eq!(executions[1].status, ExecutionStatus::Pending);
    assert_eq!(executions[1].scheduled_for, None);

    let stalled = h.instances.get(instance.id).await.unwrap();
    assert_eq!(stalled.status, InstanceStatus::Active);
    assert_eq!(stalled.current_task_id, Some(tasks[0].id));
}

#[tokio::test]
async fn test_optional_task_failure_advances() {
    let executor = ScriptedExecutor::with_outcomes(vec![ExecutionOutcome::failure("boom")]);
    let h = harness_with(scripted_registry(executor), EngineConfig::default());

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Best effort").optional(),
            custom_task("Still runs"),
        ],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_instance_status(instance.id, InstanceStatus::Completed)
        .await;

    let executions = h.instances.executions(instance.id).await.unwrap();
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert_eq!(executions[1].status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_branch_skips_jumped_over_tasks() {
    let executor = ScriptedExecutor::with_outcomes(vec![ExecutionOutcome::success(
        json!({ "qualified": false }),
    )]);
    let h = harness_with(scripted_registry(executor.clone()), EngineConfig::default());

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Qualify").branch(json!({
                "field": "result.qualified",
                "operator": "equals",
                "value": false,
                "on_match": { "action": "skip", "count": 1 }
            })),
            custom_task("Hot lead path"),
            custom_task("Wrap up"),
        ],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_instance_status(instance.id, InstanceStatus::Completed)
        .await;

    let executions = h.instances.executions(instance.id).await.unwrap();
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(executions[1].status, ExecutionStatus::Skipped);
    assert_eq!(executions[2].status, ExecutionStatus::Completed);
    assert_eq!(executor.calls(), vec!["Qualify", "Wrap up"]);
}

#[tokio::test]
async fn test_cancel_skips_pending_and_is_terminal() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        EngineConfig::default(),
    );

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Runs"),
            custom_task("Parked").delay(1, DelayUnit::Days),
        ],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.status == ExecutionStatus::Completed)
        .await;

    let cancelled = h.instances.cancel(instance.id).await.unwrap();
    assert_eq!(cancelled.status, InstanceStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    let executions = h.instances.executions(instance.id).await.unwrap();
    assert_eq!(executions[1].status, ExecutionStatus::Skipped);

    // Terminal: no transition out of CANCELLED
    assert!(matches!(
        h.instances.resume(instance.id).await,
        Err(AppError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_paused_instance_reverts_claim_to_pending() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        EngineConfig::default(),
    );

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Runs"),
            custom_task("Paused before this").delay(1, DelayUnit::Hours),
        ],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.status == ExecutionStatus::Completed)
        .await;

    h.instances.pause(instance.id).await.unwrap();

    // Pretend the poller claimed the delayed execution anyway; the run
    // notices the pause and puts the claim back
    let executions = h.instances.executions(instance.id).await.unwrap();
    let claimed = h
        .storage
        .executions
        .claim_execution(executions[1].id, Utc::now())
        .await
        .unwrap();
    assert!(claimed.is_some());

    h.engine.execute_now(executions[1].id).await.unwrap();

    let after = h.instances.executions(instance.id).await.unwrap();
    assert_eq!(after[1].status, ExecutionStatus::Pending);
    assert_eq!(after[1].started_at, None);
    assert_eq!(
        h.instances.get(instance.id).await.unwrap().status,
        InstanceStatus::Paused
    );
}

#[tokio::test]
async fn test_hitl_approve_runs_executor_and_advances() {
    let executor = ScriptedExecutor::always_succeed();
    let h = harness_with(scripted_registry(executor.clone()), EngineConfig::default());

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Needs approval").hitl(), custom_task("After")],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.hitl_pending).await;

    // Gate raised before the executor ran
    assert!(executor.calls().is_empty());
    let pending = h.storage.hitl.pending_notifications(tenant).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task_name, "Needs approval");

    let executions = h.instances.executions(instance.id).await.unwrap();
    let reviewer = Uuid::new_v4();
    let resolved = h
        .engine
        .resolve_hitl(executions[0].id, true, Some(reviewer), None)
        .await
        .unwrap();
    assert_eq!(resolved.status, ExecutionStatus::Completed);
    assert_eq!(resolved.hitl_resolved_by, Some(reviewer));

    let done = h.instances.get(instance.id).await.unwrap();
    assert_eq!(done.status, InstanceStatus::Completed);
    assert_eq!(executor.calls(), vec!["Needs approval", "After"]);
    assert!(h
        .storage
        .hitl
        .pending_notifications(tenant)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_hitl_reject_skips_task_and_advances() {
    let executor = ScriptedExecutor::always_succeed();
    let h = harness_with(scripted_registry(executor.clone()), EngineConfig::default());

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Needs approval").hitl(), custom_task("After")],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.hitl_pending).await;

    let executions = h.instances.executions(instance.id).await.unwrap();
    let resolved = h
        .engine
        .resolve_hitl(executions[0].id, false, None, Some("Not a fit".to_string()))
        .await
        .unwrap();
    assert_eq!(resolved.status, ExecutionStatus::Skipped);
    assert_eq!(resolved.hitl_note.as_deref(), Some("Not a fit"));

    let done = h.instances.get(instance.id).await.unwrap();
    assert_eq!(done.status, InstanceStatus::Completed);
    // The rejected task's executor never ran
    assert_eq!(executor.calls(), vec!["After"]);

    // Resolving twice is a state error
    assert!(matches!(
        h.engine
            .resolve_hitl(executions[0].id, true, None, None)
            .await,
        Err(AppError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_executor_timeout_fails_execution() {
    let mut registry = ExecutorRegistry::new();
    registry.register(
        Industry::Generic,
        &[TaskType::Custom],
        Arc::new(StallingExecutor),
    );
    let config = EngineConfig {
        executor_timeout_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(registry, config);

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Hangs")],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.status == ExecutionStatus::Failed)
        .await;

    let executions = h.instances.executions(instance.id).await.unwrap();
    assert!(executions[0]
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("did not complete"));
}

#[tokio::test]
async fn test_unknown_task_type_fails_execution() {
    let h = harness(); // default registry
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Restaurant,
        // An industry mismatch with no generic fallback
        vec![custom_task("Wrong industry").task_type("MLS_SEARCH")],
    )
    .await;

    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.status == ExecutionStatus::Failed)
        .await;

    let executions = h.instances.executions(instance.id).await.unwrap();
    assert!(executions[0]
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("No executor registered"));
}

#[tokio::test]
async fn test_stale_sweep_fails_abandoned_but_not_hitl() {
    let config = EngineConfig {
        stale_after_minutes: 30,
        ..EngineConfig::default()
    };
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        config,
    );

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Abandoned"),
            custom_task("Waiting on a human").delay(1, DelayUnit::Days),
        ],
    )
    .await;
    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    h.wait_for_execution(instance.id, 0, |e| e.status.is_terminal())
        .await;

    // Backdate one execution as a crashed worker, park another at HITL
    let executions = h.instances.executions(instance.id).await.unwrap();
    let mut abandoned = executions[0].clone();
    abandoned.status = ExecutionStatus::InProgress;
    abandoned.started_at = Some(Utc::now() - chrono::Duration::hours(2));
    h.storage
        .executions
        .update_execution(&abandoned)
        .await
        .unwrap();

    let mut parked = executions[1].clone();
    parked.status = ExecutionStatus::InProgress;
    parked.started_at = Some(Utc::now() - chrono::Duration::hours(2));
    parked.hitl_pending = true;
    h.storage.executions.update_execution(&parked).await.unwrap();

    let recovered = h.engine.recover_stale().await.unwrap();
    assert_eq!(recovered, 1);

    let after = h.instances.executions(instance.id).await.unwrap();
    assert_eq!(after[0].status, ExecutionStatus::Failed);
    assert!(after[0]
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("abandoned"));
    assert_eq!(after[1].status, ExecutionStatus::InProgress);
    assert!(after[1].hitl_pending);
}

#[tokio::test]
async fn test_stats_count_per_tenant() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        EngineConfig::default(),
    );

    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);
    let (done_template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Only")],
    )
    .await;
    let (open_template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Gate").hitl()],
    )
    .await;

    let finished = h
        .instances
        .start(start_for_lead(done_template.id, tenant, lead.id))
        .await
        .unwrap();
    h.wait_for_instance_status(finished.id, InstanceStatus::Completed)
        .await;

    let gated = h
        .instances
        .start(start_for_lead(open_template.id, tenant, lead.id))
        .await
        .unwrap();
    h.wait_for_execution(gated.id, 0, |e| e.hitl_pending).await;

    let stats = h.instances.stats(tenant).await.unwrap();
    assert_eq!(stats.total_templates, 2);
    assert_eq!(stats.active_instances, 1);
    assert_eq!(stats.completed_instances, 1);
    assert_eq!(stats.pending_approvals, 1);

    // Another tenant sees nothing
    let other = h.instances.stats(Uuid::new_v4()).await.unwrap();
    assert_eq!(other.total_templates, 0);
    assert_eq!(other.active_instances, 0);
}
