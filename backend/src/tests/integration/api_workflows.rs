// HTTP surface: routing, status codes, and response shapes end to end
// against the in-memory storage.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use cadence_shared::{DelayUnit, Industry, InstanceStatus};

use crate::config::{Config, EngineConfig};
use crate::tests::fixtures::*;
use crate::AppState;

fn test_app() -> (TestHarness, Router) {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        EngineConfig::default(),
    );
    let state = Arc::new(AppState {
        config: Config {
            database_url: String::new(),
            server_addr: String::new(),
            engine: EngineConfig::default(),
        },
        db_pool: None,
        storage: h.storage.clone(),
        engine: h.engine.clone(),
        instances: h.instances.clone(),
        matcher: h.matcher.clone(),
    });
    let app = Router::new()
        .route("/", get(crate::handlers::root))
        .merge(crate::handlers::health_routes())
        .merge(crate::api_router())
        .with_state(state);
    (h, app)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => Request::builder().method(method).uri(uri).body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_in_memory_database() {
    let (_h, app) = test_app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["database"], json!("in-memory"));
}

#[tokio::test]
async fn test_template_crud_roundtrip() {
    let (_h, app) = test_app();
    let tenant = Uuid::new_v4();

    let (status, created) = send(
        &app,
        "POST",
        "/api/v1/workflows/templates",
        Some(json!({
            "tenant_id": tenant,
            "name": "Lead follow-up",
            "industry": "DENTAL",
            "tasks": [
                { "name": "Send welcome", "task_type": "OUTREACH_EMAIL" },
                // Unknown type is kept as a draft-friendly CUSTOM task
                { "name": "Weird step", "task_type": "NOT_A_REAL_TYPE" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    // DENTAL is an alias for the medical vertical
    assert_eq!(created["industry"], json!("MEDICAL"));
    // Known types come back as-is, unknown ones fall back to CUSTOM
    assert_eq!(created["tasks"][0]["task_type"], json!("OUTREACH_EMAIL"));
    assert_eq!(created["tasks"][1]["task_type"], json!("CUSTOM"));

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = send(
        &app,
        "GET",
        &format!("/api/v1/workflows/templates/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], json!("Lead follow-up"));
    assert_eq!(fetched["tasks"].as_array().unwrap().len(), 2);

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/v1/workflows/templates/{}", id),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_active"], json!(false));

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/v1/workflows/templates/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, error) = send(
        &app,
        "GET",
        &format!("/api/v1/workflows/templates/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], json!("TEMPLATE_NOT_FOUND"));
}

#[tokio::test]
async fn test_template_validation_rejects_bad_input() {
    let (_h, app) = test_app();

    let (status, error) = send(
        &app,
        "POST",
        "/api/v1/workflows/templates",
        Some(json!({
            "tenant_id": Uuid::new_v4(),
            "name": "",
            "tasks": [
                { "name": "Step", "task_type": "CUSTOM", "delay_value": -5 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_template_delete_blocked_by_active_instance() {
    let (h, app) = test_app();
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    // The delayed second task keeps the instance active
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Run"),
            custom_task("Hold").delay(1, DelayUnit::Hours),
        ],
    )
    .await;
    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    let uri = format!("/api/v1/workflows/templates/{}", template.id);
    let (status, error) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], json!("CONFLICT"));

    // Once the running instance is cancelled the delete goes through
    h.instances.cancel(instance.id).await.unwrap();
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_instance_lifecycle_and_duplicate_start() {
    let (h, app) = test_app();
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    // The delayed second task keeps the instance active for the whole test
    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Run"),
            custom_task("Hold").delay(1, DelayUnit::Hours),
        ],
    )
    .await;

    let start_body = json!({
        "template_id": template.id,
        "tenant_id": tenant,
        "lead_id": lead.id
    });
    let (status, instance) = send(
        &app,
        "POST",
        "/api/v1/workflows/instances",
        Some(start_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(instance["status"], json!("ACTIVE"));
    assert_eq!(instance["trigger_type"], json!("MANUAL"));
    let id = instance["id"].as_str().unwrap().to_string();

    // Same template and entity while one is running: rejected
    let (status, error) = send(
        &app,
        "POST",
        "/api/v1/workflows/instances",
        Some(start_body),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], json!("DUPLICATE_ACTIVE_INSTANCE"));

    let (status, detail) = send(
        &app,
        "GET",
        &format!("/api/v1/workflows/instances/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["executions"].as_array().unwrap().len(), 2);

    let (status, paused) = send(
        &app,
        "POST",
        &format!("/api/v1/workflows/instances/{}/pause", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], json!("PAUSED"));

    // Pausing twice is a state error
    let (status, error) = send(
        &app,
        "POST",
        &format!("/api/v1/workflows/instances/{}/pause", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], json!("INVALID_TRANSITION"));

    let (status, resumed) = send(
        &app,
        "POST",
        &format!("/api/v1/workflows/instances/{}/resume", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["status"], json!("ACTIVE"));

    let (status, cancelled) = send(
        &app,
        "POST",
        &format!("/api/v1/workflows/instances/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], json!("CANCELLED"));

    // The binding is free again once the old instance is terminal
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/workflows/instances",
        Some(json!({
            "template_id": template.id,
            "tenant_id": tenant,
            "lead_id": lead.id
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_stats_endpoint_counts_tenant_activity() {
    let (h, app) = test_app();
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Run"),
            custom_task("Hold").delay(1, DelayUnit::Hours),
        ],
    )
    .await;
    h.instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();

    let (status, stats) = send(
        &app,
        "GET",
        &format!("/api/v1/workflows/instances/stats?tenant_id={}", tenant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_templates"], json!(1));
    assert_eq!(stats["active_instances"], json!(1));
    assert_eq!(stats["completed_instances"], json!(0));
    assert_eq!(stats["pending_approvals"], json!(0));
}

#[tokio::test]
async fn test_event_publish_is_accepted_and_processed() {
    let (h, app) = test_app();
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("Run"),
            custom_task("Hold").delay(1, DelayUnit::Hours),
        ],
    )
    .await;
    let mut with_trigger = template.clone();
    with_trigger.trigger_config = Some(json!({ "event_type": "LEAD_CREATED" }));
    h.storage
        .templates
        .update_template(&with_trigger, None)
        .await
        .unwrap();

    let event_id = Uuid::new_v4();
    let (status, accepted) = send(
        &app,
        "POST",
        "/api/v1/workflows/events",
        Some(json!({
            "event_id": event_id,
            "tenant_id": tenant,
            "trigger_type": "LEAD_CREATED",
            "lead_id": lead.id,
            "timestamp": chrono::Utc::now()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["event_id"], json!(event_id.to_string()));
    assert_eq!(accepted["accepted"], json!(true));

    // Processing is async behind the 202; wait for the instance to appear
    for _ in 0..200 {
        let instances = h
            .instances
            .list(tenant, Some(InstanceStatus::Active))
            .await
            .unwrap();
        if !instances.is_empty() {
            assert_eq!(instances[0].template_id, template.id);
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("event never started an instance");
}

#[tokio::test]
async fn test_hitl_pending_and_resolve_over_http() {
    let (h, app) = test_app();
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Approve quote").hitl()],
    )
    .await;
    let instance = h
        .instances
        .start(start_for_lead(template.id, tenant, lead.id))
        .await
        .unwrap();
    h.wait_for_execution(instance.id, 0, |e| e.hitl_pending).await;

    let (status, pending) = send(
        &app,
        "GET",
        &format!("/api/v1/workflows/hitl/pending?tenant_id={}", tenant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["task_name"], json!("Approve quote"));
    let execution_id = pending[0]["execution_id"].as_str().unwrap();

    let (status, resolved) = send(
        &app,
        "POST",
        &format!("/api/v1/workflows/hitl/executions/{}/resolve", execution_id),
        Some(json!({ "approved": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], json!("COMPLETED"));

    h.wait_for_instance_status(instance.id, InstanceStatus::Completed)
        .await;
}

#[tokio::test]
async fn test_dispatch_endpoint_rejects_non_pending_execution() {
    let (h, app) = test_app();
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("Only")],
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
    let (status, error) = send(
        &app,
        "POST",
        &format!(
            "/api/v1/workflows/instances/executions/{}/dispatch",
            executions[0].id
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], json!("INVALID_TRANSITION"));
}
