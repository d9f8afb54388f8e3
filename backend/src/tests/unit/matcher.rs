// Trigger matcher: event dedupe, config matching, fan-out conflict handling

use serde_json::json;
use uuid::Uuid;

use cadence_shared::{DelayUnit, Industry, InstanceStatus};

use crate::tests::fixtures::*;
use crate::workflows::{TriggerEvent, TriggerType};

/// Templates only fire when their trigger_config names the event type.
async fn set_trigger(
    h: &TestHarness,
    template: &cadence_shared::WorkflowTemplate,
    config: serde_json::Value,
) {
    let mut updated = template.clone();
    updated.trigger_config = Some(config);
    h.storage
        .templates
        .update_template(&updated, None)
        .await
        .expect("update trigger config");
}

#[tokio::test]
async fn test_event_type_filters_templates() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        crate::config::EngineConfig::default(),
    );
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (fires, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("A")],
    )
    .await;
    set_trigger(&h, &fires, json!({ "event_type": "LEAD_CREATED" })).await;

    let (silent, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("B")],
    )
    .await;
    set_trigger(&h, &silent, json!({ "event_type": "DEAL_STAGE_CHANGED" })).await;

    // A third template with no trigger_config never auto-starts
    create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("C")],
    )
    .await;

    let event = TriggerEvent::lead_created(tenant, lead.id);
    let started = h.matcher.process_event(event).await.unwrap();
    assert_eq!(started.len(), 1);

    let instance = h.instances.get(started[0]).await.unwrap();
    assert_eq!(instance.template_id, fires.id);
    assert_eq!(instance.lead_id, Some(lead.id));
}

#[tokio::test]
async fn test_duplicate_event_id_is_ignored() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        crate::config::EngineConfig::default(),
    );
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("A")],
    )
    .await;
    set_trigger(&h, &template, json!({ "event_type": "LEAD_CREATED" })).await;

    let event = TriggerEvent::lead_created(tenant, lead.id);
    let replay = event.clone();

    let first = h.matcher.process_event(event).await.unwrap();
    assert_eq!(first.len(), 1);

    // Same event_id redelivered: the ledger swallows it
    let second = h.matcher.process_event(replay).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_keyword_match_is_case_insensitive() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        crate::config::EngineConfig::default(),
    );
    let tenant = Uuid::new_v4();
    let contact = seeded_contact(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Restaurant,
        vec![custom_task("Reply")],
    )
    .await;
    set_trigger(
        &h,
        &template,
        json!({
            "event_type": "MESSAGE_RECEIVED",
            "channel_types": ["SMS"],
            "keywords": ["catering"]
        }),
    )
    .await;

    let hit = TriggerEvent::message_received(
        tenant,
        contact.id,
        "SMS",
        "Do you handle CATERING for 50 people?",
    );
    assert_eq!(h.matcher.process_event(hit).await.unwrap().len(), 1);

    // Wrong channel
    let miss = TriggerEvent::message_received(tenant, contact.id, "EMAIL", "catering please");
    assert!(h.matcher.process_event(miss).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_change_must_match_configured_target() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        crate::config::EngineConfig::default(),
    );
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("A")],
    )
    .await;
    set_trigger(
        &h,
        &template,
        json!({ "event_type": "LEAD_STATUS_CHANGED", "to_status": "QUALIFIED" }),
    )
    .await;

    let miss = TriggerEvent::lead_status_changed(tenant, lead.id, "NEW", "CONTACTED");
    assert!(h.matcher.process_event(miss).await.unwrap().is_empty());

    let hit = TriggerEvent::lead_status_changed(tenant, lead.id, "CONTACTED", "QUALIFIED");
    assert_eq!(h.matcher.process_event(hit).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_existing_active_instance_is_tolerated_during_fanout() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        crate::config::EngineConfig::default(),
    );
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    // The delayed second task keeps the occupying instance ACTIVE
    let (blocked, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![
            custom_task("A"),
            custom_task("Hold").delay(1, DelayUnit::Hours),
        ],
    )
    .await;
    set_trigger(&h, &blocked, json!({ "event_type": "LEAD_CREATED" })).await;

    let (open, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("B")],
    )
    .await;
    set_trigger(&h, &open, json!({ "event_type": "LEAD_CREATED" })).await;

    // Manually occupy the first template for this lead
    let existing = h
        .instances
        .start(start_for_lead(blocked.id, tenant, lead.id))
        .await
        .unwrap();
    assert_eq!(existing.status, InstanceStatus::Active);

    // Fan-out still starts the unblocked template
    let started = h
        .matcher
        .process_event(TriggerEvent::lead_created(tenant, lead.id))
        .await
        .unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(
        h.instances.get(started[0]).await.unwrap().template_id,
        open.id
    );
}

#[tokio::test]
async fn test_started_instance_carries_event_metadata() {
    let h = harness_with(
        scripted_registry(ScriptedExecutor::always_succeed()),
        crate::config::EngineConfig::default(),
    );
    let tenant = Uuid::new_v4();
    let lead = seeded_lead(&h.mem, tenant);

    let (template, _) = create_template(
        &h.storage,
        tenant,
        Industry::Generic,
        vec![custom_task("A")],
    )
    .await;
    set_trigger(&h, &template, json!({ "event_type": "LEAD_STATUS_CHANGED" })).await;

    let event = TriggerEvent::lead_status_changed(tenant, lead.id, "NEW", "QUALIFIED");
    let event_id = event.event_id;

    let started = h.matcher.process_event(event).await.unwrap();
    let instance = h.instances.get(started[0]).await.unwrap();

    assert_eq!(instance.trigger_type, TriggerType::LeadStatusChanged.as_str());
    let metadata = instance.metadata;
    assert_eq!(metadata["event_id"], json!(event_id.to_string()));
    assert_eq!(metadata["variables"]["to_status"], json!("QUALIFIED"));
}
