// Workflow Triggers - CRM events that can start workflow instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::workflows::conditions::ConditionGroup;

/// Types of CRM events that can trigger workflows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    // Lead triggers
    LeadCreated,
    LeadStatusChanged,

    // Deal triggers
    DealStageChanged,

    // Communication triggers
    MessageReceived,

    // Calendar triggers
    AppointmentScheduled,

    // Explicit starts
    Manual,
    ApiCall,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadCreated => "LEAD_CREATED",
            Self::LeadStatusChanged => "LEAD_STATUS_CHANGED",
            Self::DealStageChanged => "DEAL_STAGE_CHANGED",
            Self::MessageReceived => "MESSAGE_RECEIVED",
            Self::AppointmentScheduled => "APPOINTMENT_SCHEDULED",
            Self::Manual => "MANUAL",
            Self::ApiCall => "API_CALL",
        }
    }
}

/// A trigger event delivered to the matcher.
///
/// Delivery is at-least-once; `event_id` is the dedupe key, so publishers
/// must keep it stable across retries of the same logical event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub trigger_type: TriggerType,
    pub lead_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    /// Flat event attributes the trigger filters match against, e.g.
    /// `channel_type`, `to_status`, `message_body`.
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Carried into the instance's metadata verbatim.
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(tenant_id: Uuid, trigger_type: TriggerType) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tenant_id,
            trigger_type,
            lead_id: None,
            deal_id: None,
            contact_id: None,
            variables: HashMap::new(),
            metadata: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn lead_created(tenant_id: Uuid, lead_id: Uuid) -> Self {
        let mut event = Self::new(tenant_id, TriggerType::LeadCreated);
        event.lead_id = Some(lead_id);
        event
    }

    pub fn lead_status_changed(
        tenant_id: Uuid,
        lead_id: Uuid,
        from_status: &str,
        to_status: &str,
    ) -> Self {
        let mut event = Self::new(tenant_id, TriggerType::LeadStatusChanged);
        event.lead_id = Some(lead_id);
        event
            .variables
            .insert("from_status".to_string(), from_status.to_string());
        event
            .variables
            .insert("to_status".to_string(), to_status.to_string());
        event
    }

    pub fn deal_stage_changed(tenant_id: Uuid, deal_id: Uuid, to_stage_id: &str) -> Self {
        let mut event = Self::new(tenant_id, TriggerType::DealStageChanged);
        event.deal_id = Some(deal_id);
        event
            .variables
            .insert("to_stage_id".to_string(), to_stage_id.to_string());
        event
    }

    pub fn message_received(
        tenant_id: Uuid,
        contact_id: Uuid,
        channel_type: &str,
        body: &str,
    ) -> Self {
        let mut event = Self::new(tenant_id, TriggerType::MessageReceived);
        event.contact_id = Some(contact_id);
        event
            .variables
            .insert("channel_type".to_string(), channel_type.to_string());
        event
            .variables
            .insert("message_body".to_string(), body.to_string());
        event
    }

    pub fn appointment_scheduled(tenant_id: Uuid, contact_id: Uuid) -> Self {
        let mut event = Self::new(tenant_id, TriggerType::AppointmentScheduled);
        event.contact_id = Some(contact_id);
        event
    }

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

/// Trigger rule stored on a template as its `trigger_config`.
///
/// All present filters must pass for the template to fire; absent filters
/// match everything.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerConfig {
    pub event_type: Option<TriggerType>,
    /// MESSAGE_RECEIVED only: accepted channels (e.g. "sms", "email").
    #[serde(default)]
    pub channel_types: Vec<String>,
    /// MESSAGE_RECEIVED only: at least one keyword must appear in the body.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// LEAD_STATUS_CHANGED only: required destination status.
    pub to_status: Option<String>,
    /// DEAL_STAGE_CHANGED only: required destination stage.
    pub to_stage_id: Option<String>,
    /// Extra predicate over the event's variables.
    pub conditions: Option<ConditionGroup>,
}

impl TriggerConfig {
    /// Decide whether this rule fires for the given event.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match self.event_type {
            Some(expected) if expected != event.trigger_type => return false,
            None => return false,
            _ => {}
        }

        if !self.channel_types.is_empty() {
            let channel = event.variable("channel_type").unwrap_or_default();
            if !self
                .channel_types
                .iter()
                .any(|c| c.eq_ignore_ascii_case(channel))
            {
                return false;
            }
        }

        if !self.keywords.is_empty() {
            let body = event
                .variable("message_body")
                .unwrap_or_default()
                .to_lowercase();
            if !self
                .keywords
                .iter()
                .any(|k| body.contains(&k.to_lowercase()))
            {
                return false;
            }
        }

        if let Some(to_status) = &self.to_status {
            if event.variable("to_status") != Some(to_status.as_str()) {
                return false;
            }
        }

        if let Some(to_stage_id) = &self.to_stage_id {
            if event.variable("to_stage_id") != Some(to_stage_id.as_str()) {
                return false;
            }
        }

        if let Some(group) = &self.conditions {
            let vars: serde_json::Value = serde_json::json!(event.variables);
            if !group.evaluate(&vars) {
                return false;
            }
        }

        true
    }
}
