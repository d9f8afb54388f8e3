// Trigger Matcher - fans CRM events out to matching workflow templates

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::storage::Storage;
use crate::workflows::instances::{InstanceManager, StartRequest};
use crate::workflows::triggers::{TriggerConfig, TriggerEvent};

/// Matches incoming trigger events against active templates and starts
/// instances for every hit. Event processing never fails the publisher:
/// per-template errors are logged and the rest of the fan-out continues.
pub struct TriggerMatcher {
    storage: Storage,
    instances: Arc<InstanceManager>,
}

impl TriggerMatcher {
    pub fn new(storage: Storage, instances: Arc<InstanceManager>) -> Self {
        Self { storage, instances }
    }

    /// Process one event. Returns the ids of instances started, which is
    /// empty for duplicate events.
    pub async fn process_event(&self, event: TriggerEvent) -> ApiResult<Vec<Uuid>> {
        // Dedupe first: at-least-once delivery means retries of the same
        // event_id must be a no-op.
        if !self.storage.events.record_event(event.event_id).await? {
            tracing::debug!(event_id = %event.event_id, "Duplicate event ignored");
            return Ok(Vec::new());
        }

        let templates = self
            .storage
            .templates
            .active_templates(event.tenant_id)
            .await?;

        let mut started = Vec::new();
        for template in templates {
            let Some(raw) = &template.trigger_config else {
                continue;
            };
            let config: TriggerConfig = match serde_json::from_value(raw.clone()) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(
                        template_id = %template.id,
                        "Unparseable trigger config, skipping: {}",
                        e
                    );
                    continue;
                }
            };
            if !config.matches(&event) {
                continue;
            }

            let request = StartRequest {
                template_id: template.id,
                tenant_id: event.tenant_id,
                lead_id: event.lead_id,
                deal_id: event.deal_id,
                contact_id: event.contact_id,
                trigger_type: Some(event.trigger_type.as_str().to_string()),
                metadata: Some(serde_json::json!({
                    "event_id": event.event_id,
                    "variables": event.variables,
                    "event_metadata": event.metadata,
                })),
            };

            match self.instances.start(request).await {
                Ok(instance) => {
                    tracing::info!(
                        template_id = %template.id,
                        instance_id = %instance.id,
                        trigger = %event.trigger_type.as_str(),
                        "Trigger started workflow instance"
                    );
                    started.push(instance.id);
                }
                // Expected under racing or repeated triggers; not an error
                // worth failing the fan-out for.
                Err(AppError::DuplicateActiveInstance) => {
                    tracing::debug!(
                        template_id = %template.id,
                        "Trigger matched but an active instance already exists"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        template_id = %template.id,
                        "Trigger matched but instance start failed: {}",
                        e
                    );
                }
            }
        }

        Ok(started)
    }
}
