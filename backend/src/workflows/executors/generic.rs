// Generic Executor - industry-agnostic outreach, CRM, and webhook tasks

use async_trait::async_trait;
use serde_json::json;

use cadence_shared::{TaskType, WorkflowInstance, WorkflowTask};

use super::{configured_actions, personalize, ActionExecutor, EntityContext, ExecutionOutcome};

pub struct GenericExecutor {
    http: reqwest::Client,
}

impl GenericExecutor {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn default_actions(task_type: &str) -> Vec<String> {
        let actions: &[&str] = match TaskType::parse(task_type) {
            Some(TaskType::OutreachCall) => &["voice_call"],
            Some(TaskType::OutreachSms) => &["sms"],
            Some(TaskType::OutreachEmail) => &["email"],
            Some(TaskType::CrmTask) => &["task"],
            Some(TaskType::CalendarEvent) => &["calendar"],
            Some(TaskType::DocumentGeneration) => &["document"],
            Some(TaskType::Custom) => &["custom"],
            _ => &[],
        };
        actions.iter().map(|a| a.to_string()).collect()
    }

    fn message_from(task: &WorkflowTask, entity: &EntityContext, fallback: &str) -> String {
        let raw = task
            .action_config
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or(fallback);
        personalize(raw, entity)
    }

    async fn perform(
        &self,
        action: &str,
        task: &WorkflowTask,
        instance: &WorkflowInstance,
        entity: &EntityContext,
    ) -> Result<serde_json::Value, String> {
        match action {
            "voice_call" => {
                let phone = entity
                    .phone()
                    .ok_or("Cannot place call: no phone number on file")?;
                Ok(json!({
                    "called": phone,
                    "script": Self::message_from(task, entity, "Hi {contactPerson}, just checking in.")
                }))
            }
            "sms" => {
                let phone = entity
                    .phone()
                    .ok_or("Cannot send SMS: no phone number on file")?;
                Ok(json!({
                    "sms_to": phone,
                    "message": Self::message_from(task, entity, "Hi {firstName}!")
                }))
            }
            "email" => {
                let email = entity
                    .email()
                    .ok_or("Cannot send email: no email address on file")?;
                Ok(json!({
                    "email_to": email,
                    "subject": task
                        .action_config
                        .get("subject")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Following up"),
                    "body": Self::message_from(task, entity, "Hi {firstName},")
                }))
            }
            "task" => Ok(json!({
                "crm_task_created": true,
                "title": task.name,
                "assignee": task.assigned_agent_type
            })),
            "calendar" => Ok(json!({ "calendar_event_created": true })),
            "document" => Ok(json!({
                "document_generated": true,
                "template": task.action_config.get("document_template")
            })),
            "custom" => self.custom_action(task, instance, entity).await,
            other => Err(format!("Unknown generic action '{}'", other)),
        }
    }

    /// CUSTOM tasks either post to a configured webhook or fall back to a
    /// no-op acknowledgement, so drafts with unconfigured tasks still run.
    async fn custom_action(
        &self,
        task: &WorkflowTask,
        instance: &WorkflowInstance,
        entity: &EntityContext,
    ) -> Result<serde_json::Value, String> {
        let Some(url) = task.action_config.get("webhook_url").and_then(|v| v.as_str()) else {
            return Ok(json!({ "acknowledged": true }));
        };

        let payload = json!({
            "instance_id": instance.id,
            "task_id": task.id,
            "task_name": task.name,
            "entity": entity.to_json(),
            "config": task.action_config,
        });

        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("Webhook call failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Webhook returned {}", status));
        }

        let body: serde_json::Value = response.json().await.unwrap_or(json!({}));
        Ok(json!({ "webhook_status": status.as_u16(), "response": body }))
    }
}

#[async_trait]
impl ActionExecutor for GenericExecutor {
    fn agent_type(&self) -> &'static str {
        "generic_agent"
    }

    async fn execute(
        &self,
        task: &WorkflowTask,
        instance: &WorkflowInstance,
        entity: &EntityContext,
    ) -> ExecutionOutcome {
        let actions =
            configured_actions(task).unwrap_or_else(|| Self::default_actions(&task.task_type));
        if actions.is_empty() {
            return ExecutionOutcome::failure(format!(
                "No generic actions for task type '{}'",
                task.task_type
            ));
        }

        let mut results = serde_json::Map::new();
        for action in &actions {
            match self.perform(action, task, instance, entity).await {
                Ok(data) => {
                    results.insert(action.clone(), data);
                }
                Err(e) => return ExecutionOutcome::failure(e),
            }
        }

        ExecutionOutcome::success(json!({ "actions": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_shared::{Contact, DelayUnit, InstanceStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn sms_task() -> WorkflowTask {
        WorkflowTask {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            name: "Text the contact".to_string(),
            description: None,
            display_order: 0,
            task_type: "OUTREACH_SMS".to_string(),
            assigned_agent_type: None,
            delay_value: 0,
            delay_unit: DelayUnit::Minutes,
            is_hitl: false,
            is_optional: false,
            branch_condition: None,
            action_config: json!({ "message": "Hey {firstName}, are you free?" }),
        }
    }

    fn instance() -> WorkflowInstance {
        WorkflowInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            lead_id: None,
            deal_id: None,
            contact_id: Some(Uuid::new_v4()),
            status: InstanceStatus::Active,
            current_task_id: None,
            trigger_type: "MANUAL".to_string(),
            metadata: json!({}),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn contact(phone: Option<&str>) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            first_name: "Alex".to_string(),
            last_name: None,
            email: None,
            phone: phone.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_sms_requires_phone() {
        let executor = GenericExecutor::new();
        let outcome = executor
            .execute(
                &sms_task(),
                &instance(),
                &EntityContext::for_contact(contact(None)),
            )
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_sms_personalizes_message() {
        let executor = GenericExecutor::new();
        let outcome = executor
            .execute(
                &sms_task(),
                &instance(),
                &EntityContext::for_contact(contact(Some("+15550004444"))),
            )
            .await;
        assert!(outcome.success);
        assert_eq!(
            outcome.data["actions"]["sms"]["message"],
            "Hey Alex, are you free?"
        );
    }

    #[tokio::test]
    async fn test_custom_without_webhook_is_noop() {
        let executor = GenericExecutor::new();
        let mut task = sms_task();
        task.task_type = "CUSTOM".to_string();
        task.action_config = json!({});

        let outcome = executor
            .execute(&task, &instance(), &EntityContext::default())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.data["actions"]["custom"]["acknowledged"], true);
    }
}
