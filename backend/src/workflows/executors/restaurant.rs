// Restaurant Executor - reservation, catering, and guest retention tasks

use async_trait::async_trait;
use serde_json::json;

use cadence_shared::{TaskType, WorkflowInstance, WorkflowTask};

use super::{configured_actions, personalize, ActionExecutor, EntityContext, ExecutionOutcome};

pub struct RestaurantExecutor;

impl RestaurantExecutor {
    pub fn new() -> Self {
        Self
    }

    fn default_actions(task_type: &str) -> Vec<String> {
        let actions: &[&str] = match TaskType::parse(task_type) {
            Some(TaskType::ReservationConfirm) => &["confirm_reservation"],
            Some(TaskType::CateringQuote) => &["catering_quote", "send_quote"],
            Some(TaskType::EventFollowup) => &["event_followup"],
            Some(TaskType::ReviewRequest) => &["request_review"],
            Some(TaskType::LoyaltyOutreach) => &["loyalty_offer"],
            _ => &[],
        };
        actions.iter().map(|a| a.to_string()).collect()
    }

    fn perform(
        &self,
        action: &str,
        task: &WorkflowTask,
        entity: &EntityContext,
    ) -> Result<serde_json::Value, String> {
        match action {
            "confirm_reservation" => {
                let phone = entity
                    .phone()
                    .ok_or("Cannot confirm reservation: no phone number on file")?;
                Ok(json!({ "confirmed_via": phone }))
            }
            "catering_quote" => {
                let headcount = task
                    .action_config
                    .get("headcount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(25);
                Ok(json!({ "quote_prepared": true, "headcount": headcount }))
            }
            "send_quote" => {
                let email = entity
                    .email()
                    .ok_or("Cannot send quote: no email address on file")?;
                Ok(json!({ "quote_sent_to": email }))
            }
            "event_followup" | "loyalty_offer" => {
                let message = task
                    .action_config
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Thanks for visiting, {firstName}!");
                Ok(json!({
                    "recipient": entity.contact_person(),
                    "message": personalize(message, entity)
                }))
            }
            "request_review" => Ok(json!({ "review_requested": entity.contact_person() })),
            other => Err(format!("Unknown restaurant action '{}'", other)),
        }
    }
}

#[async_trait]
impl ActionExecutor for RestaurantExecutor {
    fn agent_type(&self) -> &'static str {
        "restaurant_host"
    }

    async fn execute(
        &self,
        task: &WorkflowTask,
        _instance: &WorkflowInstance,
        entity: &EntityContext,
    ) -> ExecutionOutcome {
        let actions =
            configured_actions(task).unwrap_or_else(|| Self::default_actions(&task.task_type));
        if actions.is_empty() {
            return ExecutionOutcome::failure(format!(
                "No restaurant actions for task type '{}'",
                task.task_type
            ));
        }

        let mut results = serde_json::Map::new();
        for action in &actions {
            match self.perform(action, task, entity) {
                Ok(data) => {
                    results.insert(action.clone(), data);
                }
                Err(e) => return ExecutionOutcome::failure(e),
            }
        }

        ExecutionOutcome::success(json!({ "actions": results }))
    }
}
