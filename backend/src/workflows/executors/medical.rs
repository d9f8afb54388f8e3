// Medical Executor - patient intake and appointment lifecycle tasks

use async_trait::async_trait;
use serde_json::json;

use cadence_shared::{TaskType, WorkflowInstance, WorkflowTask};

use super::{configured_actions, personalize, ActionExecutor, EntityContext, ExecutionOutcome};

pub struct MedicalExecutor;

impl MedicalExecutor {
    pub fn new() -> Self {
        Self
    }

    fn default_actions(task_type: &str) -> Vec<String> {
        let actions: &[&str] = match TaskType::parse(task_type) {
            Some(TaskType::PatientResearch) => &["patient_research"],
            Some(TaskType::AppointmentBooking) => &["book_appointment", "send_intake_forms"],
            Some(TaskType::InsuranceVerification) => &["verify_insurance"],
            Some(TaskType::AppointmentReminder) => &["send_reminder"],
            Some(TaskType::FollowUpCare) => &["follow_up_message"],
            Some(TaskType::RecallScheduling) => &["schedule_recall"],
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
            "patient_research" => Ok(json!({
                "patient": entity.contact_person(),
                "history_reviewed": true
            })),
            "book_appointment" => {
                let phone = entity
                    .phone()
                    .ok_or("Cannot book appointment: no phone number on file")?;
                Ok(json!({ "booked": true, "confirmed_via": phone }))
            }
            "send_intake_forms" => {
                let email = entity
                    .email()
                    .ok_or("Cannot send intake forms: no email address on file")?;
                Ok(json!({ "forms_sent_to": email }))
            }
            "verify_insurance" => {
                let provider = task
                    .action_config
                    .get("insurance_provider")
                    .and_then(|v| v.as_str());
                Ok(json!({ "insurance_verified": true, "provider": provider }))
            }
            "send_reminder" => {
                let phone = entity
                    .phone()
                    .ok_or("Cannot send reminder: no phone number on file")?;
                let message = task
                    .action_config
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Hi {firstName}, this is a reminder about your appointment.");
                Ok(json!({
                    "reminder_sent_to": phone,
                    "message": personalize(message, entity)
                }))
            }
            "follow_up_message" => Ok(json!({ "followed_up": entity.contact_person() })),
            "schedule_recall" => Ok(json!({ "recall_scheduled": true })),
            other => Err(format!("Unknown medical action '{}'", other)),
        }
    }
}

#[async_trait]
impl ActionExecutor for MedicalExecutor {
    fn agent_type(&self) -> &'static str {
        "medical_coordinator"
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
                "No medical actions for task type '{}'",
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
