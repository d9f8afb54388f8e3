// Workflow Catalog - per-industry task keys and built-in starter templates

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use cadence_shared::{DelayUnit, Industry, TaskType, WorkflowTask, WorkflowTemplate};

use crate::error::ApiResult;
use crate::storage::Storage;

/// Task types available to templates of the given industry. Generic types
/// are available everywhere.
pub fn task_catalog(industry: Industry) -> Vec<TaskType> {
    let specific: &[TaskType] = match industry {
        Industry::RealEstate => &[
            TaskType::Qualification,
            TaskType::MlsSearch,
            TaskType::ShowingSchedule,
            TaskType::ShowingFeedback,
            TaskType::OfferPrep,
            TaskType::ClosingCoordination,
            TaskType::PostCloseFollowup,
            TaskType::CmaGeneration,
            TaskType::ListingPrep,
            TaskType::ListingPublish,
        ],
        Industry::Medical => &[
            TaskType::PatientResearch,
            TaskType::AppointmentBooking,
            TaskType::InsuranceVerification,
            TaskType::AppointmentReminder,
            TaskType::FollowUpCare,
            TaskType::RecallScheduling,
        ],
        Industry::Restaurant => &[
            TaskType::ReservationConfirm,
            TaskType::CateringQuote,
            TaskType::EventFollowup,
            TaskType::ReviewRequest,
            TaskType::LoyaltyOutreach,
        ],
        Industry::Construction => &[
            TaskType::EstimateGeneration,
            TaskType::ProjectScheduling,
            TaskType::MaterialOrdering,
            TaskType::InspectionScheduling,
            TaskType::ProgressUpdate,
            TaskType::ChangeOrder,
            TaskType::ProjectCompletion,
        ],
        Industry::Generic => &[],
    };

    let generic = [
        TaskType::OutreachCall,
        TaskType::OutreachSms,
        TaskType::OutreachEmail,
        TaskType::CrmTask,
        TaskType::CalendarEvent,
        TaskType::DocumentGeneration,
        TaskType::Custom,
    ];

    specific.iter().chain(generic.iter()).copied().collect()
}

struct TaskSpec {
    name: &'static str,
    task_type: TaskType,
    delay_value: i32,
    delay_unit: DelayUnit,
    is_hitl: bool,
    is_optional: bool,
    action_config: serde_json::Value,
}

impl TaskSpec {
    fn new(name: &'static str, task_type: TaskType) -> Self {
        Self {
            name,
            task_type,
            delay_value: 0,
            delay_unit: DelayUnit::Minutes,
            is_hitl: false,
            is_optional: false,
            action_config: json!({}),
        }
    }

    fn delay(mut self, value: i32, unit: DelayUnit) -> Self {
        self.delay_value = value;
        self.delay_unit = unit;
        self
    }

    fn hitl(mut self) -> Self {
        self.is_hitl = true;
        self
    }

    fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    fn config(mut self, config: serde_json::Value) -> Self {
        self.action_config = config;
        self
    }
}

struct TemplateSpec {
    name: &'static str,
    description: &'static str,
    industry: Industry,
    trigger_config: Option<serde_json::Value>,
    tasks: Vec<TaskSpec>,
}

fn builtin_specs() -> Vec<TemplateSpec> {
    vec![
        TemplateSpec {
            name: "Buyer Lead Nurture",
            description: "Qualify new buyer leads, search listings, and book showings",
            industry: Industry::RealEstate,
            trigger_config: Some(json!({ "event_type": "LEAD_CREATED" })),
            tasks: vec![
                TaskSpec::new("Qualify the lead", TaskType::Qualification),
                TaskSpec::new("Search matching listings", TaskType::MlsSearch)
                    .delay(2, DelayUnit::Hours),
                TaskSpec::new("Schedule showings", TaskType::ShowingSchedule)
                    .delay(1, DelayUnit::Days)
                    .hitl(),
                TaskSpec::new("Collect showing feedback", TaskType::ShowingFeedback)
                    .delay(2, DelayUnit::Days)
                    .optional(),
            ],
        },
        TemplateSpec {
            name: "New Patient Intake",
            description: "Book, verify insurance, and remind new patients",
            industry: Industry::Medical,
            trigger_config: Some(json!({ "event_type": "LEAD_CREATED" })),
            tasks: vec![
                TaskSpec::new("Research patient history", TaskType::PatientResearch),
                TaskSpec::new("Book first appointment", TaskType::AppointmentBooking)
                    .delay(30, DelayUnit::Minutes)
                    .hitl(),
                TaskSpec::new("Verify insurance", TaskType::InsuranceVerification)
                    .delay(1, DelayUnit::Hours),
                TaskSpec::new("Send appointment reminder", TaskType::AppointmentReminder)
                    .delay(1, DelayUnit::Days)
                    .config(json!({
                        "message": "Hi {firstName}, a reminder about your upcoming appointment."
                    })),
            ],
        },
        TemplateSpec {
            name: "Catering Inquiry Follow-up",
            description: "Quote and follow up on inbound catering requests",
            industry: Industry::Restaurant,
            trigger_config: Some(json!({
                "event_type": "MESSAGE_RECEIVED",
                "keywords": ["catering", "event", "party"]
            })),
            tasks: vec![
                TaskSpec::new("Prepare catering quote", TaskType::CateringQuote),
                TaskSpec::new("Follow up on the quote", TaskType::EventFollowup)
                    .delay(2, DelayUnit::Days)
                    .config(json!({
                        "message": "Hi {firstName}, did you have a chance to review our quote?"
                    })),
                TaskSpec::new("Request a review", TaskType::ReviewRequest)
                    .delay(7, DelayUnit::Days)
                    .optional(),
            ],
        },
        TemplateSpec {
            name: "Estimate to Kickoff",
            description: "From qualified lead to scheduled project",
            industry: Industry::Construction,
            trigger_config: Some(json!({
                "event_type": "LEAD_STATUS_CHANGED",
                "to_status": "QUALIFIED"
            })),
            tasks: vec![
                TaskSpec::new("Generate estimate", TaskType::EstimateGeneration),
                TaskSpec::new("Approve and send estimate", TaskType::OutreachEmail)
                    .delay(1, DelayUnit::Hours)
                    .hitl()
                    .config(json!({ "subject": "Your project estimate" })),
                TaskSpec::new("Schedule the project", TaskType::ProjectScheduling)
                    .delay(3, DelayUnit::Days),
                TaskSpec::new("Order materials", TaskType::MaterialOrdering)
                    .delay(1, DelayUnit::Days),
            ],
        },
        TemplateSpec {
            name: "New Lead Outreach",
            description: "Generic call-then-text sequence for brand new leads",
            industry: Industry::Generic,
            trigger_config: Some(json!({ "event_type": "LEAD_CREATED" })),
            tasks: vec![
                TaskSpec::new("Welcome call", TaskType::OutreachCall).config(json!({
                    "message": "Hi {contactPerson}, thanks for reaching out to us!"
                })),
                TaskSpec::new("Follow-up text", TaskType::OutreachSms)
                    .delay(4, DelayUnit::Hours)
                    .config(json!({
                        "message": "Hi {firstName}, just following up on our call."
                    })),
                TaskSpec::new("Create CRM follow-up task", TaskType::CrmTask)
                    .delay(2, DelayUnit::Days),
            ],
        },
    ]
}

/// Seed the built-in starter templates for a tenant. Templates the tenant
/// already has (by name) are left alone. Returns the templates created.
pub async fn seed_builtin_templates(
    storage: &Storage,
    tenant_id: Uuid,
) -> ApiResult<Vec<WorkflowTemplate>> {
    let existing = storage.templates.list_templates(tenant_id).await?;

    let mut created = Vec::new();
    for spec in builtin_specs() {
        if existing.iter().any(|t| t.name == spec.name) {
            continue;
        }

        let template = WorkflowTemplate {
            id: Uuid::new_v4(),
            tenant_id,
            name: spec.name.to_string(),
            description: Some(spec.description.to_string()),
            industry: spec.industry,
            is_active: true,
            trigger_config: spec.trigger_config.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };

        let tasks: Vec<WorkflowTask> = spec
            .tasks
            .into_iter()
            .enumerate()
            .map(|(i, t)| WorkflowTask {
                id: Uuid::new_v4(),
                template_id: template.id,
                name: t.name.to_string(),
                description: None,
                display_order: i as i32,
                task_type: t.task_type.as_str().to_string(),
                assigned_agent_type: None,
                delay_value: t.delay_value,
                delay_unit: t.delay_unit,
                is_hitl: t.is_hitl,
                is_optional: t.is_optional,
                branch_condition: None,
                action_config: t.action_config,
            })
            .collect();

        storage.templates.create_template(&template, &tasks).await?;
        created.push(template);
    }

    tracing::info!(tenant_id = %tenant_id, count = created.len(), "Seeded built-in templates");
    Ok(created)
}
