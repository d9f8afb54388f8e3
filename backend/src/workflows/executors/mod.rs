// Action Executors - typed task handlers resolved per (industry, task type)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cadence_shared::{Contact, Deal, Industry, Lead, TaskType, WorkflowInstance, WorkflowTask};

mod construction;
mod generic;
mod medical;
mod real_estate;
mod restaurant;

pub use construction::ConstructionExecutor;
pub use generic::GenericExecutor;
pub use medical::MedicalExecutor;
pub use real_estate::RealEstateExecutor;
pub use restaurant::RestaurantExecutor;

/// Snapshot of the bound CRM entity handed to executors.
#[derive(Debug, Clone, Default)]
pub struct EntityContext {
    pub lead: Option<Lead>,
    pub deal: Option<Deal>,
    pub contact: Option<Contact>,
}

impl EntityContext {
    pub fn for_lead(lead: Lead) -> Self {
        Self {
            lead: Some(lead),
            ..Self::default()
        }
    }

    pub fn for_deal(deal: Deal) -> Self {
        Self {
            deal: Some(deal),
            ..Self::default()
        }
    }

    pub fn for_contact(contact: Contact) -> Self {
        Self {
            contact: Some(contact),
            ..Self::default()
        }
    }

    /// The person's display name, whichever entity is bound.
    pub fn contact_person(&self) -> Option<String> {
        if let Some(lead) = &self.lead {
            return lead.contact_person.clone().or_else(|| Some(lead.business_name.clone()));
        }
        if let Some(contact) = &self.contact {
            return Some(match &contact.last_name {
                Some(last) => format!("{} {}", contact.first_name, last),
                None => contact.first_name.clone(),
            });
        }
        self.deal.as_ref().map(|d| d.title.clone())
    }

    pub fn first_name(&self) -> Option<String> {
        if let Some(contact) = &self.contact {
            return Some(contact.first_name.clone());
        }
        self.contact_person()
            .map(|name| name.split_whitespace().next().unwrap_or(&name).to_string())
    }

    pub fn business_name(&self) -> Option<String> {
        self.lead.as_ref().map(|l| l.business_name.clone())
    }

    pub fn email(&self) -> Option<&str> {
        self.lead
            .as_ref()
            .and_then(|l| l.email.as_deref())
            .or_else(|| self.contact.as_ref().and_then(|c| c.email.as_deref()))
    }

    pub fn phone(&self) -> Option<&str> {
        self.lead
            .as_ref()
            .and_then(|l| l.phone.as_deref())
            .or_else(|| self.contact.as_ref().and_then(|c| c.phone.as_deref()))
    }

    /// JSON view used as the `entity` scope in branch evaluation.
    pub fn to_json(&self) -> serde_json::Value {
        if let Some(lead) = &self.lead {
            return serde_json::json!(lead);
        }
        if let Some(deal) = &self.deal {
            return serde_json::json!(deal);
        }
        if let Some(contact) = &self.contact {
            return serde_json::json!(contact);
        }
        serde_json::Value::Null
    }
}

/// Outcome of one executor run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// A task executor for one industry family.
///
/// Executors receive the task's opaque `action_config` untouched and must
/// not mutate engine state; the dispatch layer owns all persistence.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Agent label recorded on the execution as `agent_used`.
    fn agent_type(&self) -> &'static str;

    async fn execute(
        &self,
        task: &WorkflowTask,
        instance: &WorkflowInstance,
        entity: &EntityContext,
    ) -> ExecutionOutcome;
}

/// Registry mapping (industry, task type) to an executor.
///
/// Resolution falls back to the GENERIC industry before giving up, so
/// cross-industry task types (outreach, CRM tasks) need only one entry.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<(Industry, TaskType), Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        industry: Industry,
        task_types: &[TaskType],
        executor: Arc<dyn ActionExecutor>,
    ) {
        for task_type in task_types {
            self.executors.insert((industry, *task_type), executor.clone());
        }
    }

    pub fn resolve(
        &self,
        industry: Industry,
        task_type: TaskType,
    ) -> Option<Arc<dyn ActionExecutor>> {
        self.executors
            .get(&(industry, task_type))
            .or_else(|| self.executors.get(&(Industry::Generic, task_type)))
            .cloned()
    }

    /// Registry with the built-in executor families wired up.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(
            Industry::RealEstate,
            &[
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
            Arc::new(RealEstateExecutor::new()),
        );

        registry.register(
            Industry::Medical,
            &[
                TaskType::PatientResearch,
                TaskType::AppointmentBooking,
                TaskType::InsuranceVerification,
                TaskType::AppointmentReminder,
                TaskType::FollowUpCare,
                TaskType::RecallScheduling,
            ],
            Arc::new(MedicalExecutor::new()),
        );

        registry.register(
            Industry::Restaurant,
            &[
                TaskType::ReservationConfirm,
                TaskType::CateringQuote,
                TaskType::EventFollowup,
                TaskType::ReviewRequest,
                TaskType::LoyaltyOutreach,
            ],
            Arc::new(RestaurantExecutor::new()),
        );

        registry.register(
            Industry::Construction,
            &[
                TaskType::EstimateGeneration,
                TaskType::ProjectScheduling,
                TaskType::MaterialOrdering,
                TaskType::InspectionScheduling,
                TaskType::ProgressUpdate,
                TaskType::ChangeOrder,
                TaskType::ProjectCompletion,
            ],
            Arc::new(ConstructionExecutor::new()),
        );

        registry.register(
            Industry::Generic,
            &[
                TaskType::OutreachCall,
                TaskType::OutreachSms,
                TaskType::OutreachEmail,
                TaskType::CrmTask,
                TaskType::CalendarEvent,
                TaskType::DocumentGeneration,
                TaskType::Custom,
            ],
            Arc::new(GenericExecutor::new()),
        );

        registry
    }
}

/// Explicit action list from a task's `action_config`, when present.
pub(crate) fn configured_actions(task: &WorkflowTask) -> Option<Vec<String>> {
    let actions = task.action_config.get("actions")?.as_array()?;
    Some(
        actions
            .iter()
            .filter_map(|a| a.as_str().map(String::from))
            .collect(),
    )
}

/// Fill `{contactPerson}` / `{firstName}` / `{businessName}` placeholders in
/// outbound message text. Unknown placeholders are left as-is.
pub fn personalize(text: &str, entity: &EntityContext) -> String {
    static PLACEHOLDER: OnceLock<regex::Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| regex::Regex::new(r"\{(\w+)\}").unwrap());

    re.replace_all(text, |caps: &regex::Captures| {
        let replacement = match &caps[1] {
            "contactPerson" => entity.contact_person(),
            "firstName" => entity.first_name(),
            "businessName" => entity.business_name(),
            _ => None,
        };
        replacement.unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}
