use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Industry vertical a workflow template belongs to.
///
/// `Generic` templates apply regardless of the tenant's industry; everything
/// else scopes which executor family handles the template's tasks.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "industry", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Industry {
    RealEstate,
    Medical,
    Restaurant,
    Construction,
    Generic,
}

impl Industry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RealEstate => "REAL_ESTATE",
            Self::Medical => "MEDICAL",
            Self::Restaurant => "RESTAURANT",
            Self::Construction => "CONSTRUCTION",
            Self::Generic => "GENERIC",
        }
    }

    /// Normalize a raw industry label, folding known aliases.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "REAL_ESTATE" | "REALTOR" | "REALTY" => Self::RealEstate,
            "MEDICAL" | "DENTAL" | "HEALTHCARE" | "CLINIC" => Self::Medical,
            "RESTAURANT" | "HOSPITALITY" | "FOOD_SERVICE" => Self::Restaurant,
            "CONSTRUCTION" | "CONTRACTOR" | "TRADES" => Self::Construction,
            _ => Self::Generic,
        }
    }
}

/// Unit for a task's delay, measured from the prior task's completion.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "delay_unit", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    /// Convert a delay value in this unit to a duration.
    pub fn to_duration(&self, value: i32) -> chrono::Duration {
        let value = value.max(0) as i64;
        match self {
            Self::Minutes => chrono::Duration::minutes(value),
            Self::Hours => chrono::Duration::hours(value),
            Self::Days => chrono::Duration::days(value),
        }
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "instance_status", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "execution_status", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Typed task keys resolved by the dispatch layer.
///
/// Stored as plain text on `WorkflowTask` so tenants can save drafts with
/// arbitrary keys; dispatch parses the string and fails the execution when
/// the key is unknown or unregistered for the instance's industry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    // Real estate
    Qualification,
    MlsSearch,
    ShowingSchedule,
    ShowingFeedback,
    OfferPrep,
    ClosingCoordination,
    PostCloseFollowup,
    CmaGeneration,
    ListingPrep,
    ListingPublish,

    // Medical
    PatientResearch,
    AppointmentBooking,
    InsuranceVerification,
    AppointmentReminder,
    FollowUpCare,
    RecallScheduling,

    // Restaurant
    ReservationConfirm,
    CateringQuote,
    EventFollowup,
    ReviewRequest,
    LoyaltyOutreach,

    // Construction
    EstimateGeneration,
    ProjectScheduling,
    MaterialOrdering,
    InspectionScheduling,
    ProgressUpdate,
    ChangeOrder,
    ProjectCompletion,

    // Generic outreach
    OutreachCall,
    OutreachSms,
    OutreachEmail,
    CrmTask,
    CalendarEvent,
    DocumentGeneration,
    Custom,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualification => "QUALIFICATION",
            Self::MlsSearch => "MLS_SEARCH",
            Self::ShowingSchedule => "SHOWING_SCHEDULE",
            Self::ShowingFeedback => "SHOWING_FEEDBACK",
            Self::OfferPrep => "OFFER_PREP",
            Self::ClosingCoordination => "CLOSING_COORDINATION",
            Self::PostCloseFollowup => "POST_CLOSE_FOLLOWUP",
            Self::CmaGeneration => "CMA_GENERATION",
            Self::ListingPrep => "LISTING_PREP",
            Self::ListingPublish => "LISTING_PUBLISH",
            Self::PatientResearch => "PATIENT_RESEARCH",
            Self::AppointmentBooking => "APPOINTMENT_BOOKING",
            Self::InsuranceVerification => "INSURANCE_VERIFICATION",
            Self::AppointmentReminder => "APPOINTMENT_REMINDER",
            Self::FollowUpCare => "FOLLOW_UP_CARE",
            Self::RecallScheduling => "RECALL_SCHEDULING",
            Self::ReservationConfirm => "RESERVATION_CONFIRM",
            Self::CateringQuote => "CATERING_QUOTE",
            Self::EventFollowup => "EVENT_FOLLOWUP",
            Self::ReviewRequest => "REVIEW_REQUEST",
            Self::LoyaltyOutreach => "LOYALTY_OUTREACH",
            Self::EstimateGeneration => "ESTIMATE_GENERATION",
            Self::ProjectScheduling => "PROJECT_SCHEDULING",
            Self::MaterialOrdering => "MATERIAL_ORDERING",
            Self::InspectionScheduling => "INSPECTION_SCHEDULING",
            Self::ProgressUpdate => "PROGRESS_UPDATE",
            Self::ChangeOrder => "CHANGE_ORDER",
            Self::ProjectCompletion => "PROJECT_COMPLETION",
            Self::OutreachCall => "OUTREACH_CALL",
            Self::OutreachSms => "OUTREACH_SMS",
            Self::OutreachEmail => "OUTREACH_EMAIL",
            Self::CrmTask => "CRM_TASK",
            Self::CalendarEvent => "CALENDAR_EVENT",
            Self::DocumentGeneration => "DOCUMENT_GENERATION",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
    }
}

/// Reusable, ordered definition of workflow tasks owned by a tenant.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub industry: Industry,
    pub is_active: bool,
    /// Opaque trigger rule parsed by the trigger matcher; templates without
    /// one are started manually or via the API only.
    pub trigger_config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Position in the template's default linear order.
    pub display_order: i32,
    /// String key resolved to a [`TaskType`] by the dispatch layer.
    pub task_type: String,
    pub assigned_agent_type: Option<String>,
    pub delay_value: i32,
    pub delay_unit: DelayUnit,
    pub is_hitl: bool,
    pub is_optional: bool,
    /// Opaque predicate evaluated by the branch evaluator after completion.
    pub branch_condition: Option<serde_json::Value>,
    /// Opaque executor parameters, passed through untouched.
    pub action_config: serde_json::Value,
}

/// The CRM entity a workflow instance is bound to. Exactly one binding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Lead(Uuid),
    Deal(Uuid),
    Contact(Uuid),
}

impl Binding {
    pub fn lead_id(&self) -> Option<Uuid> {
        match self {
            Self::Lead(id) => Some(*id),
            _ => None,
        }
    }

    pub fn deal_id(&self) -> Option<Uuid> {
        match self {
            Self::Deal(id) => Some(*id),
            _ => None,
        }
    }

    pub fn contact_id(&self) -> Option<Uuid> {
        match self {
            Self::Contact(id) => Some(*id),
            _ => None,
        }
    }

    pub fn from_ids(
        lead_id: Option<Uuid>,
        deal_id: Option<Uuid>,
        contact_id: Option<Uuid>,
    ) -> Option<Self> {
        match (lead_id, deal_id, contact_id) {
            (Some(id), None, None) => Some(Self::Lead(id)),
            (None, Some(id), None) => Some(Self::Deal(id)),
            (None, None, Some(id)) => Some(Self::Contact(id)),
            _ => None,
        }
    }
}

/// One running execution of a template bound to a specific entity.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub tenant_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub status: InstanceStatus,
    pub current_task_id: Option<Uuid>,
    pub trigger_type: String,
    pub metadata: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn binding(&self) -> Option<Binding> {
        Binding::from_ids(self.lead_id, self.deal_id, self.contact_id)
    }
}

/// Per-task record of scheduling, attempt, and outcome within an instance.
///
/// Every task in the template gets an execution row at instance start, so
/// the full plan is visible immediately. Rows are never deleted.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub task_id: Uuid,
    pub status: ExecutionStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub agent_used: Option<String>,
    /// Set while a human-gated execution waits for approval.
    pub hitl_pending: bool,
    pub hitl_resolved_by: Option<Uuid>,
    pub hitl_note: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "hitl_status", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitlStatus {
    Pending,
    Resolved,
}

/// Approval request raised when the HITL gate suspends an instance.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlNotification {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub execution_id: Uuid,
    pub task_name: String,
    pub workflow_name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub urgency: String,
    pub status: HitlStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// Bound CRM entities. The engine only verifies existence and tenant
// ownership and hands executors a snapshot; their lifecycle lives elsewhere.

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub business_name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub stage_id: Option<String>,
    pub value: Option<Decimal>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Tenant-level engine counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total_templates: i64,
    pub active_instances: i64,
    pub completed_instances: i64,
    pub pending_approvals: i64,
}
