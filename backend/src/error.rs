//! Standardized error handling for the Cadence API
//!
//! This module provides a consistent error response format across all endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::storage::StorageError;
use cadence_shared::Industry;

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code (e.g., "TEMPLATE_NOT_FOUND", "DUPLICATE_ACTIVE_INSTANCE")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Start-instance errors, surfaced synchronously to the caller
    #[error("Workflow template {0} not found")]
    TemplateNotFound(Uuid),
    #[error("Workflow template {0} is inactive")]
    TemplateInactive(Uuid),
    #[error("Workflow template {0} has no tasks")]
    TemplateHasNoTasks(Uuid),
    #[error("{0} not found")]
    EntityNotFound(String),
    #[error("An active instance already exists for this template and entity")]
    DuplicateActiveInstance,

    // Lookup errors
    #[error("Workflow instance {0} not found")]
    InstanceNotFound(Uuid),
    #[error("Task execution {0} not found")]
    ExecutionNotFound(Uuid),
    #[error("{0} not found")]
    NotFound(String),

    // Dispatch-side errors, recorded on the execution rather than returned
    // over HTTP (except for explicit re-dispatch calls)
    #[error("No executor registered for task type '{task_type}' in industry {}", .industry.as_str())]
    UnknownTaskType { industry: Industry, task_type: String },
    #[error("{0}")]
    ExecutorFailure(String),
    #[error("Executor did not complete within {seconds} seconds")]
    ExecutorTimeout { seconds: u64 },

    // State machine violations (e.g. resuming a COMPLETED instance)
    #[error("{0}")]
    InvalidTransition(String),

    // Request validation
    #[error("Validation failed")]
    ValidationError { details: HashMap<String, Vec<String>> },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),

    // Server errors
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TemplateNotFound(_)
            | Self::EntityNotFound(_)
            | Self::InstanceNotFound(_)
            | Self::ExecutionNotFound(_)
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TemplateInactive(_) | Self::TemplateHasNoTasks(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::DuplicateActiveInstance | Self::Conflict(_) | Self::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            Self::UnknownTaskType { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ExecutorFailure(_) | Self::ExecutorTimeout { .. } => StatusCode::BAD_GATEWAY,
            Self::InternalError(_) | Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            Self::TemplateInactive(_) => "TEMPLATE_INACTIVE",
            Self::TemplateHasNoTasks(_) => "TEMPLATE_HAS_NO_TASKS",
            Self::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            Self::DuplicateActiveInstance => "DUPLICATE_ACTIVE_INSTANCE",
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Self::ExecutionNotFound(_) => "EXECUTION_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnknownTaskType { .. } => "UNKNOWN_TASK_TYPE",
            Self::ExecutorFailure(_) => "EXECUTOR_FAILURE",
            Self::ExecutorTimeout { .. } => "EXECUTOR_TIMEOUT",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::InternalError(_) => "INTERNAL_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Get the error message for the HTTP response body. Server-side detail
    /// stays in the logs; the client sees a generic message.
    pub fn message(&self) -> String {
        match self {
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "A database error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = ApiError::new(self.error_code(), self.message());

        if let Self::ValidationError { details } = &self {
            error.details = Some(details.clone());
        }

        (status, Json(error)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::NotFound(what.to_string()),
            StorageError::DuplicateActiveInstance => Self::DuplicateActiveInstance,
            StorageError::Database(e) => Self::DatabaseError(e.to_string()),
            StorageError::Serialization(e) => Self::InternalError(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: HashMap<String, Vec<String>> = HashMap::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field))
                })
                .collect();
            details.insert(field.to_string(), messages);
        }
        Self::ValidationError { details }
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper to accumulate field-level validation errors
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: HashMap::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
        self
    }

    pub fn build(self) -> Option<AppError> {
        if self.details.is_empty() {
            None
        } else {
            Some(AppError::ValidationError {
                details: self.details,
            })
        }
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
