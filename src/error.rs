use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Machine-readable failure classes for the plan generation pipeline.
/// Every code is terminal for the current request; the only internal
/// recovery paths are the provider fallback and the day-shift repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorCode {
    CapacityExceeded,
    AllProvidersFailed,
    ResponseTooLarge,
    MalformedResponse,
    ParseError,
    InvalidSubjects,
    WrongWeekCount,
    PastSessions,
    ClusteredSessions,
    SkippedDays,
    WrongDaySessions,
}

impl PlanErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanErrorCode::CapacityExceeded => "CAPACITY_EXCEEDED",
            PlanErrorCode::AllProvidersFailed => "ALL_PROVIDERS_FAILED",
            PlanErrorCode::ResponseTooLarge => "RESPONSE_TOO_LARGE",
            PlanErrorCode::MalformedResponse => "MALFORMED_RESPONSE",
            PlanErrorCode::ParseError => "PARSE_ERROR",
            PlanErrorCode::InvalidSubjects => "INVALID_SUBJECTS",
            PlanErrorCode::WrongWeekCount => "WRONG_WEEK_COUNT",
            PlanErrorCode::PastSessions => "PAST_SESSIONS",
            PlanErrorCode::ClusteredSessions => "CLUSTERED_SESSIONS",
            PlanErrorCode::SkippedDays => "SKIPPED_DAYS",
            PlanErrorCode::WrongDaySessions => "WRONG_DAY_SESSIONS",
        }
    }

    /// Whether the caller can fix the request and resubmit, as opposed to
    /// retrying generation later with the same input.
    pub fn is_user_correctable(self) -> bool {
        matches!(self, PlanErrorCode::CapacityExceeded)
    }
}

impl fmt::Display for PlanErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("{message}")]
    Plan {
        code: PlanErrorCode,
        message: String,
        correlation_id: Option<String>,
        details: Option<JsonValue>,
    },

    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn plan(code: PlanErrorCode, message: impl Into<String>) -> Self {
        Self::plan_with_details(code, message, None, None)
    }

    pub fn plan_with_details(
        code: PlanErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        details: Option<JsonValue>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match (&correlation, &details) {
            (Some(id), Some(payload)) => {
                warn!(
                    target: "app::plan::error",
                    code = %code,
                    correlation_id = %id,
                    details = %payload,
                    %message
                );
            }
            (Some(id), None) => {
                warn!(
                    target: "app::plan::error",
                    code = %code,
                    correlation_id = %id,
                    %message
                );
            }
            (None, Some(payload)) => {
                warn!(target: "app::plan::error", code = %code, details = %payload, %message);
            }
            (None, None) => {
                warn!(target: "app::plan::error", code = %code, %message);
            }
        }

        AppError::Plan {
            code,
            message,
            correlation_id: correlation,
            details,
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        let provider = provider.into();
        let message = message.into();
        warn!(target: "app::ai::error", %provider, %message, "provider error");
        AppError::Provider { provider, message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn plan_code(&self) -> Option<PlanErrorCode> {
        match self {
            AppError::Plan { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn plan_correlation_id(&self) -> Option<&str> {
        match self {
            AppError::Plan { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    pub fn plan_details(&self) -> Option<&JsonValue> {
        match self {
            AppError::Plan { details, .. } => details.as_ref(),
            AppError::Validation { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}
