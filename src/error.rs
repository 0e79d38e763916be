use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::generation::GenerationError;
use crate::usage_tracker::UsageSnapshot;

/// Failure taxonomy shared by the core and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    #[serde(rename = "ConfigurationError")]
    Configuration,
    #[serde(rename = "ValidationError")]
    Validation,
    QuotaExceeded,
    #[serde(rename = "ConnectionError")]
    Connection,
    #[serde(rename = "ProviderError")]
    Provider,
    #[serde(rename = "MalformedResponseError")]
    MalformedResponse,
    #[serde(rename = "InternalError")]
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Configuration => "ConfigurationError",
            FailureKind::Validation => "ValidationError",
            FailureKind::QuotaExceeded => "QuotaExceeded",
            FailureKind::Connection => "ConnectionError",
            FailureKind::Provider => "ProviderError",
            FailureKind::MalformedResponse => "MalformedResponseError",
            FailureKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Daily limit of {} calls reached", .0.max_calls)]
    QuotaExceeded(UsageSnapshot),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Provider returned an empty reply")]
    EmptyReply,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Configuration(_) => FailureKind::Configuration,
            Error::Validation(_) => FailureKind::Validation,
            Error::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            Error::Generation(err) => err.kind(),
            Error::EmptyReply => FailureKind::MalformedResponse,
            Error::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller.
    fn public_message(&self) -> String {
        match self {
            Error::QuotaExceeded(usage) => format!(
                "You've reached your daily limit of {} API calls. Please try again tomorrow.",
                usage.max_calls
            ),
            Error::Validation(_) => "Invalid email content provided".to_string(),
            Error::Configuration(_) => "Service is not configured correctly".to_string(),
            Error::Generation(_) | Error::EmptyReply => "Failed to generate email reply".to_string(),
            Error::Internal(_) => "An unexpected error occurred".to_string(),
        }
    }
}

/// JSON body returned for every failure.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

impl ErrorResponse {
    pub fn from_error(err: &Error) -> Self {
        let details = match err {
            Error::QuotaExceeded(_) => None,
            other => Some(other.to_string()),
        };
        let usage = match err {
            Error::QuotaExceeded(usage) => Some(usage.clone()),
            _ => None,
        };

        Self {
            success: false,
            error: err.kind(),
            message: err.public_message(),
            details,
            usage,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = %self.kind(), status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, kind = %self.kind(), status = status.as_u16(), "Request rejected");
        }

        let body = ErrorResponse::from_error(&self);
        let response = (status, Json(body)).into_response();
        match &self {
            Error::QuotaExceeded(usage) => crate::handlers::with_usage_headers(response, usage),
            _ => response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MalformedResponse;
    use chrono::NaiveDate;

    fn exhausted() -> UsageSnapshot {
        UsageSnapshot {
            current_usage: 5,
            remaining_calls: 0,
            max_calls: 5,
            can_make_call: false,
            reset_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            last_call_time: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::QuotaExceeded(exhausted()).status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            Error::Generation(GenerationError::Connection("refused".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(Error::EmptyReply.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_kinds_follow_generation_error() {
        let err = Error::from(GenerationError::Malformed(MalformedResponse::EmptyCandidates {
            raw: "{}".into(),
        }));
        assert_eq!(err.kind(), FailureKind::MalformedResponse);

        let err = Error::from(GenerationError::Provider {
            status: 503,
            body: "overloaded".into(),
        });
        assert_eq!(err.kind(), FailureKind::Provider);
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_quota_response_carries_usage() {
        let body = serde_json::to_value(ErrorResponse::from_error(&Error::QuotaExceeded(exhausted()))).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "QuotaExceeded");
        assert_eq!(body["remainingCalls"], 0);
        assert_eq!(body["canMakeCall"], false);
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_validation_response_has_details() {
        let body = serde_json::to_value(ErrorResponse::from_error(&Error::Validation(
            "Email content cannot be empty".into(),
        )))
        .unwrap();
        assert_eq!(body["error"], "ValidationError");
        assert!(body["details"].as_str().unwrap().contains("cannot be empty"));
        assert!(body.get("remainingCalls").is_none());
    }
}
