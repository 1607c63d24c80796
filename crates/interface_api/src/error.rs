//! API error handling
//!
//! Domain errors keep their meaning on the wire: a caller can tell "retry
//! is safe" (503) from "the user must choose" (409) from "forbidden" (403)
//! by status code alone.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::PortError;
use domain_bill::BillError;
use domain_session::SessionError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A version conflict; `details` carries the conflict and server snapshot
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        details: serde_json::Value,
    },

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Whether repeating the same request may succeed
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            ApiError::Gone(_) => (StatusCode::GONE, "deleted"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            ApiError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let retryable = matches!(self, ApiError::ServiceUnavailable(_));
        let message = match &self {
            ApiError::Conflict { message, .. } => message.clone(),
            ApiError::NotFound(m)
            | ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::Gone(m)
            | ApiError::Validation(m)
            | ApiError::ServiceUnavailable(m)
            | ApiError::Internal(m) => m.clone(),
        };
        let details = match self {
            ApiError::Conflict { details, .. } => Some(details),
            _ => None,
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            retryable,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillError> for ApiError {
    fn from(err: BillError) -> Self {
        let message = err.to_string();
        match err {
            BillError::Validation(_) => ApiError::Validation(message),
            BillError::Conflict(conflict) => ApiError::Conflict {
                message,
                details: serde_json::json!({
                    "conflict": conflict.conflict,
                    "server": conflict.server,
                }),
            },
            BillError::Authorization { .. } => ApiError::Forbidden(message),
            BillError::NotFound(_) | BillError::ConflictNotFound(_) => ApiError::NotFound(message),
            BillError::Deleted(_) => ApiError::Gone(message),
            BillError::ResolutionNotOffered { .. } | BillError::ManualPatchMissing => {
                ApiError::BadRequest(message)
            }
            BillError::Contention { .. } => ApiError::ServiceUnavailable(message),
            BillError::Storage(port) => port.into(),
        }
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        if err.is_transient() {
            ApiError::ServiceUnavailable(err.to_string())
        } else if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else {
            error!(error = %err, "Storage failure");
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Incomplete(reason) => ApiError::Validation(reason),
            other => {
                error!(error = %other, "Session storage failure");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{BillId, ParticipantId};
    use domain_bill::{BillAction, ValidationError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BillError::from(ValidationError::EmptyItems), StatusCode::UNPROCESSABLE_ENTITY),
            (
                BillError::Authorization {
                    bill_id: BillId::new(),
                    actor_id: ParticipantId::new(),
                    action: BillAction::Delete,
                },
                StatusCode::FORBIDDEN,
            ),
            (BillError::NotFound(BillId::new()), StatusCode::NOT_FOUND),
            (BillError::Deleted(BillId::new()), StatusCode::GONE),
            (
                BillError::Storage(PortError::ServiceUnavailable {
                    service: "postgres".to_string(),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                BillError::Storage(PortError::internal("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
