//! API Error Handling
//!
//! Maps wagering failures to HTTP status codes with a structured body and
//! the request id of the call that failed.

use crate::errors::{ErrorCategory, WageringError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code (INSUFFICIENT_FUNDS, SESSION_EXPIRED, ...)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    Wagering(WageringError),
    /// No caller identity from the authentication gateway
    Unauthorized(String),
    BadRequest(String),
    RateLimited { limit_per_second: u32 },
}

impl ApiError {
    pub fn wagering(request_id: String, error: WageringError) -> Self {
        Self {
            kind: ApiErrorKind::Wagering(error),
            request_id,
        }
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn rate_limited(request_id: String, limit_per_second: u32) -> Self {
        Self {
            kind: ApiErrorKind::RateLimited { limit_per_second },
            request_id,
        }
    }
}

/// HTTP status for a wagering failure
pub fn status_for(error: &WageringError) -> StatusCode {
    use WageringError::*;
    match error {
        InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        RoundNotFound(_) | SessionNotFound | AccountNotFound(_) | GameNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DuplicateRound(_)
        | RoundAlreadySettled(_)
        | RoundAlreadyRolledBack(_)
        | SessionExpired
        | SessionClosed => StatusCode::CONFLICT,
        StakeOutOfRange { .. }
        | AccountInactive(_)
        | SelfExcluded(_)
        | GameUnavailable(_)
        | ReportedWinsDisabled => StatusCode::UNPROCESSABLE_ENTITY,
        InvalidAmount { .. } | GameMismatch { .. } => StatusCode::BAD_REQUEST,
        _ => match error.category() {
            ErrorCategory::Security => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn details_for(error: &WageringError) -> Option<serde_json::Value> {
    match error {
        WageringError::InsufficientFunds { balance, required } => {
            Some(json!({ "balance": balance, "required": required }))
        }
        WageringError::StakeOutOfRange { stake, min, max } => {
            Some(json!({ "stake": stake, "min": min, "max": max }))
        }
        WageringError::InvalidWinAmount { claimed, allowed } => {
            Some(json!({ "claimed": claimed, "allowed": allowed }))
        }
        WageringError::GameMismatch {
            requested,
            session_game,
        } => Some(json!({ "requested": requested, "session_game": session_game })),
        _ => None,
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::Wagering(e) => write!(f, "[{}] {}: {}", self.request_id, e.code(), e),
            ApiErrorKind::Unauthorized(msg) => write!(f, "[{}] Unauthorized: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::RateLimited { limit_per_second } => write!(
                f,
                "[{}] Rate limited: {} requests per second",
                self.request_id, limit_per_second
            ),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self.kind {
            ApiErrorKind::Wagering(e) => {
                // Internal details stay in the log
                let message = match e.category() {
                    ErrorCategory::Internal | ErrorCategory::Consistency => {
                        tracing::error!(request_id = %self.request_id, error = %e, "request failed");
                        "internal error, the operation must be reconciled".to_string()
                    }
                    _ => e.to_string(),
                };
                (status_for(e), e.code(), message, details_for(e))
            }
            ApiErrorKind::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None)
            }
            ApiErrorKind::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            ApiErrorKind::RateLimited { limit_per_second } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "too many requests".to_string(),
                Some(json!({ "limit_per_second": limit_per_second })),
            ),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&WageringError::InsufficientFunds {
                balance: dec!(1),
                required: dec!(2)
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status_for(&WageringError::SessionNotOwned), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&WageringError::OriginMismatch), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&WageringError::InvalidWinAmount {
                claimed: dec!(2),
                allowed: dec!(1)
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&WageringError::DuplicateRound("r".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&WageringError::CommitFailed {
                operation: "win",
                round_id: "r".into(),
                reason: "disk".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
