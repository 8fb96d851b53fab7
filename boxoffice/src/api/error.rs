//! HTTP error type.
//!
//! Bridges ledger, gateway and reconciliation errors to JSON responses of the
//! form `{"code": "...", "message": "..."}`.

use crate::gateway::GatewayError;
use crate::ledger::LedgerError;
use crate::reconciliation::CheckoutError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Application error returned by handlers
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code
    status: StatusCode,
    /// User-facing message
    message: String,
    /// Machine-readable code
    code: &'static str,
    /// Internal detail, logged but never sent
    detail: Option<String>,
}

impl ApiError {
    /// Create a new error
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            detail: None,
        }
    }

    /// Attach an internal detail for the log
    #[must_use]
    pub fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// 400 Bad Request
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 Unauthorized
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 403 Forbidden
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 404 Not Found
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} with id {id} not found"),
        )
    }

    /// 409 Conflict
    #[must_use]
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    /// 422 Unprocessable Entity
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// 500 Internal Server Error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// 503 Service Unavailable
    #[must_use]
    pub fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = self.code,
                message = %self.message,
                detail = ?self.detail,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::NotFound { entity, id } => Self::not_found(entity, id),
            LedgerError::BookingClosed(reason) => {
                Self::conflict("BOOKING_CLOSED", format!("Booking is closed: {reason}"))
            },
            LedgerError::CapacityExceeded { remaining, .. } => Self::conflict(
                "CAPACITY_EXCEEDED",
                format!("Only {remaining} ticket(s) remaining"),
            ),
            LedgerError::InvalidQuantity { .. } => Self::validation(err.to_string()),
            LedgerError::AmountOverflow => Self::validation(err.to_string()),
            LedgerError::InvalidTransition { .. } => {
                Self::conflict("INVALID_TRANSITION", err.to_string())
            },
            LedgerError::Storage(_) => Self::internal("Booking storage unavailable").with_detail(err),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Misconfigured(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "MISCONFIGURED_GATEWAY",
                "Payment gateway is not configured",
            )
            .with_detail(err),
            _ if err.is_unavailable() => {
                Self::unavailable("GATEWAY_UNAVAILABLE", "Payment gateway is unavailable")
                    .with_detail(err)
            },
            _ => Self::new(
                StatusCode::BAD_GATEWAY,
                "GATEWAY_ERROR",
                "Payment gateway refused the request",
            )
            .with_detail(err),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Ledger(e) => e.into(),
            CheckoutError::Gateway(e) => e.into(),
            CheckoutError::Forbidden(_) => Self::forbidden("Booking belongs to another requester"),
            CheckoutError::InvalidSignature => Self::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Webhook signature verification failed",
            ),
            CheckoutError::MalformedPayload(detail) => {
                Self::bad_request("Malformed webhook payload").with_detail(detail)
            },
            CheckoutError::Runtime(e) => {
                Self::unavailable("RECONCILIATION_TIMEOUT", "Payment reconciliation timed out")
                    .with_detail(e)
            },
            CheckoutError::Incomplete(phase) => {
                Self::internal("Payment reconciliation failed").with_detail(format!("{phase:?}"))
            },
        }
    }
}
