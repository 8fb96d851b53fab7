//! Payment endpoints.
//!
//! - `POST /api/payments/create-session` - reserve tickets and open a checkout (requires requester)
//! - `GET /api/payments/verify/:order_id` - reconcile after the payer returns (requires requester)
//! - `POST /api/payments/webhook` - gateway notifications (signature authenticated)

use super::error::ApiError;
use super::extractors::{ApiJson, ApiPath, AuthenticatedRequester, WebhookSignature};
use crate::gateway::OrderStatus;
use crate::reconciliation::{CheckoutResult, WebhookOutcome};
use crate::server::state::AppState;
use crate::types::{Booking, BookingId, BookingReference, Currency, EventId, OrderId};
use axum::{
    body::Bytes,
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to open a checkout
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Event to book
    pub event_id: Uuid,
    /// Number of tickets
    #[serde(alias = "quantity")]
    pub tickets: u32,
}

/// Checkout opened at the gateway
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Pending booking
    pub booking_id: BookingId,
    /// Shareable reference
    pub booking_reference: BookingReference,
    /// Gateway order
    pub order_id: OrderId,
    /// Handle for the hosted checkout
    pub payment_session_id: String,
    /// Total in major units
    pub amount: f64,
    /// Currency of `amount`
    pub currency: Currency,
}

/// Zero-amount booking, already confirmed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBookingResponse {
    /// Confirmed booking
    pub booking_id: BookingId,
    /// Shareable reference
    pub booking_reference: BookingReference,
    /// Always `true`
    pub is_free: bool,
    /// Booking snapshot
    pub booking: Booking,
}

/// Response of `create-session`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreateSessionResponse {
    /// Paid booking
    Session(SessionResponse),
    /// Free booking
    Free(FreeBookingResponse),
}

impl From<CheckoutResult> for CreateSessionResponse {
    fn from(result: CheckoutResult) -> Self {
        match result {
            CheckoutResult::Free { booking } => Self::Free(FreeBookingResponse {
                booking_id: booking.id,
                booking_reference: booking.reference.clone(),
                is_free: true,
                booking,
            }),
            CheckoutResult::Session { booking, session } => Self::Session(SessionResponse {
                booking_id: booking.id,
                booking_reference: booking.reference,
                order_id: session.order_id,
                payment_session_id: session.payment_session_id,
                amount: booking.total_amount.as_major_units(),
                currency: booking.currency,
            }),
        }
    }
}

/// Result of a verification
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// `true` once the booking is confirmed and paid
    pub paid: bool,
    /// Booking snapshot
    pub booking: Booking,
    /// What the gateway reported, if it was asked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<OrderStatus>,
}

/// Acknowledgement sent to the gateway
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// Always `true`
    pub success: bool,
    /// What the delivery did
    pub outcome: WebhookOutcome,
}

// ============================================================================
// Handlers
// ============================================================================

/// Reserve tickets and open a hosted checkout.
///
/// # Errors
///
/// 404 unknown event, 409 booking closed or sold out, 422 bad quantity,
/// 500/502/503 for gateway problems.
pub async fn create_session(
    State(state): State<AppState>,
    AuthenticatedRequester(requester): AuthenticatedRequester,
    ApiJson(request): ApiJson<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    tracing::info!(
        requester_id = %requester.id,
        event_id = %request.event_id,
        tickets = request.tickets,
        "Checkout requested"
    );

    let result = state
        .coordinator
        .open_session(EventId::from_uuid(request.event_id), requester, request.tickets)
        .await?;

    Ok(Json(result.into()))
}

/// Reconcile the booking behind `order_id` with the gateway.
///
/// # Errors
///
/// 404 unknown order, 403 someone else's booking, 503 gateway unavailable.
pub async fn verify_payment(
    State(state): State<AppState>,
    AuthenticatedRequester(requester): AuthenticatedRequester,
    ApiPath(order_id): ApiPath<String>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let verification = state
        .coordinator
        .verify_order(&OrderId::new(order_id), requester.id)
        .await?;

    Ok(Json(VerifyResponse {
        paid: verification.booking.is_confirmed_paid(),
        booking: verification.booking,
        gateway_status: verification.gateway_status,
    }))
}

/// Gateway notification endpoint.
///
/// Acknowledges every authentic, well-formed delivery with 200 so the gateway
/// stops retrying, whether or not it changed anything.
///
/// # Errors
///
/// 401 bad signature, 400 malformed payload, 500 storage failure.
pub async fn webhook(
    State(state): State<AppState>,
    WebhookSignature(signature): WebhookSignature,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let outcome = state
        .coordinator
        .on_webhook(&body, signature.as_deref())
        .await?;

    Ok(Json(WebhookAck {
        success: true,
        outcome,
    }))
}
