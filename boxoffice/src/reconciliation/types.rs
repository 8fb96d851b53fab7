//! State and error types for checkout reconciliation.

use crate::gateway::{GatewayError, OrderStatus, PaymentSession};
use crate::ledger::LedgerError;
use crate::types::{Booking, BookingId, Requester};
use boxoffice_runtime::StoreError;
use serde::Serialize;
use std::fmt;

/// Which path observed a payment signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileSource {
    /// Session creation rolling back its own reservation
    Checkout,
    /// Caller-initiated verification
    Poll,
    /// Gateway-initiated notification
    Webhook,
    /// Background reclamation of old pending bookings
    Sweep,
}

impl ReconcileSource {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Poll => "poll",
            Self::Webhook => "webhook",
            Self::Sweep => "sweep",
        }
    }
}

impl fmt::Display for ReconcileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a checkout request is in its feedback chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckoutPhase {
    /// Nothing sent yet
    #[default]
    Idle,
    /// Waiting for the ledger reservation
    Reserving,
    /// Waiting for the gateway to open the order
    OpeningSession,
    /// Recording the session on the booking
    AttachingSession,
    /// Releasing the reservation after a definite gateway failure
    RollingBack,
    /// Loading the booking to verify
    Loading,
    /// Waiting for the gateway order status
    Polling,
    /// Looking up the booking a notification refers to
    Matching,
    /// Applying `mark_paid`
    Confirming,
    /// Applying `release`
    Releasing,
    /// Feedback chain finished
    Done,
}

/// What a webhook delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Moved a pending booking to confirmed
    Confirmed,
    /// Success for a booking that was already confirmed
    Duplicate,
    /// No booking carries the order id
    UnknownOrder,
    /// The notification did not report success
    NotSuccess,
    /// Success for a booking that was already released
    Conflict,
}

impl WebhookOutcome {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Duplicate => "duplicate",
            Self::UnknownOrder => "unknown_order",
            Self::NotSuccess => "not_success",
            Self::Conflict => "conflict",
        }
    }
}

/// Errors surfaced by the reconciliation coordinator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckoutError {
    /// Ledger refused or failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Gateway refused or failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The booking belongs to another requester
    #[error("booking {0} belongs to another requester")]
    Forbidden(BookingId),

    /// Webhook signature missing or wrong
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// Webhook body is not a notification
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// The feedback chain did not settle in time
    #[error(transparent)]
    Runtime(#[from] StoreError),

    /// The feedback chain stopped without producing a result
    #[error("checkout stopped in phase {0:?} without a result")]
    Incomplete(CheckoutPhase),
}

/// Per-request checkout state
///
/// Each coordinator call builds a fresh store around a default state, so
/// nothing here is shared between requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutState {
    /// Current phase
    pub phase: CheckoutPhase,
    /// Path driving the chain, once known
    pub source: Option<ReconcileSource>,
    /// Who opened the checkout
    pub requester: Option<Requester>,
    /// Title of the booked event, for the order note
    pub event_title: Option<String>,
    /// Latest booking snapshot
    pub booking: Option<Booking>,
    /// Session opened for the booking
    pub session: Option<PaymentSession>,
    /// Last status the gateway reported
    pub gateway_status: Option<OrderStatus>,
    /// Result of a webhook delivery
    pub webhook_outcome: Option<WebhookOutcome>,
    /// First error of the chain
    pub error: Option<CheckoutError>,
}

impl CheckoutState {
    /// `true` once the feedback chain has nothing left to do
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == CheckoutPhase::Done
    }
}
