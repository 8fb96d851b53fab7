//! Payment gateway client.
//!
//! The gateway contract is narrow: open an order with a hosted checkout
//! session, and ask what happened to an order. Amounts cross this boundary in
//! the currency's natural unit (rupees, not paise).

pub mod hosted;
pub mod mock;

pub use hosted::HostedCheckoutGateway;
pub use mock::MockPaymentGateway;

use crate::types::{BookingId, Currency, Money, OrderId, Requester};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by [`PaymentGateway`] methods
pub type GatewayFuture<T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send>>;

/// Gateway errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Credentials or endpoints are missing; an operator problem, not an outage
    #[error("payment gateway misconfigured: {0}")]
    Misconfigured(String),

    /// No answer within the configured timeout
    #[error("payment gateway timed out after {0}s")]
    Timeout(u64),

    /// Connection-level failure
    #[error("payment gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with an error status
    #[error("payment gateway rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Gateway's message
        message: String,
    },

    /// The gateway answered with something this client cannot use
    #[error("invalid payment gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// `true` when the order certainly does not exist on the gateway side.
    ///
    /// Only these errors allow a reservation to be rolled back. After a
    /// timeout, a dropped connection, a 5xx or a 429 the order may exist and
    /// may still be paid.
    #[must_use]
    pub const fn is_definite_failure(&self) -> bool {
        match self {
            Self::Misconfigured(_) | Self::InvalidResponse(_) => true,
            Self::Rejected { status, .. } => !is_outage_status(*status),
            Self::Timeout(_) | Self::Transport(_) => false,
        }
    }

    /// `true` for transient conditions worth retrying later
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Rejected { status, .. } => is_outage_status(*status),
            Self::Misconfigured(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Server-side errors and throttling say nothing about whether the request
/// took effect.
const fn is_outage_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Everything the gateway needs to open an order
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    /// Order identifier, derived from the booking
    pub order_id: OrderId,
    /// Booking behind the order
    pub booking_id: BookingId,
    /// Amount to charge
    pub amount: Money,
    /// Currency of `amount`
    pub currency: Currency,
    /// Payer contact details
    pub customer: Requester,
    /// Free-text order note
    pub note: String,
    /// Instant after which the gateway expires the order
    pub expires_at: Option<DateTime<Utc>>,
}

/// Customer placeholders for contact fields the requester did not provide
pub mod placeholders {
    /// Name used when the requester has none
    pub const NAME: &str = "Customer";
    /// Email used when the requester has none
    pub const EMAIL: &str = "customer@example.com";
    /// Phone used when the requester has none
    pub const PHONE: &str = "9999999999";
}

/// An opened checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    /// Order the session belongs to
    pub order_id: OrderId,
    /// Handle the payer's browser uses to open the hosted checkout
    pub payment_session_id: String,
}

/// What the gateway knows about an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrderStatus {
    /// The gateway has no such order
    NotFound,
    /// Open, not paid yet
    AwaitingPayment,
    /// Paid
    Paid {
        /// Gateway payment id, when the order response carries one
        #[serde(skip_serializing_if = "Option::is_none", rename = "paymentId")]
        payment_id: Option<String>,
    },
    /// Expired or terminated
    Failed {
        /// Gateway status text
        reason: String,
    },
}

impl OrderStatus {
    /// Map a gateway order status string
    ///
    /// Returns `None` for statuses this client does not know.
    #[must_use]
    pub fn from_gateway(status: &str, payment_id: Option<String>) -> Option<Self> {
        match status {
            "PAID" => Some(Self::Paid { payment_id }),
            "ACTIVE" => Some(Self::AwaitingPayment),
            "EXPIRED" | "TERMINATED" | "TERMINATION_REQUESTED" => Some(Self::Failed {
                reason: status.to_string(),
            }),
            _ => None,
        }
    }
}

/// Payment gateway trait
///
/// Implementations own their timeouts; neither call may block forever.
pub trait PaymentGateway: Send + Sync {
    /// Create the order and its checkout session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`]; see [`GatewayError::is_definite_failure`].
    fn create_session(&self, request: CheckoutRequest) -> GatewayFuture<PaymentSession>;

    /// Fetch the status of an order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the gateway cannot answer.
    fn order_status(&self, order_id: OrderId) -> GatewayFuture<OrderStatus>;
}
