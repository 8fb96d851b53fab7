//! Commands and feedback events of the checkout reducer.

use super::types::{CheckoutError, ReconcileSource};
use super::webhook::PaymentNotification;
use crate::gateway::{GatewayError, OrderStatus, PaymentSession};
use crate::ledger::{Reservation, Transition};
use crate::types::{Booking, BookingId, EventId, Requester};

/// Actions for the checkout reducer
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutAction {
    // Commands
    /// Reserve tickets and open a hosted checkout for them
    OpenSession {
        /// Event to book
        event_id: EventId,
        /// Who is booking
        requester: Requester,
        /// Number of tickets
        quantity: u32,
    },

    /// Ask the gateway what happened to a booking's order
    Verify {
        /// Booking to verify
        booking_id: BookingId,
        /// Who asked
        source: ReconcileSource,
    },

    /// Apply an authenticated gateway notification
    ApplyNotification {
        /// Parsed payload
        notification: PaymentNotification,
    },

    /// Reclaim a pending booking past its time-to-live
    Expire {
        /// Booking to reclaim
        booking_id: BookingId,
    },

    // Events
    /// The ledger reserved the tickets
    Reserved {
        /// Booking and event
        reservation: Reservation,
    },

    /// The gateway opened an order with a checkout session
    SessionOpened {
        /// Pending booking the order belongs to
        booking: Booking,
        /// Opened session
        session: PaymentSession,
    },

    /// The session id was written to the booking
    SessionAttached {
        /// Booking after the write
        booking: Booking,
        /// Opened session
        session: PaymentSession,
    },

    /// The gateway could not open the order
    SessionFailed {
        /// Pending booking that was reserved for the order
        booking: Booking,
        /// What went wrong
        error: GatewayError,
    },

    /// The booking to verify was loaded
    Loaded {
        /// Current record
        booking: Booking,
        /// Who asked
        source: ReconcileSource,
    },

    /// The booking a notification refers to was looked up
    NotificationMatched {
        /// Booking carrying the notification's order id, if any
        booking: Option<Booking>,
        /// The notification
        notification: PaymentNotification,
    },

    /// The gateway reported an order status
    StatusFetched {
        /// Booking the order belongs to
        booking: Booking,
        /// Reported status
        status: OrderStatus,
        /// Who asked
        source: ReconcileSource,
    },

    /// `mark_paid` returned
    Confirmed {
        /// Applied, or unchanged for a duplicate signal
        transition: Transition,
        /// Who observed the payment
        source: ReconcileSource,
    },

    /// `release` returned
    Released {
        /// Applied, or unchanged if the booking had already left `pending`
        transition: Transition,
        /// Who triggered the release
        source: ReconcileSource,
    },

    /// A ledger or gateway call failed
    Failed {
        /// The error
        error: CheckoutError,
    },
}
