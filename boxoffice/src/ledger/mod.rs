//! Booking ledger: capacity-safe reservations and booking transitions.
//!
//! The ledger is split in two layers:
//!
//! - [`LedgerStore`] is the persistence seam. Every method that changes state
//!   is a single atomic unit (one critical section in memory, one transaction
//!   or conditional `UPDATE` in Postgres). Concurrent callers are serialized
//!   here and nowhere else.
//! - [`BookingLedger`] is the service on top: it validates the request,
//!   consults the time-window policy and builds the booking record before
//!   handing it to the store.
//!
//! # Transitions
//!
//! ```text
//! reserve      -> pending/pending          (paid event, capacity held)
//! reserve      -> confirmed/paid           (free event, capacity held)
//! mark_paid    pending/pending -> confirmed/paid     Applied
//!              confirmed/paid  -> confirmed/paid     Unchanged
//!              cancelled/*     -> error              InvalidTransition
//! release      pending/pending -> cancelled/failed   Applied (capacity returned)
//!              anything else   -> unchanged          Unchanged
//! ```

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

use crate::schedule::{self, WindowReason};
use crate::types::{
    Booking, BookingId, BookingReference, BookingStatus, Event, EventId, OrderId, PaymentMethod,
    PaymentStatus, RequesterId,
};
use boxoffice_core::environment::Clock;
use chrono::{DateTime, FixedOffset, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Default upper bound on tickets per booking
pub const DEFAULT_MAX_TICKETS_PER_BOOKING: u32 = 10;

/// Ledger result
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Boxed future returned by [`LedgerStore`] methods
pub type LedgerFuture<T> = Pin<Box<dyn Future<Output = LedgerResult<T>> + Send>>;

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Event or booking does not exist (inactive events count as missing)
    #[error("{entity} {id} not found")]
    NotFound {
        /// What was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Time-window policy refused the booking
    #[error("{0}")]
    BookingClosed(WindowReason),

    /// Not enough seats left
    #[error("not enough tickets available: requested {requested}, remaining {remaining}")]
    CapacityExceeded {
        /// Tickets asked for
        requested: u32,
        /// Tickets still available
        remaining: u32,
    },

    /// Quantity outside `1..=max`
    #[error("ticket quantity {quantity} must be between 1 and {max}")]
    InvalidQuantity {
        /// Requested quantity
        quantity: u32,
        /// Configured maximum
        max: u32,
    },

    /// Price times quantity does not fit
    #[error("booking total overflows")]
    AmountOverflow,

    /// The booking is in a state the transition cannot start from
    #[error("booking {booking_id} cannot transition from {from}")]
    InvalidTransition {
        /// Booking that refused the transition
        booking_id: BookingId,
        /// Its current reservation state
        from: BookingStatus,
    },

    /// Backing store failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Shorthand for a missing event
    #[must_use]
    pub fn event_not_found(id: EventId) -> Self {
        Self::NotFound {
            entity: "event",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing booking
    #[must_use]
    pub fn booking_not_found(id: BookingId) -> Self {
        Self::NotFound {
            entity: "booking",
            id: id.to_string(),
        }
    }
}

/// Outcome of a conditional transition
///
/// `Unchanged` is how duplicate signals stay silent: the caller gets the
/// current record back and nothing was written.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The transition was applied; the booking after the write
    Applied(Booking),
    /// The booking was already past this transition; the current record
    Unchanged(Booking),
}

impl Transition {
    /// The booking after the call
    #[must_use]
    pub const fn booking(&self) -> &Booking {
        match self {
            Self::Applied(booking) | Self::Unchanged(booking) => booking,
        }
    }

    /// Consume into the booking
    #[must_use]
    pub fn into_booking(self) -> Booking {
        match self {
            Self::Applied(booking) | Self::Unchanged(booking) => booking,
        }
    }

    /// Whether this call performed the write
    #[must_use]
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Persistence seam for events and bookings
///
/// Implementations must make `reserve`, `mark_paid`, `attach_session` and
/// `release` atomic with respect to each other. No implementation may call
/// out to the payment gateway.
pub trait LedgerStore: Send + Sync {
    /// Load an event by id
    fn find_event(&self, id: EventId) -> LedgerFuture<Option<Event>>;

    /// Check capacity, increment `booked_count` by the booking's quantity and
    /// insert the booking, all in one atomic step.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event is missing or inactive, `CapacityExceeded` if
    /// the seats are not there.
    fn reserve(&self, booking: Booking) -> LedgerFuture<Booking>;

    /// Load a booking by id
    fn find_booking(&self, id: BookingId) -> LedgerFuture<Option<Booking>>;

    /// Load a booking by its gateway order id
    fn find_by_order(&self, order_id: OrderId) -> LedgerFuture<Option<Booking>>;

    /// All bookings of one requester, newest first
    fn list_for_requester(&self, requester_id: RequesterId) -> LedgerFuture<Vec<Booking>>;

    /// Record the checkout session id on a pending booking (set once)
    fn attach_session(
        &self,
        id: BookingId,
        session_id: String,
        at: DateTime<Utc>,
    ) -> LedgerFuture<Transition>;

    /// `pending/pending -> confirmed/paid`, conditional on the current state
    fn mark_paid(
        &self,
        id: BookingId,
        payment_id: Option<String>,
        at: DateTime<Utc>,
    ) -> LedgerFuture<Transition>;

    /// `pending/pending -> cancelled/failed` plus the `booked_count` decrement
    fn release(&self, id: BookingId, at: DateTime<Utc>) -> LedgerFuture<Transition>;

    /// Pending gateway bookings created before `created_before`, ordered by
    /// `(created_at, id)` and starting strictly after `after` when given
    fn stale_pending(
        &self,
        created_before: DateTime<Utc>,
        after: Option<SweepCursor>,
        limit: usize,
    ) -> LedgerFuture<Vec<Booking>>;

    /// Connectivity check for readiness
    fn ping(&self) -> LedgerFuture<()>;
}

/// Position in the oldest-first scan of stale pending bookings
///
/// Sweeps page with it so bookings that stay pending do not hide the ones
/// behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SweepCursor {
    /// Creation time of the last booking seen
    pub created_at: DateTime<Utc>,
    /// Its id, breaking ties between equal timestamps
    pub booking_id: BookingId,
}

impl SweepCursor {
    /// Cursor positioned on `booking`
    #[must_use]
    pub const fn after(booking: &Booking) -> Self {
        Self {
            created_at: booking.created_at,
            booking_id: booking.id,
        }
    }
}

/// A successful reservation together with the event it was made against
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    /// The stored booking
    pub booking: Booking,
    /// The event as it was read before the reservation
    pub event: Event,
}

/// Booking service over a [`LedgerStore`]
#[derive(Clone)]
pub struct BookingLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    venue_offset: FixedOffset,
    max_tickets: u32,
}

impl BookingLedger {
    /// Create a ledger with the default per-booking ticket limit
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, venue_offset: FixedOffset) -> Self {
        Self {
            store,
            clock,
            venue_offset,
            max_tickets: DEFAULT_MAX_TICKETS_PER_BOOKING,
        }
    }

    /// Override the per-booking ticket limit
    #[must_use]
    pub const fn with_max_tickets(mut self, max_tickets: u32) -> Self {
        self.max_tickets = max_tickets;
        self
    }

    /// Current instant according to the injected clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Offset used to resolve venue-local schedule fields
    #[must_use]
    pub const fn venue_offset(&self) -> FixedOffset {
        self.venue_offset
    }

    /// Reserve `quantity` tickets of `event_id` for `requester_id`.
    ///
    /// Zero-amount bookings come back `confirmed/paid` with no order id.
    /// Everything else comes back `pending/pending` with the order id derived
    /// from the booking id.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity`, `NotFound`, `BookingClosed`, `CapacityExceeded`,
    /// `AmountOverflow` or `Storage`.
    #[tracing::instrument(skip(self), fields(event_id = %event_id, requester_id = %requester_id))]
    pub async fn reserve(
        &self,
        event_id: EventId,
        requester_id: RequesterId,
        quantity: u32,
    ) -> LedgerResult<Reservation> {
        if quantity == 0 || quantity > self.max_tickets {
            return Err(LedgerError::InvalidQuantity {
                quantity,
                max: self.max_tickets,
            });
        }

        let event = self
            .store
            .find_event(event_id)
            .await?
            .filter(|event| event.is_active)
            .ok_or_else(|| LedgerError::event_not_found(event_id))?;

        let now = self.clock.now();
        let window = schedule::booking_window(&event, now, self.venue_offset);
        if !window.allowed {
            tracing::info!(reason = %window.reason, "Booking window closed");
            return Err(LedgerError::BookingClosed(window.reason));
        }

        if !event.has_room_for(quantity) {
            return Err(LedgerError::CapacityExceeded {
                requested: quantity,
                remaining: event.remaining_capacity().unwrap_or(0),
            });
        }

        let total_amount = event
            .price
            .checked_multiply(quantity)
            .ok_or(LedgerError::AmountOverflow)?;

        let id = BookingId::new();
        let free = total_amount.is_zero();
        let booking = Booking {
            id,
            reference: BookingReference::generate(now),
            event_id,
            requester_id,
            quantity,
            total_amount,
            currency: event.currency.clone(),
            status: if free { BookingStatus::Confirmed } else { BookingStatus::Pending },
            payment_status: if free { PaymentStatus::Paid } else { PaymentStatus::Pending },
            payment_method: if free { PaymentMethod::Free } else { PaymentMethod::HostedCheckout },
            order_id: if free { None } else { Some(OrderId::for_booking(&id)) },
            payment_session_id: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
        };

        let booking = self.store.reserve(booking).await?;

        tracing::info!(
            booking_id = %booking.id,
            reference = %booking.reference,
            quantity,
            total = %booking.total_amount,
            status = %booking.status,
            "Tickets reserved"
        );
        crate::metrics::record_booking(booking.status);

        Ok(Reservation { booking, event })
    }

    /// Move a pending booking to `confirmed/paid`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidTransition` if the booking was released, `Storage`.
    pub async fn mark_paid(
        &self,
        booking_id: BookingId,
        payment_id: Option<String>,
    ) -> LedgerResult<Transition> {
        self.store.mark_paid(booking_id, payment_id, self.clock.now()).await
    }

    /// Hand a pending booking's seats back and mark it `cancelled/failed`.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Storage`.
    pub async fn release(&self, booking_id: BookingId) -> LedgerResult<Transition> {
        self.store.release(booking_id, self.clock.now()).await
    }

    /// Record the checkout session for a pending booking.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidTransition` if the booking is no longer pending,
    /// `Storage`.
    pub async fn attach_session(
        &self,
        booking_id: BookingId,
        session_id: String,
    ) -> LedgerResult<Transition> {
        self.store
            .attach_session(booking_id, session_id, self.clock.now())
            .await
    }

    /// Load a booking.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Storage`.
    pub async fn booking(&self, booking_id: BookingId) -> LedgerResult<Booking> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| LedgerError::booking_not_found(booking_id))
    }

    /// Load the booking behind a gateway order, if any.
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn booking_by_order(&self, order_id: &OrderId) -> LedgerResult<Option<Booking>> {
        self.store.find_by_order(order_id.clone()).await
    }

    /// A requester's bookings, newest first.
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn bookings_for(&self, requester_id: RequesterId) -> LedgerResult<Vec<Booking>> {
        self.store.list_for_requester(requester_id).await
    }

    /// Load an event, active or not.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Storage`.
    pub async fn event(&self, event_id: EventId) -> LedgerResult<Event> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or_else(|| LedgerError::event_not_found(event_id))
    }

    /// One page of pending gateway bookings created before `cutoff`, oldest
    /// first, resuming after `after`.
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<SweepCursor>,
        limit: usize,
    ) -> LedgerResult<Vec<Booking>> {
        self.store.stale_pending(cutoff, after, limit).await
    }

    /// Check that the backing store answers.
    ///
    /// # Errors
    ///
    /// `Storage` if the store is unreachable.
    pub async fn ping(&self) -> LedgerResult<()> {
        self.store.ping().await
    }
}
