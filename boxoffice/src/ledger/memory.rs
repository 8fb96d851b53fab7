//! In-memory ledger store for tests and local runs.

use super::{LedgerError, LedgerFuture, LedgerResult, LedgerStore, SweepCursor, Transition};
use crate::types::{
    Booking, BookingId, BookingStatus, Event, EventId, OrderId, PaymentMethod, PaymentStatus,
    RequesterId,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LedgerTables {
    events: HashMap<EventId, Event>,
    bookings: HashMap<BookingId, Booking>,
    orders: HashMap<OrderId, BookingId>,
}

/// Ledger store holding events and bookings behind one mutex
///
/// Each operation runs entirely inside one critical section, which is what
/// makes the capacity check-and-increment atomic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<Mutex<LedgerTables>>,
}

impl InMemoryLedgerStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an event
    pub fn insert_event(&self, event: Event) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.events.insert(event.id, event);
        }
    }

    /// Snapshot of an event
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<Event> {
        self.tables.lock().ok()?.events.get(&id).cloned()
    }

    /// Snapshot of a booking
    #[must_use]
    pub fn booking(&self, id: BookingId) -> Option<Booking> {
        self.tables.lock().ok()?.bookings.get(&id).cloned()
    }

    /// Snapshot of every booking
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        self.tables
            .lock()
            .map(|tables| tables.bookings.values().cloned().collect())
            .unwrap_or_default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut LedgerTables) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut tables: MutexGuard<'_, LedgerTables> = self
            .tables
            .lock()
            .map_err(|_| LedgerError::Storage("ledger lock poisoned".to_string()))?;
        f(&mut tables)
    }

    fn ready<T: Send + 'static>(result: LedgerResult<T>) -> LedgerFuture<T> {
        futures::future::ready(result).boxed()
    }
}

impl LedgerTables {
    fn booking_mut(&mut self, id: BookingId) -> LedgerResult<&mut Booking> {
        self.bookings
            .get_mut(&id)
            .ok_or_else(|| LedgerError::booking_not_found(id))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn find_event(&self, id: EventId) -> LedgerFuture<Option<Event>> {
        Self::ready(self.with_tables(|tables| Ok(tables.events.get(&id).cloned())))
    }

    fn reserve(&self, booking: Booking) -> LedgerFuture<Booking> {
        Self::ready(self.with_tables(|tables| {
            let event = tables
                .events
                .get_mut(&booking.event_id)
                .filter(|event| event.is_active)
                .ok_or_else(|| LedgerError::event_not_found(booking.event_id))?;

            if !event.has_room_for(booking.quantity) {
                return Err(LedgerError::CapacityExceeded {
                    requested: booking.quantity,
                    remaining: event.remaining_capacity().unwrap_or(0),
                });
            }
            event.booked_count += booking.quantity;

            if let Some(order_id) = &booking.order_id {
                tables.orders.insert(order_id.clone(), booking.id);
            }
            tables.bookings.insert(booking.id, booking.clone());
            Ok(booking)
        }))
    }

    fn find_booking(&self, id: BookingId) -> LedgerFuture<Option<Booking>> {
        Self::ready(self.with_tables(|tables| Ok(tables.bookings.get(&id).cloned())))
    }

    fn find_by_order(&self, order_id: OrderId) -> LedgerFuture<Option<Booking>> {
        Self::ready(self.with_tables(|tables| {
            Ok(tables
                .orders
                .get(&order_id)
                .and_then(|id| tables.bookings.get(id))
                .cloned())
        }))
    }

    fn list_for_requester(&self, requester_id: RequesterId) -> LedgerFuture<Vec<Booking>> {
        Self::ready(self.with_tables(|tables| {
            let mut bookings: Vec<Booking> = tables
                .bookings
                .values()
                .filter(|booking| booking.requester_id == requester_id)
                .cloned()
                .collect();
            bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(bookings)
        }))
    }

    fn attach_session(
        &self,
        id: BookingId,
        session_id: String,
        at: DateTime<Utc>,
    ) -> LedgerFuture<Transition> {
        Self::ready(self.with_tables(|tables| {
            let booking = tables.booking_mut(id)?;
            if !booking.is_pending() {
                return Err(LedgerError::InvalidTransition {
                    booking_id: id,
                    from: booking.status,
                });
            }
            if booking.payment_session_id.is_some() {
                return Ok(Transition::Unchanged(booking.clone()));
            }
            booking.payment_session_id = Some(session_id);
            booking.updated_at = at;
            Ok(Transition::Applied(booking.clone()))
        }))
    }

    fn mark_paid(
        &self,
        id: BookingId,
        payment_id: Option<String>,
        at: DateTime<Utc>,
    ) -> LedgerFuture<Transition> {
        Self::ready(self.with_tables(|tables| {
            let booking = tables.booking_mut(id)?;
            if booking.is_confirmed_paid() {
                return Ok(Transition::Unchanged(booking.clone()));
            }
            if !booking.is_pending() {
                return Err(LedgerError::InvalidTransition {
                    booking_id: id,
                    from: booking.status,
                });
            }
            booking.status = BookingStatus::Confirmed;
            booking.payment_status = PaymentStatus::Paid;
            if payment_id.is_some() {
                booking.payment_id = payment_id;
            }
            booking.updated_at = at;
            Ok(Transition::Applied(booking.clone()))
        }))
    }

    fn release(&self, id: BookingId, at: DateTime<Utc>) -> LedgerFuture<Transition> {
        Self::ready(self.with_tables(|tables| {
            let booking = tables.booking_mut(id)?;
            if !booking.is_pending() {
                return Ok(Transition::Unchanged(booking.clone()));
            }
            booking.status = BookingStatus::Cancelled;
            booking.payment_status = PaymentStatus::Failed;
            booking.updated_at = at;
            let released = booking.clone();

            if let Some(event) = tables.events.get_mut(&released.event_id) {
                event.booked_count = event.booked_count.saturating_sub(released.quantity);
            }
            Ok(Transition::Applied(released))
        }))
    }

    fn stale_pending(
        &self,
        created_before: DateTime<Utc>,
        after: Option<SweepCursor>,
        limit: usize,
    ) -> LedgerFuture<Vec<Booking>> {
        Self::ready(self.with_tables(|tables| {
            let mut stale: Vec<Booking> = tables
                .bookings
                .values()
                .filter(|booking| {
                    booking.is_pending()
                        && booking.payment_method == PaymentMethod::HostedCheckout
                        && booking.created_at < created_before
                        && after.is_none_or(|cursor| SweepCursor::after(booking) > cursor)
                })
                .cloned()
                .collect();
            stale.sort_by_key(SweepCursor::after);
            stale.truncate(limit);
            Ok(stale)
        }))
    }

    fn ping(&self) -> LedgerFuture<()> {
        Self::ready(self.with_tables(|_| Ok(())))
    }
}
