//! Booking endpoints.
//!
//! - `GET /api/bookings/my` - the requester's bookings, newest first
//! - `GET /api/bookings/:id/ticket` - ticket for a confirmed, paid booking

use super::error::ApiError;
use super::extractors::{ApiPath, AuthenticatedRequester};
use crate::schedule;
use crate::server::state::AppState;
use crate::types::{Booking, BookingId, Money};
use axum::{
    extract::State,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A requester's bookings
#[derive(Debug, Serialize)]
pub struct BookingList {
    /// Newest first
    pub bookings: Vec<Booking>,
}

/// Ticket for a confirmed booking
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    /// Booking snapshot
    pub booking: Booking,
    /// Event title
    pub event_title: String,
    /// Venue-local start date
    pub start_date: Option<NaiveDate>,
    /// Venue-local start time as stored
    pub start_time: Option<String>,
    /// Start instant, when the schedule parses
    pub starts_at: Option<DateTime<Utc>>,
    /// When sales close and gates shut
    pub gate_closes_at: Option<DateTime<Utc>>,
    /// Whether the event has ended
    pub event_is_past: bool,
    /// Price per ticket
    pub unit_price: Money,
}

/// List the requester's bookings.
///
/// # Errors
///
/// 500 if storage fails.
pub async fn my_bookings(
    State(state): State<AppState>,
    AuthenticatedRequester(requester): AuthenticatedRequester,
) -> Result<Json<BookingList>, ApiError> {
    let bookings = state.ledger().bookings_for(requester.id).await?;
    Ok(Json(BookingList { bookings }))
}

/// Show the ticket for a confirmed, paid booking.
///
/// # Errors
///
/// 404 unknown booking, 403 someone else's booking, 409 not confirmed.
pub async fn ticket(
    State(state): State<AppState>,
    AuthenticatedRequester(requester): AuthenticatedRequester,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ledger = state.ledger();
    let booking = ledger.booking(BookingId::from_uuid(id)).await?;

    if booking.requester_id != requester.id {
        return Err(ApiError::forbidden("Booking belongs to another requester"));
    }
    if !booking.is_confirmed_paid() {
        return Err(ApiError::conflict(
            "TICKET_UNAVAILABLE",
            format!(
                "Booking is {}/{}; tickets are issued once payment completes",
                booking.status, booking.payment_status
            ),
        ));
    }

    let event = ledger.event(booking.event_id).await?;
    let offset = ledger.venue_offset();

    Ok(Json(TicketResponse {
        event_title: event.title.clone(),
        start_date: event.start_date,
        start_time: event.start_time.clone(),
        starts_at: schedule::start_instant(&event, offset),
        gate_closes_at: schedule::gate_closing_time(&event, offset),
        event_is_past: schedule::is_event_past(&event, ledger.now(), offset),
        unit_price: event.price,
        booking,
    }))
}
