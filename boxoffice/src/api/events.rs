//! Event endpoints.
//!
//! - `GET /api/events/:id/booking-window` - whether tickets can be sold right now

use super::error::ApiError;
use super::extractors::ApiPath;
use crate::schedule::{self, WindowReason};
use crate::server::state::AppState;
use crate::types::EventId;
use axum::{
    extract::State,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Booking window for an event
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWindowResponse {
    /// Event identifier
    pub event_id: EventId,
    /// Whether tickets may be sold now
    pub allowed: bool,
    /// Why
    pub reason: WindowReason,
    /// Tickets left, `None` when capacity is unlimited
    pub remaining_capacity: Option<u32>,
    /// When sales close
    pub closes_at: Option<DateTime<Utc>>,
    /// Whether the event has ended
    pub is_past: bool,
}

/// Report the booking window of an event.
///
/// Inactive events report closed.
///
/// # Errors
///
/// 404 unknown event.
pub async fn booking_window(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<BookingWindowResponse>, ApiError> {
    let ledger = state.ledger();
    let event = ledger.event(EventId::from_uuid(id)).await?;
    let now = ledger.now();
    let offset = ledger.venue_offset();

    let window = schedule::booking_window(&event, now, offset);
    let allowed = window.allowed && event.is_active;
    let reason = if event.is_active { window.reason } else { WindowReason::Closed };

    Ok(Json(BookingWindowResponse {
        event_id: event.id,
        allowed,
        reason,
        remaining_capacity: event.remaining_capacity(),
        closes_at: schedule::gate_closing_time(&event, offset),
        is_past: schedule::is_event_past(&event, now, offset),
    }))
}
