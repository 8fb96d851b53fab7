//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{bookings, events, payments};
use axum::{
    http::{HeaderName, Request},
    routing::{get, post},
    Router,
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the complete router.
///
/// - `GET /health`, `GET /ready`
/// - `POST /api/payments/create-session`
/// - `GET /api/payments/verify/:order_id`
/// - `POST /api/payments/webhook` (authenticated by signature, not requester)
/// - `GET /api/bookings/my`
/// - `GET /api/bookings/:id/ticket`
/// - `GET /api/events/:id/booking-window`
pub fn build_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let api_routes = Router::new()
        // Payments
        .route("/payments/create-session", post(payments::create_session))
        .route("/payments/verify/:order_id", get(payments::verify_payment))
        .route("/payments/webhook", post(payments::webhook))
        // Bookings
        .route("/bookings/my", get(bookings::my_bookings))
        .route("/bookings/:id/ticket", get(bookings::ticket))
        // Events
        .route("/events/:id/booking-window", get(events::booking_window));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}
