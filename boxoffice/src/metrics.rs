//! Business metrics for the booking core.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_bookings_total{status}` - Bookings entering a reservation state
//! - `boxoffice_payments_total{status,source}` - Payment outcomes by the path that observed them
//! - `boxoffice_webhooks_total{outcome}` - Webhook deliveries by outcome
//! - `boxoffice_pending_bookings_released_total` - Pending bookings whose seats were handed back
//!
//! ## Histograms
//! - `boxoffice_gateway_call_duration_seconds{operation}` - Payment gateway round trips

use crate::types::BookingStatus;
use metrics::{describe_counter, describe_histogram};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_bookings_total",
        "Bookings entering a reservation state (pending, confirmed, cancelled)"
    );
    describe_counter!(
        "boxoffice_payments_total",
        "Payment outcomes (paid, failed, duplicate) by observing path (poll, webhook, sweep)"
    );
    describe_counter!(
        "boxoffice_webhooks_total",
        "Gateway webhook deliveries by outcome"
    );
    describe_counter!(
        "boxoffice_pending_bookings_released_total",
        "Pending bookings released, returning their seats to the event"
    );
    describe_histogram!(
        "boxoffice_gateway_call_duration_seconds",
        "Time spent waiting on the payment gateway"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a booking reaching `status`.
pub fn record_booking(status: BookingStatus) {
    metrics::counter!("boxoffice_bookings_total", "status" => status.as_str()).increment(1);
    tracing::debug!(status = %status, "Recorded booking metric");
}

/// Record a payment outcome.
///
/// # Arguments
///
/// * `status` - `paid`, `failed` or `duplicate`
/// * `source` - the path that observed it
pub fn record_payment(status: &'static str, source: &'static str) {
    metrics::counter!("boxoffice_payments_total", "status" => status, "source" => source)
        .increment(1);
    tracing::debug!(status, source, "Recorded payment metric");
}

/// Record one webhook delivery.
pub fn record_webhook(outcome: &'static str) {
    metrics::counter!("boxoffice_webhooks_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded webhook metric");
}

/// Record a released pending booking.
pub fn record_pending_released() {
    metrics::counter!("boxoffice_pending_bookings_released_total").increment(1);
    tracing::debug!("Recorded pending_released metric");
}

/// Record a gateway round trip.
///
/// # Arguments
///
/// * `operation` - `create_order`, `create_session` or `order_status`
/// * `duration_secs` - wall time of the call, including timeouts
pub fn record_gateway_call(operation: &'static str, duration_secs: f64) {
    metrics::histogram!("boxoffice_gateway_call_duration_seconds", "operation" => operation)
        .record(duration_secs);
    tracing::debug!(operation, duration_secs, "Recorded gateway_call metric");
}
