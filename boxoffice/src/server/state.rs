//! Application state for the HTTP server.

use crate::ledger::BookingLedger;
use crate::reconciliation::CheckoutCoordinator;
use std::sync::Arc;

/// State shared by all handlers
///
/// Cloned per request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Checkout, verification and webhook entry points
    pub coordinator: Arc<CheckoutCoordinator>,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub const fn new(coordinator: Arc<CheckoutCoordinator>) -> Self {
        Self { coordinator }
    }

    /// The booking ledger behind the coordinator
    #[must_use]
    pub fn ledger(&self) -> &BookingLedger {
        self.coordinator.ledger()
    }
}
