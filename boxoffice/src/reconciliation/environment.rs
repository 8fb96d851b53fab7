//! Dependencies injected into the checkout reducer.

use crate::gateway::PaymentGateway;
use crate::ledger::BookingLedger;
use boxoffice_core::environment::Clock;
use std::sync::Arc;

/// Environment for the checkout reducer
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Clock for order expiry
    pub clock: Arc<dyn Clock>,
    /// Booking ledger
    pub ledger: BookingLedger,
    /// Payment gateway
    pub gateway: Arc<dyn PaymentGateway>,
    /// How long a pending booking holds its seats
    pub pending_ttl: chrono::Duration,
}

impl CheckoutEnvironment {
    /// Creates a new `CheckoutEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ledger: BookingLedger,
        gateway: Arc<dyn PaymentGateway>,
        pending_ttl: chrono::Duration,
    ) -> Self {
        Self {
            clock,
            ledger,
            gateway,
            pending_ttl,
        }
    }
}
