//! Payment reconciliation.
//!
//! Two signals can complete a payment: the payer's browser coming back and
//! asking ([`CheckoutCoordinator::verify_order`]) and the gateway pushing a
//! webhook ([`CheckoutCoordinator::on_webhook`]). They arrive in any order, any
//! number of times. Both converge on the ledger's conditional `mark_paid`,
//! so whichever lands first confirms the booking and the rest are no-ops.
//!
//! Pending bookings that neither signal settles are reclaimed by the
//! [`sweeper::Sweeper`].

pub mod actions;
pub mod coordinator;
pub mod environment;
pub mod reducer;
pub mod sweeper;
pub mod types;
pub mod webhook;

pub use actions::CheckoutAction;
pub use coordinator::{CheckoutCoordinator, CheckoutResult, SweepReport, Verification};
pub use environment::CheckoutEnvironment;
pub use reducer::CheckoutReducer;
pub use sweeper::Sweeper;
pub use types::{CheckoutError, CheckoutPhase, CheckoutState, ReconcileSource, WebhookOutcome};
pub use webhook::{parse_notification, sign_payload, PaymentNotification, WebhookVerifier};

#[cfg(test)]
mod tests;
