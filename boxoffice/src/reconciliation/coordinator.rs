//! Public entry points for checkout, verification and notifications.
//!
//! Each call builds a short-lived [`Store`] around a fresh [`CheckoutState`],
//! sends one command and waits for the feedback chain to settle. Nothing is
//! shared between calls except the ledger, whose conditional transitions are
//! the only synchronization points between the poll and webhook paths.

use super::actions::CheckoutAction;
use super::environment::CheckoutEnvironment;
use super::reducer::CheckoutReducer;
use super::types::{CheckoutError, CheckoutState, ReconcileSource, WebhookOutcome};
use super::webhook::{parse_notification, WebhookVerifier};
use crate::gateway::{OrderStatus, PaymentSession};
use crate::ledger::{BookingLedger, LedgerError, SweepCursor};
use crate::metrics::record_webhook;
use crate::types::{Booking, BookingId, EventId, OrderId, PaymentMethod, Requester, RequesterId};
use boxoffice_runtime::Store;
use serde::Serialize;
use std::time::Duration;

/// Default bound on one feedback chain
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of [`CheckoutCoordinator::open_session`]
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutResult {
    /// Zero-amount booking, confirmed without the gateway
    Free {
        /// Confirmed booking
        booking: Booking,
    },
    /// Pending booking with an open hosted checkout
    Session {
        /// Pending booking
        booking: Booking,
        /// Session the payer completes
        session: PaymentSession,
    },
}

impl CheckoutResult {
    /// The booking either way
    #[must_use]
    pub const fn booking(&self) -> &Booking {
        match self {
            Self::Free { booking } | Self::Session { booking, .. } => booking,
        }
    }
}

/// Outcome of a verification
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    /// Booking after reconciliation
    pub booking: Booking,
    /// What the gateway reported, if it was asked
    pub gateway_status: Option<OrderStatus>,
}

/// Summary of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Pending bookings past the time-to-live
    pub examined: usize,
    /// Found paid and confirmed
    pub confirmed: usize,
    /// Released back to capacity
    pub released: usize,
    /// Still awaiting payment at the gateway
    pub left_pending: usize,
    /// Could not be reconciled this round
    pub errors: usize,
}

/// Reconciliation coordinator
#[derive(Clone)]
pub struct CheckoutCoordinator {
    env: CheckoutEnvironment,
    verifier: WebhookVerifier,
    settle_timeout: Duration,
}

impl CheckoutCoordinator {
    /// Create a coordinator
    #[must_use]
    pub fn new(env: CheckoutEnvironment, verifier: WebhookVerifier) -> Self {
        if !verifier.is_enforcing() {
            tracing::warn!("Webhook signatures will not be verified");
        }
        Self {
            env,
            verifier,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    /// Override the bound on one feedback chain
    #[must_use]
    pub const fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// The ledger this coordinator drives
    #[must_use]
    pub const fn ledger(&self) -> &BookingLedger {
        &self.env.ledger
    }

    async fn run(&self, action: CheckoutAction) -> Result<CheckoutState, CheckoutError> {
        let store = Store::new(CheckoutState::default(), CheckoutReducer::new(), self.env.clone());
        store.send_and_settle(action, self.settle_timeout).await?;
        Ok(store.state(|state| state.clone()).await)
    }

    /// Reserve tickets and open a hosted checkout.
    ///
    /// Zero-amount bookings are confirmed without contacting the gateway. A
    /// definite gateway refusal releases the reservation before the error is
    /// returned; a timeout leaves the booking pending for the poll, webhook
    /// and sweep paths to settle.
    ///
    /// # Errors
    ///
    /// Ledger refusals, gateway failures, or [`CheckoutError::Runtime`].
    #[tracing::instrument(skip(self, requester), fields(requester_id = %requester.id))]
    pub async fn open_session(
        &self,
        event_id: EventId,
        requester: Requester,
        quantity: u32,
    ) -> Result<CheckoutResult, CheckoutError> {
        let state = self
            .run(CheckoutAction::OpenSession {
                event_id,
                requester,
                quantity,
            })
            .await?;

        if let Some(error) = state.error {
            return Err(error);
        }

        match (state.booking, state.session) {
            (Some(booking), _) if booking.payment_method == PaymentMethod::Free => {
                Ok(CheckoutResult::Free { booking })
            },
            (Some(booking), Some(session)) => Ok(CheckoutResult::Session { booking, session }),
            _ => Err(CheckoutError::Incomplete(state.phase)),
        }
    }

    /// Ask the gateway about a booking and apply the answer.
    ///
    /// Settled bookings are returned as they are, without a gateway call.
    ///
    /// # Errors
    ///
    /// `NotFound`, gateway failures, `InvalidTransition` for a payment on a
    /// released booking, or [`CheckoutError::Runtime`].
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id, source = %source))]
    pub async fn verify(
        &self,
        booking_id: BookingId,
        source: ReconcileSource,
    ) -> Result<Verification, CheckoutError> {
        let state = self.run(CheckoutAction::Verify { booking_id, source }).await?;

        if let Some(error) = state.error {
            return Err(error);
        }

        let booking = state.booking.ok_or(CheckoutError::Incomplete(state.phase))?;
        Ok(Verification {
            booking,
            gateway_status: state.gateway_status,
        })
    }

    /// Verify the booking behind `order_id` on behalf of `requester_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown order, [`CheckoutError::Forbidden`] for
    /// another requester's booking, then as [`Self::verify`].
    pub async fn verify_order(
        &self,
        order_id: &OrderId,
        requester_id: RequesterId,
    ) -> Result<Verification, CheckoutError> {
        let booking = self
            .env
            .ledger
            .booking_by_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "order",
                id: order_id.to_string(),
            })?;

        if booking.requester_id != requester_id {
            tracing::warn!(
                booking_id = %booking.id,
                requester_id = %requester_id,
                "Verification for another requester's booking refused"
            );
            return Err(CheckoutError::Forbidden(booking.id));
        }

        self.verify(booking.id, ReconcileSource::Poll).await
    }

    /// Authenticate and apply a gateway webhook.
    ///
    /// Every syntactically valid, authentic payload is acknowledged, including
    /// ones for unknown orders and success reports for released bookings.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::InvalidSignature`], [`CheckoutError::MalformedPayload`],
    /// or a ledger failure.
    pub async fn on_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, CheckoutError> {
        if let Err(error) = self.verifier.verify(body, signature) {
            record_webhook("invalid_signature");
            return Err(error);
        }

        let notification = match parse_notification(body) {
            Ok(notification) => notification,
            Err(error) => {
                tracing::warn!(error = %error, "Webhook payload rejected");
                record_webhook("malformed");
                return Err(error);
            },
        };

        tracing::info!(
            order_id = %notification.order_id,
            order_status = ?notification.order_status,
            payment_status = ?notification.payment_status,
            "Webhook received"
        );

        let state = self
            .run(CheckoutAction::ApplyNotification { notification })
            .await?;

        match (state.webhook_outcome, state.error) {
            (Some(outcome), _) => {
                record_webhook(outcome.as_str());
                Ok(outcome)
            },
            (None, Some(error)) => {
                record_webhook("error");
                Err(error)
            },
            (None, None) => Err(CheckoutError::Incomplete(state.phase)),
        }
    }

    /// Reconcile pending bookings older than `ttl`.
    ///
    /// Each one is polled with source `Sweep`: paid orders are confirmed,
    /// failed or unknown orders are released, open orders are left alone.
    /// Gateway failures leave the booking untouched. Bookings are read
    /// `page_size` at a time behind a cursor, so one run visits every stale
    /// booking even when the oldest ones stay pending.
    ///
    /// # Errors
    ///
    /// Only if the stale bookings cannot be listed.
    pub async fn sweep_expired(
        &self,
        ttl: chrono::Duration,
        page_size: usize,
    ) -> Result<SweepReport, CheckoutError> {
        let cutoff = self.env.ledger.now() - ttl;
        let page_size = page_size.max(1);
        let mut report = SweepReport::default();
        let mut cursor = None;

        loop {
            let page = self.env.ledger.stale_pending(cutoff, cursor, page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(SweepCursor::after(last));
            let exhausted = page.len() < page_size;
            report.examined += page.len();

            for booking in page {
                self.expire(booking.id, &mut report).await;
            }

            if exhausted {
                break;
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                confirmed = report.confirmed,
                released = report.released,
                left_pending = report.left_pending,
                errors = report.errors,
                "Pending booking sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire(&self, booking_id: BookingId, report: &mut SweepReport) {
        let state = match self.run(CheckoutAction::Expire { booking_id }).await {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(booking_id = %booking_id, error = %error, "Sweep step timed out");
                report.errors += 1;
                return;
            },
        };

        match (&state.error, &state.booking) {
            (Some(error), _) => {
                tracing::warn!(booking_id = %booking_id, error = %error, "Sweep left booking untouched");
                report.errors += 1;
            },
            (None, Some(current)) if current.is_confirmed_paid() => report.confirmed += 1,
            (None, Some(current)) if current.is_released() => report.released += 1,
            _ => report.left_pending += 1,
        }
    }
}
