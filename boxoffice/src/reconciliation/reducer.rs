//! Checkout reducer.
//!
//! Every ledger and gateway call is an effect; the reducer itself only moves
//! the phase along and decides which call comes next:
//!
//! ```text
//! OpenSession ─► Reserved ─┬─ free ───────────────────────────────► Done
//!                          └─ paid ─► SessionOpened ─► SessionAttached ─► Done
//!                                  └► SessionFailed ─┬─ definite ─► Released ─► Done
//!                                                    └─ unknown ──────────────► Done
//!
//! Verify / Expire ─► Loaded ─► StatusFetched ─┬─ paid ─► Confirmed ─► Done
//!                                             ├─ failed ─► Released ─► Done
//!                                             └─ awaiting ───────────► Done
//!
//! ApplyNotification ─► NotificationMatched ─┬─ success ─► Confirmed ─► Done
//!                                           └─ otherwise ─────────────► Done
//! ```

use super::actions::CheckoutAction;
use super::environment::CheckoutEnvironment;
use super::types::{CheckoutError, CheckoutPhase, CheckoutState, ReconcileSource, WebhookOutcome};
use super::webhook::PaymentNotification;
use crate::gateway::{CheckoutRequest, OrderStatus, PaymentSession};
use crate::ledger::{LedgerError, Reservation, Transition};
use crate::metrics::{record_booking, record_payment, record_pending_released};
use crate::types::{Booking, BookingId, BookingStatus, OrderId, Requester};
use boxoffice_core::{async_effect, effect::Effect, reducer::Reducer, smallvec, SmallVec};

type Effects = SmallVec<[Effect<CheckoutAction>; 4]>;

/// Reducer for one checkout, verification or notification
#[derive(Clone, Debug, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new `CheckoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn finish(state: &mut CheckoutState) -> Effects {
        state.phase = CheckoutPhase::Done;
        SmallVec::new()
    }

    fn load(
        state: &mut CheckoutState,
        booking_id: BookingId,
        source: ReconcileSource,
        env: &CheckoutEnvironment,
    ) -> Effects {
        state.phase = CheckoutPhase::Loading;
        state.source = Some(source);

        let ledger = env.ledger.clone();
        smallvec![async_effect! {
            match ledger.booking(booking_id).await {
                Ok(booking) => Some(CheckoutAction::Loaded { booking, source }),
                Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
            }
        }]
    }

    fn confirm(
        state: &mut CheckoutState,
        booking_id: BookingId,
        payment_id: Option<String>,
        source: ReconcileSource,
        env: &CheckoutEnvironment,
    ) -> Effects {
        state.phase = CheckoutPhase::Confirming;

        let ledger = env.ledger.clone();
        smallvec![async_effect! {
            match ledger.mark_paid(booking_id, payment_id).await {
                Ok(transition) => Some(CheckoutAction::Confirmed { transition, source }),
                Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
            }
        }]
    }

    fn release(
        state: &mut CheckoutState,
        phase: CheckoutPhase,
        booking_id: BookingId,
        source: ReconcileSource,
        env: &CheckoutEnvironment,
    ) -> Effects {
        state.phase = phase;

        let ledger = env.ledger.clone();
        smallvec![async_effect! {
            match ledger.release(booking_id).await {
                Ok(transition) => Some(CheckoutAction::Released { transition, source }),
                Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
            }
        }]
    }

    fn on_reserved(
        state: &mut CheckoutState,
        reservation: Reservation,
        env: &CheckoutEnvironment,
    ) -> Effects {
        let Reservation { booking, event } = reservation;
        state.event_title = Some(event.title.clone());
        state.booking = Some(booking.clone());

        if !booking.is_pending() {
            tracing::info!(booking_id = %booking.id, "Free booking confirmed without gateway");
            return Self::finish(state);
        }

        state.phase = CheckoutPhase::OpeningSession;

        let request = CheckoutRequest {
            order_id: booking
                .order_id
                .clone()
                .unwrap_or_else(|| OrderId::for_booking(&booking.id)),
            booking_id: booking.id,
            amount: booking.total_amount,
            currency: booking.currency.clone(),
            customer: state
                .requester
                .clone()
                .unwrap_or_else(|| Requester::anonymous(booking.requester_id)),
            note: format!("Booking for {} - {} ticket(s)", event.title, booking.quantity),
            expires_at: Some(env.clock.now() + env.pending_ttl),
        };

        let gateway = env.gateway.clone();
        smallvec![async_effect! {
            match gateway.create_session(request).await {
                Ok(session) => Some(CheckoutAction::SessionOpened { booking, session }),
                Err(error) => Some(CheckoutAction::SessionFailed { booking, error }),
            }
        }]
    }

    fn on_session_opened(
        state: &mut CheckoutState,
        booking: &Booking,
        session: PaymentSession,
        env: &CheckoutEnvironment,
    ) -> Effects {
        tracing::info!(
            booking_id = %booking.id,
            order_id = %session.order_id,
            "Checkout session opened"
        );
        state.phase = CheckoutPhase::AttachingSession;
        state.session = Some(session.clone());

        let ledger = env.ledger.clone();
        let booking_id = booking.id;
        smallvec![async_effect! {
            match ledger
                .attach_session(booking_id, session.payment_session_id.clone())
                .await
            {
                Ok(transition) => Some(CheckoutAction::SessionAttached {
                    booking: transition.into_booking(),
                    session,
                }),
                Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
            }
        }]
    }

    fn on_loaded(
        state: &mut CheckoutState,
        booking: Booking,
        source: ReconcileSource,
        env: &CheckoutEnvironment,
    ) -> Effects {
        state.booking = Some(booking.clone());

        if !booking.is_pending() {
            tracing::debug!(
                booking_id = %booking.id,
                status = %booking.status,
                source = %source,
                "Booking already settled"
            );
            return Self::finish(state);
        }

        let Some(order_id) = booking.order_id.clone() else {
            tracing::warn!(booking_id = %booking.id, "Pending booking has no gateway order");
            return Self::finish(state);
        };

        state.phase = CheckoutPhase::Polling;

        let gateway = env.gateway.clone();
        smallvec![async_effect! {
            match gateway.order_status(order_id).await {
                Ok(status) => Some(CheckoutAction::StatusFetched { booking, status, source }),
                Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
            }
        }]
    }

    fn on_status(
        state: &mut CheckoutState,
        booking: &Booking,
        status: OrderStatus,
        source: ReconcileSource,
        env: &CheckoutEnvironment,
    ) -> Effects {
        state.gateway_status = Some(status.clone());

        match status {
            OrderStatus::Paid { payment_id } => {
                Self::confirm(state, booking.id, payment_id, source, env)
            },
            OrderStatus::Failed { reason } => {
                tracing::info!(
                    booking_id = %booking.id,
                    reason = %reason,
                    source = %source,
                    "Gateway reports order failed"
                );
                Self::release(state, CheckoutPhase::Releasing, booking.id, source, env)
            },
            OrderStatus::NotFound if source == ReconcileSource::Sweep => {
                tracing::info!(booking_id = %booking.id, "Expired booking unknown to gateway");
                Self::release(state, CheckoutPhase::Releasing, booking.id, source, env)
            },
            OrderStatus::NotFound => {
                tracing::warn!(
                    booking_id = %booking.id,
                    source = %source,
                    "Gateway has no order for pending booking"
                );
                Self::finish(state)
            },
            OrderStatus::AwaitingPayment => {
                tracing::debug!(booking_id = %booking.id, source = %source, "Payment still awaited");
                Self::finish(state)
            },
        }
    }

    fn on_notification(
        state: &mut CheckoutState,
        booking: Option<Booking>,
        notification: PaymentNotification,
        env: &CheckoutEnvironment,
    ) -> Effects {
        let Some(booking) = booking else {
            tracing::warn!(
                order_id = %notification.order_id,
                "Webhook for unknown order acknowledged"
            );
            state.webhook_outcome = Some(WebhookOutcome::UnknownOrder);
            return Self::finish(state);
        };
        state.booking = Some(booking.clone());

        if notification.is_success() {
            return Self::confirm(
                state,
                booking.id,
                notification.payment_id,
                ReconcileSource::Webhook,
                env,
            );
        }

        state.webhook_outcome = Some(WebhookOutcome::NotSuccess);
        if booking.is_confirmed_paid() {
            tracing::warn!(
                booking_id = %booking.id,
                order_status = ?notification.order_status,
                payment_status = ?notification.payment_status,
                "Failure report for confirmed booking ignored"
            );
        } else {
            tracing::info!(
                booking_id = %booking.id,
                order_status = ?notification.order_status,
                payment_status = ?notification.payment_status,
                "Non-success webhook recorded"
            );
        }
        Self::finish(state)
    }

    fn on_confirmed(state: &mut CheckoutState, transition: Transition, source: ReconcileSource) -> Effects {
        let applied = transition.was_applied();
        let booking = transition.into_booking();

        if applied {
            tracing::info!(
                booking_id = %booking.id,
                order_id = ?booking.order_id,
                source = %source,
                "Booking confirmed"
            );
            record_payment("paid", source.as_str());
            record_booking(BookingStatus::Confirmed);
        } else {
            tracing::debug!(booking_id = %booking.id, source = %source, "Duplicate payment signal");
            record_payment("duplicate", source.as_str());
        }

        if source == ReconcileSource::Webhook {
            state.webhook_outcome = Some(if applied {
                WebhookOutcome::Confirmed
            } else {
                WebhookOutcome::Duplicate
            });
        }
        state.booking = Some(booking);
        Self::finish(state)
    }

    fn on_released(state: &mut CheckoutState, transition: Transition, source: ReconcileSource) -> Effects {
        let applied = transition.was_applied();
        let booking = transition.into_booking();

        if applied {
            tracing::info!(
                booking_id = %booking.id,
                quantity = booking.quantity,
                source = %source,
                "Pending booking released"
            );
            record_booking(BookingStatus::Cancelled);
            record_pending_released();
            if source != ReconcileSource::Checkout {
                record_payment("failed", source.as_str());
            }
        } else {
            tracing::debug!(
                booking_id = %booking.id,
                status = %booking.status,
                source = %source,
                "Release skipped, booking already settled"
            );
        }

        state.booking = Some(booking);
        Self::finish(state)
    }

    fn on_failed(state: &mut CheckoutState, error: CheckoutError) -> Effects {
        let booking_id = state.booking.as_ref().map(|booking| booking.id);

        match (state.phase, &error) {
            (
                CheckoutPhase::Confirming,
                CheckoutError::Ledger(LedgerError::InvalidTransition {
                    from: BookingStatus::Cancelled,
                    ..
                }),
            ) => {
                tracing::error!(
                    booking_id = ?booking_id,
                    source = ?state.source,
                    "Payment succeeded for a released booking; refund required"
                );
                if state.source == Some(ReconcileSource::Webhook) {
                    state.webhook_outcome = Some(WebhookOutcome::Conflict);
                }
            },
            (CheckoutPhase::RollingBack, _) => {
                tracing::error!(booking_id = ?booking_id, error = %error, "Reservation rollback failed");
            },
            _ => {
                tracing::warn!(
                    booking_id = ?booking_id,
                    phase = ?state.phase,
                    error = %error,
                    "Checkout step failed"
                );
            },
        }

        if state.error.is_none() {
            state.error = Some(error);
        }
        Self::finish(state)
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            CheckoutAction::OpenSession {
                event_id,
                requester,
                quantity,
            } => {
                state.phase = CheckoutPhase::Reserving;
                state.source = Some(ReconcileSource::Checkout);
                state.requester = Some(requester.clone());

                let ledger = env.ledger.clone();
                smallvec![async_effect! {
                    match ledger.reserve(event_id, requester.id, quantity).await {
                        Ok(reservation) => Some(CheckoutAction::Reserved { reservation }),
                        Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
                    }
                }]
            },

            CheckoutAction::Verify { booking_id, source } => {
                Self::load(state, booking_id, source, env)
            },

            CheckoutAction::Expire { booking_id } => {
                Self::load(state, booking_id, ReconcileSource::Sweep, env)
            },

            CheckoutAction::ApplyNotification { notification } => {
                state.phase = CheckoutPhase::Matching;
                state.source = Some(ReconcileSource::Webhook);

                let ledger = env.ledger.clone();
                let order_id = notification.order_id.clone();
                smallvec![async_effect! {
                    match ledger.booking_by_order(&order_id).await {
                        Ok(booking) => Some(CheckoutAction::NotificationMatched { booking, notification }),
                        Err(error) => Some(CheckoutAction::Failed { error: error.into() }),
                    }
                }]
            },

            // ========== Feedback ==========
            CheckoutAction::Reserved { reservation } => Self::on_reserved(state, reservation, env),

            CheckoutAction::SessionOpened { booking, session } => {
                Self::on_session_opened(state, &booking, session, env)
            },

            CheckoutAction::SessionAttached { booking, session } => {
                state.booking = Some(booking);
                state.session = Some(session);
                Self::finish(state)
            },

            CheckoutAction::SessionFailed { booking, error } => {
                state.booking = Some(booking.clone());
                let definite = error.is_definite_failure();
                state.error = Some(error.clone().into());

                if definite {
                    tracing::warn!(
                        booking_id = %booking.id,
                        error = %error,
                        "Gateway refused order; releasing reservation"
                    );
                    Self::release(
                        state,
                        CheckoutPhase::RollingBack,
                        booking.id,
                        ReconcileSource::Checkout,
                        env,
                    )
                } else {
                    tracing::warn!(
                        booking_id = %booking.id,
                        error = %error,
                        "Gateway outcome unknown; booking left pending"
                    );
                    Self::finish(state)
                }
            },

            CheckoutAction::Loaded { booking, source } => Self::on_loaded(state, booking, source, env),

            CheckoutAction::StatusFetched {
                booking,
                status,
                source,
            } => Self::on_status(state, &booking, status, source, env),

            CheckoutAction::NotificationMatched {
                booking,
                notification,
            } => Self::on_notification(state, booking, notification, env),

            CheckoutAction::Confirmed { transition, source } => {
                Self::on_confirmed(state, transition, source)
            },

            CheckoutAction::Released { transition, source } => {
                Self::on_released(state, transition, source)
            },

            CheckoutAction::Failed { error } => Self::on_failed(state, error),
        }
    }
}
