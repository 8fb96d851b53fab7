#![allow(clippy::unwrap_used, clippy::panic)]

use super::*;
use crate::gateway::{GatewayError, MockPaymentGateway, OrderStatus};
use crate::ledger::{BookingLedger, InMemoryLedgerStore, LedgerError, Transition};
use crate::types::{Booking, BookingStatus, Currency, Event, EventId, Money, Requester, RequesterId};
use boxoffice_core::environment::Clock;
use boxoffice_testing::{assertions, collect_actions, test_clock, MockClock, ReducerTest};
use chrono::{FixedOffset, NaiveDate};
use std::sync::Arc;

struct Fixture {
    env: CheckoutEnvironment,
    store: InMemoryLedgerStore,
    gateway: MockPaymentGateway,
    event: Event,
}

fn fixture(price_minor: u64) -> Fixture {
    let event = Event {
        id: EventId::new(),
        title: "Concert".to_string(),
        price: Money::from_minor(price_minor),
        currency: Currency::inr(),
        capacity: Some(10),
        booked_count: 0,
        is_active: true,
        start_date: NaiveDate::from_ymd_opt(2025, 1, 2),
        start_time: Some("18:00".to_string()),
        end_date: None,
        end_time: None,
    };

    let store = InMemoryLedgerStore::new();
    store.insert_event(event.clone());
    let clock = Arc::new(MockClock::new(test_clock().now()));
    let ledger = BookingLedger::new(
        Arc::new(store.clone()),
        clock.clone(),
        FixedOffset::east_opt(0).unwrap(),
    );
    let gateway = MockPaymentGateway::new();
    let env = CheckoutEnvironment::new(
        clock,
        ledger,
        Arc::new(gateway.clone()),
        chrono::Duration::minutes(30),
    );

    Fixture {
        env,
        store,
        gateway,
        event,
    }
}

async fn pending_booking(fixture: &Fixture, quantity: u32) -> Booking {
    fixture
        .env
        .ledger
        .reserve(fixture.event.id, RequesterId::new(), quantity)
        .await
        .unwrap()
        .booking
}

fn reduce(
    state: &mut CheckoutState,
    action: CheckoutAction,
    env: &CheckoutEnvironment,
) -> boxoffice_core::SmallVec<[boxoffice_core::effect::Effect<CheckoutAction>; 4]> {
    use boxoffice_core::reducer::Reducer;
    CheckoutReducer::new().reduce(state, action, env)
}

#[tokio::test]
async fn open_session_starts_with_a_reservation() {
    let fixture = fixture(50_000);
    let requester = Requester::anonymous(RequesterId::new());

    let effects = ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::OpenSession {
            event_id: fixture.event.id,
            requester: requester.clone(),
            quantity: 2,
        })
        .then_state(move |state| {
            assert_eq!(state.phase, CheckoutPhase::Reserving);
            assert_eq!(state.requester.as_ref(), Some(&requester));
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_has_future_effect(effects);
        })
        .run();

    let actions = collect_actions(effects).await;
    assert!(matches!(
        actions.as_slice(),
        [CheckoutAction::Reserved { reservation }] if reservation.booking.is_pending()
    ));
    assert_eq!(fixture.store.event(fixture.event.id).unwrap().booked_count, 2);
}

#[tokio::test]
async fn paid_reservation_opens_gateway_order_with_expiry() {
    let fixture = fixture(50_000);
    let reservation = fixture
        .env
        .ledger
        .reserve(fixture.event.id, RequesterId::new(), 2)
        .await
        .unwrap();
    let booking_id = reservation.booking.id;

    let mut state = CheckoutState::default();
    let effects = reduce(&mut state, CheckoutAction::Reserved { reservation }, &fixture.env);
    assert_eq!(state.phase, CheckoutPhase::OpeningSession);
    assert_eq!(state.event_title.as_deref(), Some("Concert"));

    let actions = collect_actions(effects).await;
    assert!(matches!(actions.as_slice(), [CheckoutAction::SessionOpened { .. }]));

    let request = fixture.gateway.last_request().unwrap();
    assert_eq!(request.booking_id, booking_id);
    assert_eq!(request.amount, Money::from_minor(100_000));
    assert_eq!(request.note, "Booking for Concert - 2 ticket(s)");
    assert_eq!(
        request.expires_at,
        Some(test_clock().now() + chrono::Duration::minutes(30))
    );
}

#[tokio::test]
async fn free_reservation_finishes_without_gateway() {
    let fixture = fixture(0);
    let reservation = fixture
        .env
        .ledger
        .reserve(fixture.event.id, RequesterId::new(), 2)
        .await
        .unwrap();

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::Reserved { reservation })
        .then_state(|state| {
            assert!(state.is_done());
            assert!(state.booking.as_ref().unwrap().is_confirmed_paid());
        })
        .then_effects(assertions::assert_no_effects)
        .run();

    assert_eq!(fixture.gateway.sessions_created(), 0);
}

#[tokio::test]
async fn opened_session_is_attached_to_booking() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;
    let session = crate::gateway::PaymentSession {
        order_id: booking.order_id.clone().unwrap(),
        payment_session_id: "session_1".to_string(),
    };

    let mut state = CheckoutState::default();
    let effects = reduce(
        &mut state,
        CheckoutAction::SessionOpened {
            booking: booking.clone(),
            session,
        },
        &fixture.env,
    );
    assert_eq!(state.phase, CheckoutPhase::AttachingSession);

    let actions = collect_actions(effects).await;
    let [CheckoutAction::SessionAttached { booking: attached, .. }] = actions.as_slice() else {
        panic!("expected SessionAttached, got {actions:?}");
    };
    assert_eq!(attached.payment_session_id.as_deref(), Some("session_1"));
    assert!(attached.is_pending());
}

#[tokio::test]
async fn definite_gateway_failure_rolls_back_reservation() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 3).await;
    let error = GatewayError::Rejected {
        status: 400,
        message: "order_amount invalid".to_string(),
    };

    let mut state = CheckoutState::default();
    let effects = reduce(
        &mut state,
        CheckoutAction::SessionFailed {
            booking: booking.clone(),
            error: error.clone(),
        },
        &fixture.env,
    );
    assert_eq!(state.phase, CheckoutPhase::RollingBack);
    assert_eq!(state.error, Some(CheckoutError::Gateway(error.clone())));

    let mut actions = collect_actions(effects).await;
    let released = actions.pop().unwrap();
    assert!(matches!(
        &released,
        CheckoutAction::Released { transition, source: ReconcileSource::Checkout } if transition.was_applied()
    ));

    let effects = reduce(&mut state, released, &fixture.env);
    assert!(effects.is_empty());
    assert!(state.is_done());
    assert_eq!(state.error, Some(CheckoutError::Gateway(error)));
    assert_eq!(fixture.store.event(fixture.event.id).unwrap().booked_count, 0);
    assert!(fixture.store.booking(booking.id).unwrap().is_released());
}

#[tokio::test]
async fn unknown_gateway_outcome_leaves_booking_pending() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::SessionFailed {
            booking: booking.clone(),
            error: GatewayError::Timeout(15),
        })
        .then_state(|state| {
            assert!(state.is_done());
            assert_eq!(state.error, Some(CheckoutError::Gateway(GatewayError::Timeout(15))));
        })
        .then_effects(assertions::assert_no_effects)
        .run();

    assert!(fixture.store.booking(booking.id).unwrap().is_pending());
    assert_eq!(fixture.store.event(fixture.event.id).unwrap().booked_count, 1);
}

#[tokio::test]
async fn settled_booking_is_not_polled() {
    let fixture = fixture(0);
    let booking = pending_booking(&fixture, 1).await;
    assert!(booking.is_confirmed_paid());

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::Loaded {
            booking,
            source: ReconcileSource::Poll,
        })
        .then_state(|state| assert!(state.is_done()))
        .then_effects(assertions::assert_no_effects)
        .run();

    assert_eq!(fixture.gateway.status_calls(), 0);
}

#[tokio::test]
async fn paid_status_confirms_booking() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;

    let mut state = CheckoutState::default();
    let effects = reduce(
        &mut state,
        CheckoutAction::StatusFetched {
            booking: booking.clone(),
            status: OrderStatus::Paid {
                payment_id: Some("pay_42".to_string()),
            },
            source: ReconcileSource::Poll,
        },
        &fixture.env,
    );
    assert_eq!(state.phase, CheckoutPhase::Confirming);

    let confirmed = collect_actions(effects).await.pop().unwrap();
    reduce(&mut state, confirmed, &fixture.env);

    let current = state.booking.unwrap();
    assert!(current.is_confirmed_paid());
    assert_eq!(current.payment_id.as_deref(), Some("pay_42"));
    assert_eq!(state.webhook_outcome, None);
}

#[tokio::test]
async fn failed_status_releases_booking() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 2).await;

    let mut state = CheckoutState::default();
    let effects = reduce(
        &mut state,
        CheckoutAction::StatusFetched {
            booking: booking.clone(),
            status: OrderStatus::Failed {
                reason: "EXPIRED".to_string(),
            },
            source: ReconcileSource::Poll,
        },
        &fixture.env,
    );
    assert_eq!(state.phase, CheckoutPhase::Releasing);

    let released = collect_actions(effects).await.pop().unwrap();
    reduce(&mut state, released, &fixture.env);

    assert!(state.booking.unwrap().is_released());
    assert_eq!(fixture.store.event(fixture.event.id).unwrap().booked_count, 0);
}

#[tokio::test]
async fn missing_order_is_released_only_by_the_sweep() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::StatusFetched {
            booking: booking.clone(),
            status: OrderStatus::NotFound,
            source: ReconcileSource::Poll,
        })
        .then_state(|state| assert!(state.is_done()))
        .then_effects(assertions::assert_no_effects)
        .run();

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::StatusFetched {
            booking,
            status: OrderStatus::NotFound,
            source: ReconcileSource::Sweep,
        })
        .then_state(|state| assert_eq!(state.phase, CheckoutPhase::Releasing))
        .then_effects(assertions::assert_has_future_effect)
        .run();
}

#[tokio::test]
async fn awaiting_payment_changes_nothing() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::StatusFetched {
            booking,
            status: OrderStatus::AwaitingPayment,
            source: ReconcileSource::Sweep,
        })
        .then_state(|state| {
            assert!(state.is_done());
            assert_eq!(state.gateway_status, Some(OrderStatus::AwaitingPayment));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[tokio::test]
async fn notification_for_unknown_order_is_acknowledged() {
    let fixture = fixture(50_000);
    let notification = parse_notification(
        br#"{"orderId":"BX_stale","orderStatus":"PAID","paymentStatus":"SUCCESS"}"#,
    )
    .unwrap();

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env)
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::NotificationMatched {
            booking: None,
            notification,
        })
        .then_state(|state| {
            assert!(state.is_done());
            assert_eq!(state.webhook_outcome, Some(WebhookOutcome::UnknownOrder));
            assert_eq!(state.error, None);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[tokio::test]
async fn non_success_notification_is_only_recorded() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;
    let body = format!(
        r#"{{"orderId":"{}","orderStatus":"ACTIVE","paymentStatus":"FAILED"}}"#,
        booking.order_id.clone().unwrap()
    );
    let notification = parse_notification(body.as_bytes()).unwrap();

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env.clone())
        .given_state(CheckoutState::default())
        .when_action(CheckoutAction::NotificationMatched {
            booking: Some(booking.clone()),
            notification,
        })
        .then_state(|state| assert_eq!(state.webhook_outcome, Some(WebhookOutcome::NotSuccess)))
        .then_effects(assertions::assert_no_effects)
        .run();

    assert!(fixture.store.booking(booking.id).unwrap().is_pending());
}

#[tokio::test]
async fn repeated_webhook_success_is_a_duplicate() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;
    fixture
        .env
        .ledger
        .mark_paid(booking.id, Some("pay_1".to_string()))
        .await
        .unwrap();

    let mut state = CheckoutState {
        source: Some(ReconcileSource::Webhook),
        ..CheckoutState::default()
    };
    let transition = fixture
        .env
        .ledger
        .mark_paid(booking.id, Some("pay_2".to_string()))
        .await
        .unwrap();
    assert!(matches!(transition, Transition::Unchanged(_)));

    reduce(
        &mut state,
        CheckoutAction::Confirmed {
            transition,
            source: ReconcileSource::Webhook,
        },
        &fixture.env,
    );

    assert_eq!(state.webhook_outcome, Some(WebhookOutcome::Duplicate));
    assert_eq!(state.booking.unwrap().payment_id.as_deref(), Some("pay_1"));
}

#[tokio::test]
async fn payment_for_released_booking_is_a_conflict() {
    let fixture = fixture(50_000);
    let booking = pending_booking(&fixture, 1).await;

    let state = CheckoutState {
        phase: CheckoutPhase::Confirming,
        source: Some(ReconcileSource::Webhook),
        booking: Some(booking.clone()),
        ..CheckoutState::default()
    };
    let error = CheckoutError::Ledger(LedgerError::InvalidTransition {
        booking_id: booking.id,
        from: BookingStatus::Cancelled,
    });

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env)
        .given_state(state)
        .when_action(CheckoutAction::Failed {
            error: error.clone(),
        })
        .then_state(move |state| {
            assert!(state.is_done());
            assert_eq!(state.webhook_outcome, Some(WebhookOutcome::Conflict));
            assert_eq!(state.error, Some(error));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[tokio::test]
async fn first_error_of_the_chain_is_kept() {
    let fixture = fixture(50_000);
    let first = CheckoutError::Gateway(GatewayError::Rejected {
        status: 422,
        message: "bad phone".to_string(),
    });

    let state = CheckoutState {
        phase: CheckoutPhase::RollingBack,
        error: Some(first.clone()),
        ..CheckoutState::default()
    };

    ReducerTest::new(CheckoutReducer::new())
        .with_env(fixture.env)
        .given_state(state)
        .when_action(CheckoutAction::Failed {
            error: CheckoutError::Ledger(LedgerError::Storage("connection reset".to_string())),
        })
        .then_state(move |state| assert_eq!(state.error, Some(first)))
        .then_effects(assertions::assert_no_effects)
        .run();
}
