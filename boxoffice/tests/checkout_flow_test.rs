//! End-to-end checkout flows through the coordinator.
//!
//! Everything runs against the in-memory ledger and the scripted gateway, with
//! a mock clock so pending bookings can be aged without sleeping.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/expect

use boxoffice::config::ReconciliationConfig;
use boxoffice::gateway::{GatewayError, MockPaymentGateway, OrderStatus};
use boxoffice::ledger::{BookingLedger, InMemoryLedgerStore, LedgerError};
use boxoffice::reconciliation::{
    sign_payload, CheckoutCoordinator, CheckoutEnvironment, CheckoutError, CheckoutResult, Sweeper,
    WebhookOutcome, WebhookVerifier,
};
use boxoffice::types::{
    BookingStatus, Currency, Event, EventId, Money, OrderId, PaymentStatus, Requester, RequesterId,
};
use boxoffice_core::environment::Clock;
use boxoffice_testing::{test_clock, MockClock};
use chrono::{Duration, FixedOffset, NaiveDate};
use std::sync::Arc;

const SECRET: &str = "whsec_test";

struct Harness {
    coordinator: CheckoutCoordinator,
    store: InMemoryLedgerStore,
    gateway: MockPaymentGateway,
    clock: Arc<MockClock>,
}

fn concert(price_minor: u64, capacity: u32) -> Event {
    Event {
        id: EventId::new(),
        title: "Concert".to_string(),
        price: Money::from_minor(price_minor),
        currency: Currency::inr(),
        capacity: Some(capacity),
        booked_count: 0,
        is_active: true,
        start_date: NaiveDate::from_ymd_opt(2025, 1, 2),
        start_time: Some("18:00".to_string()),
        end_date: None,
        end_time: None,
    }
}

fn harness(events: &[Event]) -> Harness {
    let store = InMemoryLedgerStore::new();
    for event in events {
        store.insert_event(event.clone());
    }
    let clock = Arc::new(MockClock::new(test_clock().now()));
    let ledger = BookingLedger::new(
        Arc::new(store.clone()),
        clock.clone(),
        FixedOffset::east_opt(0).expect("UTC offset"),
    );
    let gateway = MockPaymentGateway::new();
    let env = CheckoutEnvironment::new(
        clock.clone(),
        ledger,
        Arc::new(gateway.clone()),
        Duration::minutes(30),
    );
    let coordinator = CheckoutCoordinator::new(env, WebhookVerifier::new(Some(SECRET.to_string())));

    Harness {
        coordinator,
        store,
        gateway,
        clock,
    }
}

fn success_body(order_id: &OrderId, payment_id: &str) -> Vec<u8> {
    serde_json::json!({
        "orderId": order_id.as_str(),
        "orderAmount": 1000.0,
        "orderStatus": "PAID",
        "paymentStatus": "SUCCESS",
        "paymentId": payment_id,
    })
    .to_string()
    .into_bytes()
}

async fn deliver(harness: &Harness, body: &[u8]) -> Result<WebhookOutcome, CheckoutError> {
    let signature = sign_payload(SECRET, body).unwrap();
    harness.coordinator.on_webhook(body, Some(&signature)).await
}

async fn open_paid_session(harness: &Harness, event: &Event, quantity: u32) -> (RequesterId, OrderId) {
    let requester = Requester::anonymous(RequesterId::new());
    let result = harness
        .coordinator
        .open_session(event.id, requester.clone(), quantity)
        .await
        .expect("session opens");

    let CheckoutResult::Session { booking, session } = result else {
        panic!("paid event should open a gateway session");
    };
    assert_eq!(booking.order_id.as_ref(), Some(&session.order_id));
    (requester.id, session.order_id)
}

#[tokio::test]
async fn poll_then_webhook_confirms_once() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    let (requester_id, order_id) = open_paid_session(&harness, &event, 2).await;

    harness.gateway.set_status(
        &order_id,
        OrderStatus::Paid {
            payment_id: Some("pay_poll".to_string()),
        },
    );

    let verification = harness
        .coordinator
        .verify_order(&order_id, requester_id)
        .await
        .expect("verification succeeds");
    assert!(verification.booking.is_confirmed_paid());
    assert_eq!(verification.booking.payment_id.as_deref(), Some("pay_poll"));

    // The late webhook changes nothing
    let outcome = deliver(&harness, &success_body(&order_id, "pay_hook")).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Duplicate);

    let booking = harness.store.booking(verification.booking.id).unwrap();
    assert_eq!(booking.payment_id.as_deref(), Some("pay_poll"));
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 2);
}

#[tokio::test]
async fn webhook_then_poll_confirms_once() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    let (requester_id, order_id) = open_paid_session(&harness, &event, 1).await;

    let outcome = deliver(&harness, &success_body(&order_id, "pay_hook")).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Confirmed);
    assert_eq!(harness.gateway.status_calls(), 0);

    // Already settled, so the poll does not ask the gateway
    let verification = harness
        .coordinator
        .verify_order(&order_id, requester_id)
        .await
        .unwrap();
    assert!(verification.booking.is_confirmed_paid());
    assert_eq!(verification.gateway_status, None);
    assert_eq!(harness.gateway.status_calls(), 0);
    assert_eq!(verification.booking.payment_id.as_deref(), Some("pay_hook"));
}

#[tokio::test]
async fn free_event_confirms_without_gateway() {
    let event = concert(0, 10);
    let harness = harness(&[event.clone()]);

    let result = harness
        .coordinator
        .open_session(event.id, Requester::anonymous(RequesterId::new()), 2)
        .await
        .unwrap();

    let CheckoutResult::Free { booking } = result else {
        panic!("free event should not open a session");
    };
    assert!(booking.is_confirmed_paid());
    assert!(booking.total_amount.is_zero());
    assert_eq!(booking.order_id, None);
    assert_eq!(harness.gateway.sessions_created(), 0);
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 2);
}

#[tokio::test]
async fn webhook_for_unknown_order_is_acknowledged() {
    let harness = harness(&[]);
    let outcome = deliver(&harness, &success_body(&OrderId::new("BX_unknown"), "pay_1"))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::UnknownOrder);
}

#[tokio::test]
async fn bad_signature_changes_nothing() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    let (_, order_id) = open_paid_session(&harness, &event, 1).await;
    let body = success_body(&order_id, "pay_forged");

    let forged = sign_payload("not-the-secret", &body).unwrap();
    let result = harness.coordinator.on_webhook(&body, Some(&forged)).await;
    assert!(matches!(result, Err(CheckoutError::InvalidSignature)));

    let result = harness.coordinator.on_webhook(&body, None).await;
    assert!(matches!(result, Err(CheckoutError::InvalidSignature)));

    let booking = harness.store.bookings().pop().unwrap();
    assert!(booking.is_pending());
}

#[tokio::test]
async fn malformed_webhook_is_rejected() {
    let harness = harness(&[]);
    let result = deliver(&harness, b"{\"orderStatus\":\"PAID\"}").await;
    assert!(matches!(result, Err(CheckoutError::MalformedPayload(_))));
}

#[tokio::test]
async fn gateway_refusal_rolls_back_the_reservation() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    harness.gateway.fail_create_with(GatewayError::Rejected {
        status: 400,
        message: "order_amount invalid".to_string(),
    });

    let result = harness
        .coordinator
        .open_session(event.id, Requester::anonymous(RequesterId::new()), 3)
        .await;
    assert!(matches!(
        result,
        Err(CheckoutError::Gateway(GatewayError::Rejected { status: 400, .. }))
    ));

    let booking = harness.store.bookings().pop().unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.payment_status, PaymentStatus::Failed);
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 0);
}

#[tokio::test]
async fn gateway_timeout_keeps_the_booking_for_later() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    harness.gateway.fail_create_with(GatewayError::Timeout(15));

    let result = harness
        .coordinator
        .open_session(event.id, Requester::anonymous(RequesterId::new()), 1)
        .await;
    assert!(matches!(result, Err(CheckoutError::Gateway(GatewayError::Timeout(15)))));

    let booking = harness.store.bookings().pop().unwrap();
    assert!(booking.is_pending());
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 1);
}

#[tokio::test]
async fn verification_by_another_requester_is_forbidden() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    let (_, order_id) = open_paid_session(&harness, &event, 1).await;

    let result = harness
        .coordinator
        .verify_order(&order_id, RequesterId::new())
        .await;
    assert!(matches!(result, Err(CheckoutError::Forbidden(_))));
    assert_eq!(harness.gateway.status_calls(), 0);

    let result = harness
        .coordinator
        .verify_order(&OrderId::new("BX_nope"), RequesterId::new())
        .await;
    assert!(matches!(
        result,
        Err(CheckoutError::Ledger(LedgerError::NotFound { entity: "order", .. }))
    ));
}

#[tokio::test]
async fn sweep_settles_bookings_past_their_ttl() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    let (_, paid) = open_paid_session(&harness, &event, 1).await;
    let (_, expired) = open_paid_session(&harness, &event, 2).await;
    let (_, waiting) = open_paid_session(&harness, &event, 3).await;

    harness.gateway.set_status(
        &paid,
        OrderStatus::Paid {
            payment_id: Some("pay_late".to_string()),
        },
    );
    harness.gateway.set_status(
        &expired,
        OrderStatus::Failed {
            reason: "EXPIRED".to_string(),
        },
    );
    harness.gateway.set_status(&waiting, OrderStatus::AwaitingPayment);

    // Nothing is old enough yet
    let report = harness
        .coordinator
        .sweep_expired(Duration::minutes(30), 100)
        .await
        .unwrap();
    assert_eq!(report.examined, 0);

    harness.clock.advance(Duration::minutes(31));
    let report = harness
        .coordinator
        .sweep_expired(Duration::minutes(30), 100)
        .await
        .unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.released, 1);
    assert_eq!(report.left_pending, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 4);

    // A success reported after the release is acknowledged but refused
    let outcome = deliver(&harness, &success_body(&expired, "pay_too_late")).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Conflict);
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 4);
}

#[tokio::test]
async fn sweep_releases_orders_the_gateway_never_saw() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    harness.gateway.fail_create_with(GatewayError::Timeout(15));
    let _ = harness
        .coordinator
        .open_session(event.id, Requester::anonymous(RequesterId::new()), 2)
        .await;
    harness.gateway.clear_failures();

    harness.clock.advance(Duration::hours(1));
    let report = harness
        .coordinator
        .sweep_expired(Duration::minutes(30), 100)
        .await
        .unwrap();

    assert_eq!(report.released, 1);
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 0);
}

#[tokio::test]
async fn sweep_leaves_bookings_alone_when_gateway_is_down() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    open_paid_session(&harness, &event, 1).await;
    harness.gateway.fail_status_with(GatewayError::Transport("connection reset".to_string()));

    harness.clock.advance(Duration::hours(1));
    let report = harness
        .coordinator
        .sweep_expired(Duration::minutes(30), 100)
        .await
        .unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.errors, 1);
    assert!(harness.store.bookings().pop().unwrap().is_pending());
}

#[tokio::test]
async fn sweep_reaches_bookings_behind_ones_that_stay_pending() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    let (_, older) = open_paid_session(&harness, &event, 1).await;
    harness.clock.advance(Duration::minutes(1));
    let (_, newer) = open_paid_session(&harness, &event, 2).await;

    harness.gateway.set_status(&older, OrderStatus::AwaitingPayment);
    harness.gateway.set_status(
        &newer,
        OrderStatus::Failed {
            reason: "EXPIRED".to_string(),
        },
    );
    harness.clock.advance(Duration::hours(1));

    // One booking per page: the still-open older order must not hide the newer one
    let report = harness
        .coordinator
        .sweep_expired(Duration::minutes(30), 1)
        .await
        .unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.left_pending, 1);
    assert_eq!(report.released, 1);
    assert_eq!(harness.store.event(event.id).unwrap().booked_count, 1);

    let older = harness.store.bookings().into_iter().find(|b| b.order_id.as_ref() == Some(&older)).unwrap();
    assert!(older.is_pending());
    let newer = harness.store.bookings().into_iter().find(|b| b.order_id.as_ref() == Some(&newer)).unwrap();
    assert!(newer.is_released());
}

#[tokio::test]
async fn background_sweeper_releases_and_stops_on_signal() {
    let event = concert(50_000, 10);
    let harness = harness(&[event.clone()]);
    let (_, order_id) = open_paid_session(&harness, &event, 2).await;
    harness.gateway.set_status(
        &order_id,
        OrderStatus::Failed {
            reason: "EXPIRED".to_string(),
        },
    );
    harness.clock.advance(Duration::hours(1));

    let config = ReconciliationConfig {
        pending_ttl_secs: 1800,
        sweep_interval_secs: 1,
        sweep_batch_size: 10,
        settle_timeout_secs: 5,
    };
    let (sweeper, shutdown) = Sweeper::new(Arc::new(harness.coordinator.clone()), &config);
    let handle = sweeper.spawn();

    // The first tick fires immediately
    let released = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if harness.store.event(event.id).unwrap().booked_count == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "sweeper should release the expired booking");

    shutdown.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("sweeper stops")
        .expect("sweeper task completes");
}
