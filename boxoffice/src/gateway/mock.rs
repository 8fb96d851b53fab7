//! Scripted in-memory gateway for tests and local runs.
//!
//! Orders opened through it start out `AwaitingPayment`; tests move them
//! along with [`MockPaymentGateway::set_status`] and inject failures with
//! [`MockPaymentGateway::fail_create_with`] / [`MockPaymentGateway::fail_status_with`].

use super::{
    CheckoutRequest, GatewayError, GatewayFuture, GatewayResult, OrderStatus, PaymentGateway,
    PaymentSession,
};
use crate::types::OrderId;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    statuses: HashMap<OrderId, OrderStatus>,
    requests: Vec<CheckoutRequest>,
    create_failure: Option<GatewayError>,
    status_failure: Option<GatewayError>,
    status_calls: usize,
}

/// Scriptable payment gateway
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockPaymentGateway {
    /// Creates a new mock payment gateway
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script the status the gateway reports for `order_id`
    pub fn set_status(&self, order_id: &OrderId, status: OrderStatus) {
        self.lock().statuses.insert(order_id.clone(), status);
    }

    /// Make every `create_session` fail with `error`
    pub fn fail_create_with(&self, error: GatewayError) {
        self.lock().create_failure = Some(error);
    }

    /// Make every `order_status` fail with `error`
    pub fn fail_status_with(&self, error: GatewayError) {
        self.lock().status_failure = Some(error);
    }

    /// Remove injected failures
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.create_failure = None;
        state.status_failure = None;
    }

    /// Number of sessions successfully opened
    #[must_use]
    pub fn sessions_created(&self) -> usize {
        self.lock().requests.len()
    }

    /// Number of status queries received
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    /// The most recent successful checkout request
    #[must_use]
    pub fn last_request(&self) -> Option<CheckoutRequest> {
        self.lock().requests.last().cloned()
    }

    fn open(&self, request: CheckoutRequest) -> GatewayResult<PaymentSession> {
        let mut state = self.lock();
        if let Some(error) = state.create_failure.clone() {
            return Err(error);
        }

        let order_id = request.order_id.clone();
        state
            .statuses
            .entry(order_id.clone())
            .or_insert(OrderStatus::AwaitingPayment);
        state.requests.push(request);

        tracing::info!(order_id = %order_id, "Mock checkout session opened");
        Ok(PaymentSession {
            payment_session_id: format!("session_{order_id}"),
            order_id,
        })
    }

    fn status(&self, order_id: &OrderId) -> GatewayResult<OrderStatus> {
        let mut state = self.lock();
        state.status_calls += 1;
        if let Some(error) = state.status_failure.clone() {
            return Err(error);
        }
        Ok(state
            .statuses
            .get(order_id)
            .cloned()
            .unwrap_or(OrderStatus::NotFound))
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_session(&self, request: CheckoutRequest) -> GatewayFuture<PaymentSession> {
        futures::future::ready(self.open(request)).boxed()
    }

    fn order_status(&self, order_id: OrderId) -> GatewayFuture<OrderStatus> {
        futures::future::ready(self.status(&order_id)).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BookingId, Currency, Money, Requester, RequesterId};

    fn request() -> CheckoutRequest {
        let booking_id = BookingId::new();
        CheckoutRequest {
            order_id: OrderId::for_booking(&booking_id),
            booking_id,
            amount: Money::from_minor(50_000),
            currency: Currency::inr(),
            customer: Requester::anonymous(RequesterId::new()),
            note: "Booking for Concert - 1 ticket(s)".to_string(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn opened_orders_await_payment_until_scripted() {
        let gateway = MockPaymentGateway::new();
        let session = gateway.create_session(request()).await.unwrap();

        assert_eq!(
            gateway.order_status(session.order_id.clone()).await.unwrap(),
            OrderStatus::AwaitingPayment
        );

        gateway.set_status(&session.order_id, OrderStatus::Paid { payment_id: None });
        assert!(matches!(
            gateway.order_status(session.order_id).await.unwrap(),
            OrderStatus::Paid { .. }
        ));
        assert_eq!(gateway.status_calls(), 2);
    }

    #[tokio::test]
    async fn unknown_orders_are_not_found() {
        let gateway = MockPaymentGateway::new();
        let status = gateway.order_status(OrderId::new("BX_missing")).await.unwrap();
        assert_eq!(status, OrderStatus::NotFound);
    }

    #[tokio::test]
    async fn injected_failures_are_returned() {
        let gateway = MockPaymentGateway::new();
        gateway.fail_create_with(GatewayError::Timeout(15));

        let result = gateway.create_session(request()).await;
        assert_eq!(result.unwrap_err(), GatewayError::Timeout(15));
        assert_eq!(gateway.sessions_created(), 0);

        gateway.clear_failures();
        assert!(gateway.create_session(request()).await.is_ok());
        assert_eq!(gateway.sessions_created(), 1);
    }
}
