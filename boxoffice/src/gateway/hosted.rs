//! REST client for the hosted checkout gateway.
//!
//! ```text
//! POST {base}/pg/orders                 create order (usually returns the session)
//! POST {base}/pg/orders/{id}/sessions   create session when the order response lacks one
//! GET  {base}/pg/orders/{id}            order status
//! ```
//!
//! Every call carries `x-client-id`, `x-client-secret` and `x-api-version`
//! and is bounded by the configured timeout.

use super::{
    placeholders, CheckoutRequest, GatewayError, GatewayFuture, GatewayResult, OrderStatus,
    PaymentGateway, PaymentSession,
};
use crate::config::GatewayConfig;
use crate::metrics::record_gateway_call;
use crate::types::OrderId;
use chrono::SecondsFormat;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct CustomerDetails<'a> {
    customer_id: String,
    customer_name: &'a str,
    customer_email: &'a str,
    customer_phone: &'a str,
}

#[derive(Serialize)]
struct OrderMeta {
    return_url: String,
    notify_url: String,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    order_id: &'a str,
    order_amount: f64,
    order_currency: &'a str,
    order_note: &'a str,
    customer_details: &'a CustomerDetails<'a>,
    order_meta: &'a OrderMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_expiry_time: Option<String>,
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    order_id: &'a str,
    order_amount: f64,
    order_currency: &'a str,
    customer_details: &'a CustomerDetails<'a>,
    order_meta: &'a OrderMeta,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: Option<String>,
    order_status: Option<String>,
    payment_session_id: Option<String>,
    payment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    payment_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<NestedError>,
}

#[derive(Debug, Deserialize)]
struct NestedError {
    message: Option<String>,
}

/// Hosted checkout gateway over HTTPS
#[derive(Clone)]
pub struct HostedCheckoutGateway {
    client: Client,
    config: Arc<GatewayConfig>,
}

impl HostedCheckoutGateway {
    /// Build a client after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Misconfigured`] if credentials are missing or
    /// the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Misconfigured(format!("HTTP client: {e}")))?;

        tracing::info!(
            environment = ?config.environment,
            base_url = %config.base_url,
            "Payment gateway client ready"
        );

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.config.base_url))
            .header("x-client-id", &self.config.client_id)
            .header("x-client-secret", &self.config.client_secret)
            .header("x-api-version", &self.config.api_version)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
    }

    /// Send with the configured bound; returns status and raw body
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> GatewayResult<(u16, String)> {
        let started = Instant::now();
        let timeout_secs = self.config.timeout_secs;

        let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        })
        .await;

        record_gateway_call(operation, started.elapsed().as_secs_f64());

        match outcome {
            Err(_) => Err(GatewayError::Timeout(timeout_secs)),
            Ok(Err(e)) if e.is_timeout() => Err(GatewayError::Timeout(timeout_secs)),
            Ok(Err(e)) => Err(GatewayError::Transport(e.to_string())),
            Ok(Ok(response)) => Ok(response),
        }
    }

    fn rejection(operation: &'static str, status: u16, body: &str) -> GatewayError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.message.or_else(|| parsed.error.and_then(|e| e.message)))
            .unwrap_or_else(|| body.chars().take(200).collect());

        tracing::error!(operation, status, message = %message, "Payment gateway rejected request");
        GatewayError::Rejected { status, message }
    }

    fn parse<T: serde::de::DeserializeOwned>(body: &str) -> GatewayResult<T> {
        serde_json::from_str(body).map_err(|e| {
            GatewayError::InvalidResponse(format!(
                "{e}: {}",
                body.chars().take(200).collect::<String>()
            ))
        })
    }

    async fn open(&self, request: CheckoutRequest) -> GatewayResult<PaymentSession> {
        let customer = CustomerDetails {
            customer_id: request.customer.id.to_string(),
            customer_name: request.customer.name.as_deref().unwrap_or(placeholders::NAME),
            customer_email: request.customer.email.as_deref().unwrap_or(placeholders::EMAIL),
            customer_phone: request.customer.phone.as_deref().unwrap_or(placeholders::PHONE),
        };
        let meta = OrderMeta {
            return_url: self.config.return_url(request.order_id.as_str()),
            notify_url: self.config.notify_url(),
        };
        let amount = request.amount.as_major_units();

        tracing::debug!(
            order_id = %request.order_id,
            booking_id = %request.booking_id,
            amount,
            currency = %request.currency,
            "Creating gateway order"
        );

        let body = CreateOrderBody {
            order_id: request.order_id.as_str(),
            order_amount: amount,
            order_currency: request.currency.as_str(),
            order_note: &request.note,
            customer_details: &customer,
            order_meta: &meta,
            order_expiry_time: request
                .expires_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        };
        let (status, text) = self
            .send("create_order", self.request(Method::POST, "/pg/orders").json(&body))
            .await?;
        if !(200..300).contains(&status) {
            return Err(Self::rejection("create_order", status, &text));
        }

        let order: OrderResponse = Self::parse(&text)?;
        let order_id = order
            .order_id
            .map(OrderId::new)
            .ok_or_else(|| GatewayError::InvalidResponse("order response without order_id".to_string()))?;

        if let Some(payment_session_id) = order.payment_session_id {
            return Ok(PaymentSession {
                order_id,
                payment_session_id,
            });
        }

        let body = CreateSessionBody {
            order_id: order_id.as_str(),
            order_amount: amount,
            order_currency: request.currency.as_str(),
            customer_details: &customer,
            order_meta: &meta,
        };
        let path = format!("/pg/orders/{order_id}/sessions");
        let (status, text) = self
            .send("create_session", self.request(Method::POST, &path).json(&body))
            .await?;
        if !(200..300).contains(&status) {
            return Err(Self::rejection("create_session", status, &text));
        }

        let session: SessionResponse = Self::parse(&text)?;
        session
            .payment_session_id
            .map(|payment_session_id| PaymentSession {
                order_id,
                payment_session_id,
            })
            .ok_or_else(|| GatewayError::InvalidResponse("no payment_session_id returned".to_string()))
    }

    async fn status(&self, order_id: OrderId) -> GatewayResult<OrderStatus> {
        let path = format!("/pg/orders/{order_id}");
        let (status, text) = self
            .send("order_status", self.request(Method::GET, &path))
            .await?;

        if status == 404 {
            return Ok(OrderStatus::NotFound);
        }
        if !(200..300).contains(&status) {
            return Err(Self::rejection("order_status", status, &text));
        }

        let order: OrderResponse = Self::parse(&text)?;
        let raw = order
            .order_status
            .ok_or_else(|| GatewayError::InvalidResponse("order response without order_status".to_string()))?;

        OrderStatus::from_gateway(&raw, order.payment_id)
            .ok_or_else(|| GatewayError::InvalidResponse(format!("unknown order status {raw}")))
    }
}

impl PaymentGateway for HostedCheckoutGateway {
    fn create_session(&self, request: CheckoutRequest) -> GatewayFuture<PaymentSession> {
        let gateway = self.clone();
        Box::pin(async move { gateway.open(request).await })
    }

    fn order_status(&self, order_id: OrderId) -> GatewayFuture<OrderStatus> {
        let gateway = self.clone();
        Box::pin(async move { gateway.status(order_id).await })
    }
}
