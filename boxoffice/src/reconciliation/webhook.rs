//! Gateway webhook authentication and payload parsing.
//!
//! The gateway signs the raw request body with the shared secret:
//! `hex(HMAC-SHA256(secret, body))`. Signatures are compared in constant time.

use super::types::CheckoutError;
use crate::types::OrderId;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Order status the gateway reports for a completed payment
pub const SUCCESS_ORDER_STATUS: &str = "PAID";

/// Payment status the gateway reports for a completed payment
pub const SUCCESS_PAYMENT_STATUS: &str = "SUCCESS";

/// A payment notification pushed by the gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    /// Gateway order the notification is about
    pub order_id: OrderId,
    /// Amount as the gateway sent it; informational only
    #[serde(default)]
    pub order_amount: Option<serde_json::Value>,
    /// Order status (`PAID`, `ACTIVE`, `EXPIRED`, ...)
    #[serde(default)]
    pub order_status: Option<String>,
    /// Payment attempt status (`SUCCESS`, `FAILED`, ...)
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Gateway payment id
    #[serde(default, deserialize_with = "string_or_number")]
    pub payment_id: Option<String>,
}

impl PaymentNotification {
    /// `true` only for a paid order with a successful payment
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.order_status.as_deref() == Some(SUCCESS_ORDER_STATUS)
            && self.payment_status.as_deref() == Some(SUCCESS_PAYMENT_STATUS)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Parse a raw webhook body.
///
/// # Errors
///
/// [`CheckoutError::MalformedPayload`] if the body is not JSON or lacks an
/// order id.
pub fn parse_notification(body: &[u8]) -> Result<PaymentNotification, CheckoutError> {
    let notification: PaymentNotification = serde_json::from_slice(body)
        .map_err(|e| CheckoutError::MalformedPayload(e.to_string()))?;

    if notification.order_id.as_str().trim().is_empty() {
        return Err(CheckoutError::MalformedPayload("empty orderId".to_string()));
    }
    Ok(notification)
}

/// Checks webhook signatures against the shared secret
#[derive(Clone, Default)]
pub struct WebhookVerifier {
    secret: Option<String>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl WebhookVerifier {
    /// Create a verifier; `None` (or an empty secret) disables verification
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Whether a secret is configured
    #[must_use]
    pub const fn is_enforcing(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify `signature` over the raw `body`.
    ///
    /// Without a configured secret every payload is accepted with a warning.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::InvalidSignature`] if a secret is configured and the
    /// signature is missing, not hex, or does not match.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), CheckoutError> {
        let Some(secret) = self.secret.as_deref() else {
            tracing::warn!("Webhook secret not configured; accepting unsigned payload");
            return Ok(());
        };

        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::warn!("Webhook rejected: signature header missing");
            return Err(CheckoutError::InvalidSignature);
        };

        let expected = hex::decode(signature).map_err(|_| {
            tracing::warn!("Webhook rejected: signature is not hex");
            CheckoutError::InvalidSignature
        })?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| CheckoutError::InvalidSignature)?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| {
            tracing::warn!("Webhook rejected: signature mismatch");
            CheckoutError::InvalidSignature
        })
    }
}

/// Lowercase hex HMAC-SHA256 of `body` under `secret`
///
/// # Errors
///
/// [`CheckoutError::InvalidSignature`] if the key is rejected.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, CheckoutError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| CheckoutError::InvalidSignature)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BODY: &[u8] =
        br#"{"orderId":"BX_abc","orderAmount":"499.00","orderStatus":"PAID","paymentStatus":"SUCCESS","paymentId":123456}"#;

    #[test]
    fn accepts_matching_signature() {
        let verifier = WebhookVerifier::new(Some("whsec".to_string()));
        let signature = sign_payload("whsec", BODY).unwrap();
        assert!(verifier.verify(BODY, Some(&signature)).is_ok());
        assert!(verifier.verify(BODY, Some(&signature.to_uppercase())).is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_signature() {
        let verifier = WebhookVerifier::new(Some("whsec".to_string()));
        let forged = sign_payload("other", BODY).unwrap();

        assert_eq!(verifier.verify(BODY, Some(&forged)), Err(CheckoutError::InvalidSignature));
        assert_eq!(verifier.verify(BODY, None), Err(CheckoutError::InvalidSignature));
        assert_eq!(verifier.verify(BODY, Some("zz-not-hex")), Err(CheckoutError::InvalidSignature));
    }

    #[test]
    fn tampered_body_fails() {
        let verifier = WebhookVerifier::new(Some("whsec".to_string()));
        let signature = sign_payload("whsec", BODY).unwrap();
        let tampered = String::from_utf8_lossy(BODY).replace("PAID", "ACTIVE");
        assert!(verifier.verify(tampered.as_bytes(), Some(&signature)).is_err());
    }

    #[test]
    fn without_secret_everything_passes() {
        let verifier = WebhookVerifier::new(Some(String::new()));
        assert!(!verifier.is_enforcing());
        assert!(verifier.verify(BODY, None).is_ok());
    }

    #[test]
    fn parses_success_notification_with_numeric_payment_id() {
        let notification = parse_notification(BODY).unwrap();
        assert_eq!(notification.order_id, OrderId::new("BX_abc"));
        assert_eq!(notification.payment_id.as_deref(), Some("123456"));
        assert!(notification.is_success());
    }

    #[test]
    fn success_needs_both_statuses() {
        let notification =
            parse_notification(br#"{"orderId":"BX_abc","orderStatus":"PAID","paymentStatus":"FAILED"}"#)
                .unwrap();
        assert!(!notification.is_success());

        let notification = parse_notification(br#"{"orderId":"BX_abc","orderStatus":"PAID"}"#).unwrap();
        assert!(!notification.is_success());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(
            parse_notification(b"not json"),
            Err(CheckoutError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_notification(br#"{"orderStatus":"PAID"}"#),
            Err(CheckoutError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_notification(br#"{"orderId":"  "}"#),
            Err(CheckoutError::MalformedPayload(_))
        ));
    }
}
