//! Configuration management for the boxoffice service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unset variables take their default; set but unparsable ones are errors.
//! [`Config::validate`] is the eager startup check on the loaded values.

use crate::gateway::{GatewayError, GatewayResult};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

/// Configuration errors reported by [`Config::from_env`] and [`Config::validate`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Gateway credentials or URLs are unusable
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A setting has a value that cannot be used
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Environment variable
        name: &'static str,
        /// Offending value
        value: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP and metrics listeners
    pub server: ServerConfig,
    /// `PostgreSQL` ledger
    pub database: DatabaseConfig,
    /// Hosted checkout gateway
    pub gateway: GatewayConfig,
    /// Booking rules
    pub booking: BookingConfig,
    /// Pending-booking reclamation
    pub reconciliation: ReconciliationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; without one the service runs on the in-memory ledger
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

/// Which gateway deployment to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    /// Test deployment, no real money
    Sandbox,
    /// Live deployment
    Production,
}

impl GatewayEnvironment {
    /// Parse `GATEWAY_ENVIRONMENT`; anything but production is sandbox
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "live" => Self::Production,
            _ => Self::Sandbox,
        }
    }

    /// Default API base URL
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.cashfree.com",
            Self::Production => "https://api.cashfree.com",
        }
    }
}

/// Gateway configuration
///
/// `Debug` redacts the client secret and the webhook secret.
#[derive(Clone)]
pub struct GatewayConfig {
    /// API client id
    pub client_id: String,
    /// API client secret
    pub client_secret: String,
    /// Sandbox or production
    pub environment: GatewayEnvironment,
    /// API base URL (no trailing slash)
    pub base_url: String,
    /// `x-api-version` header value
    pub api_version: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Shared secret for webhook signatures; `None` disables verification
    pub webhook_secret: Option<String>,
    /// Public URL of the web client, for the post-checkout redirect
    pub client_url: String,
    /// Public URL of this service, for the webhook
    pub server_url: String,
}

impl GatewayConfig {
    /// Gateway API version this client speaks
    pub const API_VERSION: &'static str = "2023-08-01";

    /// Checks that credentials are present.
    ///
    /// In production, plain-HTTP callback URLs are reported as a warning.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Misconfigured`] if the client id or secret is
    /// empty, or the base URL is not HTTP(S).
    pub fn validate(&self) -> GatewayResult<()> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(GatewayError::Misconfigured(
                "gateway credentials not configured (GATEWAY_CLIENT_ID / GATEWAY_CLIENT_SECRET)"
                    .to_string(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(GatewayError::Misconfigured(format!(
                "gateway base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.environment == GatewayEnvironment::Production
            && (!self.client_url.starts_with("https://") || !self.server_url.starts_with("https://"))
        {
            tracing::warn!(
                client_url = %self.client_url,
                server_url = %self.server_url,
                "Production gateway requires HTTPS return and notify URLs"
            );
        }
        if self.webhook_secret.is_none() {
            tracing::warn!("No webhook secret configured; webhook signatures will not be verified");
        }
        Ok(())
    }

    /// Where the payer lands after checkout
    #[must_use]
    pub fn return_url(&self, order_id: &str) -> String {
        format!(
            "{}/payment/callback?order_id={order_id}",
            self.client_url.trim_end_matches('/')
        )
    }

    /// Where the gateway posts payment notifications
    #[must_use]
    pub fn notify_url(&self) -> String {
        format!("{}/api/payments/webhook", self.server_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("client_url", &self.client_url)
            .field("server_url", &self.server_url)
            .finish()
    }
}

/// Booking rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Venue UTC offset as `+HH:MM`; schedule fields are venue-local
    pub venue_utc_offset: String,
    /// Maximum tickets in one booking
    pub max_tickets_per_booking: u32,
}

impl BookingConfig {
    /// The parsed venue offset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the offset is not `±HH:MM`.
    pub fn venue_offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.venue_utc_offset).ok_or_else(|| ConfigError::InvalidValue {
            name: "VENUE_UTC_OFFSET",
            value: self.venue_utc_offset.clone(),
        })
    }
}

/// Longest accepted pending TTL (seven days)
pub const MAX_PENDING_TTL_SECS: u64 = 7 * 24 * 3600;

/// Pending-booking reclamation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Age after which a pending booking is swept, in seconds
    pub pending_ttl_secs: u64,
    /// Sweep period in seconds
    pub sweep_interval_secs: u64,
    /// Stale bookings read per page during a sweep
    pub sweep_batch_size: usize,
    /// Upper bound on one request's reconciliation, in seconds
    pub settle_timeout_secs: u64,
}

impl ReconciliationConfig {
    /// Pending TTL as a chrono duration
    #[must_use]
    pub fn pending_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            i64::try_from(self.pending_ttl_secs.min(MAX_PENDING_TTL_SECS)).unwrap_or(i64::MAX),
        )
    }
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    parse_setting(name, env::var(name).ok(), default)
}

fn parse_setting<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|value| !value.trim().is_empty()))
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Gateway settings accept both the generic `GATEWAY_*` names and the
    /// `CASHFREE_*` names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a numeric setting that is set
    /// but does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = GatewayEnvironment::parse(
            &env_first(&["GATEWAY_ENVIRONMENT", "CASHFREE_ENVIRONMENT"]).unwrap_or_default(),
        );

        Ok(Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("PORT", 8080)?,
                metrics_host: env::var("METRICS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                metrics_port: env_parse("METRICS_PORT", 9090)?,
                shutdown_timeout: env_parse("SHUTDOWN_TIMEOUT", 30)?,
            },
            database: DatabaseConfig {
                url: env_first(&["DATABASE_URL"]),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10)?,
                connect_timeout: env_parse("DATABASE_CONNECT_TIMEOUT", 30)?,
            },
            gateway: GatewayConfig {
                client_id: env_first(&["GATEWAY_CLIENT_ID", "CASHFREE_CLIENT_ID"]).unwrap_or_default(),
                client_secret: env_first(&["GATEWAY_CLIENT_SECRET", "CASHFREE_CLIENT_SECRET"])
                    .unwrap_or_default(),
                environment,
                base_url: env_first(&["GATEWAY_BASE_URL"])
                    .unwrap_or_else(|| environment.default_base_url().to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_version: GatewayConfig::API_VERSION.to_string(),
                timeout_secs: env_parse("GATEWAY_TIMEOUT_SECS", 15)?,
                webhook_secret: env_first(&["WEBHOOK_SECRET", "CASHFREE_WEBHOOK_SECRET"]),
                client_url: env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5173".to_string()),
                server_url: env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            },
            booking: BookingConfig {
                venue_utc_offset: env::var("VENUE_UTC_OFFSET").unwrap_or_else(|_| "+05:30".to_string()),
                max_tickets_per_booking: env_parse("MAX_TICKETS_PER_BOOKING", 10)?,
            },
            reconciliation: ReconciliationConfig {
                pending_ttl_secs: env_parse("PENDING_BOOKING_TTL_SECS", 1800)?,
                sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60)?,
                sweep_batch_size: env_parse("SWEEP_BATCH_SIZE", 100)?,
                settle_timeout_secs: env_parse("SETTLE_TIMEOUT_SECS", 30)?,
            },
        })
    }

    /// Fail fast on settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first unusable setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        self.booking.venue_offset()?;

        if self.booking.max_tickets_per_booking == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_TICKETS_PER_BOOKING",
                value: "0".to_string(),
            });
        }
        let ttl = self.reconciliation.pending_ttl_secs;
        if ttl == 0 || ttl > MAX_PENDING_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                name: "PENDING_BOOKING_TTL_SECS",
                value: ttl.to_string(),
            });
        }
        if self.reconciliation.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse `±HH:MM`, `±HHMM`, `Z` or `UTC` into an offset
#[must_use]
pub fn parse_utc_offset(input: &str) -> Option<FixedOffset> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("z") || input.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match input.as_bytes().first()? {
        b'+' => (1, &input[1..]),
        b'-' => (-1, &input[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some(parts) => parts,
        None if rest.len() == 4 => rest.split_at(2),
        None => return None,
    };
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gateway() -> GatewayConfig {
        GatewayConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            environment: GatewayEnvironment::Sandbox,
            base_url: GatewayEnvironment::Sandbox.default_base_url().to_string(),
            api_version: GatewayConfig::API_VERSION.to_string(),
            timeout_secs: 15,
            webhook_secret: Some("whsec".to_string()),
            client_url: "http://localhost:5173/".to_string(),
            server_url: "http://localhost:8080".to_string(),
        }
    }

    #[test]
    fn parses_venue_offsets() {
        assert_eq!(parse_utc_offset("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_utc_offset("-0400").unwrap().local_minus_utc(), -14_400);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("05:30").is_none());
        assert!(parse_utc_offset("+5:30").is_none());
        assert!(parse_utc_offset("+25:00").is_none());
    }

    #[test]
    fn missing_credentials_are_misconfiguration() {
        let mut config = gateway();
        config.client_secret = String::new();
        assert!(matches!(config.validate(), Err(GatewayError::Misconfigured(_))));
        assert!(gateway().validate().is_ok());
    }

    #[test]
    fn callback_urls_are_derived_from_public_urls() {
        let config = gateway();
        assert_eq!(
            config.return_url("BX_1"),
            "http://localhost:5173/payment/callback?order_id=BX_1"
        );
        assert_eq!(config.notify_url(), "http://localhost:8080/api/payments/webhook");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", gateway());
        assert!(!rendered.contains("secret\""));
        assert!(!rendered.contains("whsec"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn malformed_numbers_are_rejected_not_defaulted() {
        let error = parse_setting::<u16>("PORT", Some("80a0".to_string()), 8080).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidValue { name: "PORT", ref value } if value == "80a0"
        ));
        assert!(parse_setting::<usize>("SWEEP_BATCH_SIZE", Some("-1".to_string()), 100).is_err());
        assert!(parse_setting::<u16>("PORT", Some("70000".to_string()), 8080).is_err());
    }

    #[test]
    fn unset_or_blank_numbers_take_the_default() {
        assert_eq!(parse_setting::<u16>("PORT", None, 8080).unwrap(), 8080);
        assert_eq!(parse_setting::<u16>("PORT", Some("  ".to_string()), 8080).unwrap(), 8080);
        assert_eq!(parse_setting::<u16>("PORT", Some(" 9000 ".to_string()), 8080).unwrap(), 9000);
    }

    #[test]
    fn environment_selects_base_url() {
        assert_eq!(GatewayEnvironment::parse("PRODUCTION"), GatewayEnvironment::Production);
        assert_eq!(GatewayEnvironment::parse(""), GatewayEnvironment::Sandbox);
        assert_eq!(
            GatewayEnvironment::Production.default_base_url(),
            "https://api.cashfree.com"
        );
    }
}
