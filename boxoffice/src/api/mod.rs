//! HTTP handlers.

pub mod bookings;
pub mod error;
pub mod events;
pub mod extractors;
pub mod payments;

pub use error::ApiError;
pub use extractors::{ApiJson, ApiPath, AuthenticatedRequester, WebhookSignature};
