//! Request extractors.
//!
//! Authentication happens upstream; by the time a request reaches this
//! service the caller's identity travels in headers:
//!
//! - `x-requester-id` (UUID, required)
//! - `x-requester-name`, `x-requester-email`, `x-requester-phone` (optional)
//!
//! [`ApiJson`] and [`ApiPath`] wrap axum's body and path extractors so that
//! malformed input is answered with the same JSON error body as every other
//! failure.

use super::error::ApiError;
use crate::types::{Requester, RequesterId};
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request,
    },
    http::{request::Parts, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Requester id header
pub const REQUESTER_ID_HEADER: &str = "x-requester-id";
/// Requester name header
pub const REQUESTER_NAME_HEADER: &str = "x-requester-name";
/// Requester email header
pub const REQUESTER_EMAIL_HEADER: &str = "x-requester-email";
/// Requester phone header
pub const REQUESTER_PHONE_HEADER: &str = "x-requester-phone";

/// Webhook signature header
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Signature header name used by the Cashfree dashboard
pub const SIGNATURE_HEADER_ALIAS: &str = "x-cashfree-signature";

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedRequester(pub Requester);

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedRequester
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(&parts.headers, REQUESTER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let id = Uuid::parse_str(&id)
            .map_err(|_| ApiError::unauthorized("Invalid requester id"))?;

        Ok(Self(Requester {
            id: RequesterId::from_uuid(id),
            name: header(&parts.headers, REQUESTER_NAME_HEADER),
            email: header(&parts.headers, REQUESTER_EMAIL_HEADER),
            phone: header(&parts.headers, REQUESTER_PHONE_HEADER),
        }))
    }
}

/// Signature sent with a webhook, from either header name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignature(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for WebhookSignature
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            header(&parts.headers, SIGNATURE_HEADER)
                .or_else(|| header(&parts.headers, SIGNATURE_HEADER_ALIAS)),
        ))
    }
}

/// JSON request body; rejections become [`ApiError`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let code = match &rejection {
            JsonRejection::MissingJsonContentType(_) => "UNSUPPORTED_MEDIA_TYPE",
            JsonRejection::JsonDataError(_) => "VALIDATION_ERROR",
            _ => "INVALID_BODY",
        };
        Self::new(rejection.status(), code, rejection.body_text())
    }
}

/// Path parameters; rejections become [`ApiError`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        let code = match &rejection {
            PathRejection::FailedToDeserializePathParams(_) => "INVALID_PATH",
            _ => "INTERNAL_SERVER_ERROR",
        };
        Self::new(rejection.status(), code, rejection.body_text())
    }
}
