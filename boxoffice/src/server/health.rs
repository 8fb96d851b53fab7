//! Liveness and readiness endpoints.

use super::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Liveness check.
///
/// Returns 200 whenever the process is serving; dependencies are not checked.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness
    pub ready: bool,
    /// Booking storage reachable
    pub database: bool,
}

/// Readiness check.
///
/// Returns 503 until the booking store answers.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match state.ledger().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed: booking store unreachable");
            false
        },
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: database,
            database,
        }),
    )
}
