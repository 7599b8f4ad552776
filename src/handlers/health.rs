//! Health and readiness endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness with version and uptime
//! - `GET /ready` - Kubernetes-compatible readiness probe
//!
//! Both are public by default (`AUTH_BYPASS_PATHS`).

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::instrument;

use crate::models::{HealthResponse, SERVICE_NAME};
use crate::state::AppState;
use crate::utils::epoch_seconds_string;

/// Health check endpoint. Always returns 200 OK.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "redsys-backend",
///   "version": "0.1.0",
///   "uptime_seconds": 42,
///   "timestamp": "1760000000"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        timestamp: epoch_seconds_string(),
    })
}

/// Readiness check endpoint for Kubernetes probes.
///
/// Returns 503 once shutdown has begun so load balancers drain the instance.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.is_shutting_down() {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(StatusCode::OK)
    }
}
