use serde::Serialize;

use crate::auth::Principal;

/// Name reported by every response body of this service.
pub const SERVICE_NAME: &str = "redsys-backend";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: &'static str,
    pub service: &'static str,
    /// Service version
    pub version: &'static str,
    /// Seconds since the process started
    pub uptime_seconds: u64,
    /// Unix epoch seconds as a string
    pub timestamp: String,
}

/// Public greeting.
///
/// `user_id` and `user_scope` echo the identity headers as the handler sees
/// them; on a bypassed path they are always empty.
#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub service: &'static str,
    pub user_id: String,
    pub user_scope: String,
    pub timestamp: String,
}

/// Identity of the authenticated caller.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub principal: Principal,
    pub timestamp: String,
}
