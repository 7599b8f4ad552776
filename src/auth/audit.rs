//! Security audit trail.
//!
//! Every decision point of the gatekeeper produces a [`SecurityEvent`], written
//! through `tracing` under the `security_audit` target so operators can route
//! audit lines to a dedicated sink with an `EnvFilter` directive such as
//! `security_audit=info`. Introspection attempts are recorded separately under
//! `security_audit::introspection`; those records carry a token fingerprint,
//! never the token.
//!
//! Emitting a `tracing` event cannot fail, so logging never affects the
//! outcome of a request.

use axum::http::Request;
use axum::http::header::USER_AGENT;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Event name for an admitted request.
pub const AUTHENTICATION_SUCCESS: &str = "authentication_success";

/// Per-request context captured once and shared by every event for that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
    pub path: String,
    pub method: String,
    pub user_agent: String,
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Capture audit context from a request and its resolved client address.
    pub fn from_request<B>(req: &Request<B>, client_ip: String) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            client_ip,
            path: req.uri().path().to_string(),
            method: req.method().to_string(),
            user_agent: header(USER_AGENT.as_str()).unwrap_or_default(),
            request_id: header("x-request-id"),
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone)]
pub struct SecurityEvent {
    pub name: &'static str,
    pub client_ip: String,
    pub path: String,
    pub method: String,
    pub user_agent: String,
    pub request_id: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(name: &'static str, ctx: &RequestContext, detail: Option<String>) -> Self {
        Self {
            name,
            client_ip: ctx.client_ip.clone(),
            path: ctx.path.clone(),
            method: ctx.method.clone(),
            user_agent: ctx.user_agent.clone(),
            request_id: ctx.request_id.clone(),
            detail,
            timestamp: Utc::now(),
        }
    }

    /// Success events are informational; everything else is a warning.
    pub fn is_success(&self) -> bool {
        self.name == AUTHENTICATION_SUCCESS
    }
}

/// Outcome of a single introspection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Response parsed; `active` as reported by the server.
    Success { active: bool },
    /// Attempt failed and may be retried.
    Failure { reason: String },
}

/// Append-only security logger.
///
/// Stateless and cheap to copy; held by the gatekeeper and the introspection
/// client so both write to the same audit target.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityEventLogger;

impl SecurityEventLogger {
    pub fn new() -> Self {
        Self
    }

    /// Write a pipeline-level security event.
    pub fn record(&self, event: &SecurityEvent) {
        let timestamp = event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let detail = event.detail.as_deref().unwrap_or("");
        let request_id = event.request_id.as_deref().unwrap_or("");

        if event.is_success() {
            info!(
                target: "security_audit",
                event = event.name,
                timestamp = %timestamp,
                client_ip = %event.client_ip,
                method = %event.method,
                path = %event.path,
                user_agent = %event.user_agent,
                request_id,
                detail,
                "security event"
            );
        } else {
            warn!(
                target: "security_audit",
                event = event.name,
                timestamp = %timestamp,
                client_ip = %event.client_ip,
                method = %event.method,
                path = %event.path,
                user_agent = %event.user_agent,
                request_id,
                detail,
                "security event"
            );
        }
    }

    /// Write a token-introspection attempt record.
    pub fn introspection_attempt(
        &self,
        token_fingerprint: &str,
        attempt: u32,
        max_attempts: u32,
        outcome: &AttemptOutcome,
    ) {
        match outcome {
            AttemptOutcome::Success { active } => info!(
                target: "security_audit::introspection",
                token = token_fingerprint,
                attempt,
                max_attempts,
                active,
                "token introspection succeeded"
            ),
            AttemptOutcome::Failure { reason } => warn!(
                target: "security_audit::introspection",
                token = token_fingerprint,
                attempt,
                max_attempts,
                reason = %reason,
                "token introspection failed"
            ),
        }
    }
}

/// Short, non-reversible token identifier for log correlation.
pub fn token_fingerprint(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
        .chars()
        .take(12)
        .collect()
}
