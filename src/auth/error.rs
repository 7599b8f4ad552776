//! Rejection taxonomy and the JSON error responder.
//!
//! Every rejection the gatekeeper emits goes through [`error_response`], so
//! all failure bodies share one shape:
//!
//! ```json
//! {"error": "invalid_token", "error_description": "...", "timestamp": "1760000000"}
//! ```

use axum::http::header::{CONTENT_TYPE, RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::utils::epoch_seconds_string;

/// Why a token was judged invalid.
///
/// Only [`InvalidTokenReason::Expired`] changes the client-facing description;
/// the rest collapse into one generic message so callers cannot tell an
/// unreachable authorization server from a revoked token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTokenReason {
    /// Every introspection attempt failed.
    IntrospectionFailed,
    /// The authorization server reported `active: false`.
    Inactive,
    /// `exp` plus skew is in the past.
    Expired,
    /// A claim cannot be carried in an HTTP header.
    UnrepresentableClaims,
}

impl InvalidTokenReason {
    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntrospectionFailed => "introspection_failed",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::UnrepresentableClaims => "unrepresentable_claims",
        }
    }
}

/// Terminal authentication failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    MissingToken,

    #[error("invalid token ({})", .0.as_str())]
    InvalidToken(InvalidTokenReason),

    #[error("token lacks required scope '{required}'")]
    InsufficientScope { required: String },

    #[error("rate limit of {limit}/min exceeded")]
    RateLimitExceeded { limit: u32, retry_after_secs: u64 },
}

impl AuthError {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope { .. } => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Machine-readable error code placed in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
        }
    }

    /// Human-readable description safe to show to the caller.
    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingToken => "A valid Bearer token is required in the Authorization header",
            Self::InvalidToken(InvalidTokenReason::Expired) => "Token has expired",
            Self::InvalidToken(_) => "The access token is invalid or has been revoked",
            Self::InsufficientScope { .. } => "The access token does not grant the required scope",
            Self::RateLimitExceeded { .. } => "Too many requests. Please retry later.",
        }
    }

    /// Security event name recorded for this rejection.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken(InvalidTokenReason::Expired) => "token_expired",
            Self::InvalidToken(InvalidTokenReason::IntrospectionFailed) => "introspection_failed",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
        }
    }
}

/// JSON body for every rejection.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    pub error_description: &'a str,
    /// Unix epoch seconds as a string.
    pub timestamp: String,
}

/// Build a JSON error response with the given status, code and description.
pub fn error_response(status: StatusCode, code: &str, description: &str) -> Response {
    let body = ErrorBody {
        error: code,
        error_description: description,
        timestamp: epoch_seconds_string(),
    };

    match serde_json::to_vec(&body) {
        Ok(bytes) => (
            status,
            [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            bytes,
        )
            .into_response(),
        // Two &str and a String cannot fail to serialize; keep the status regardless.
        Err(_) => status.into_response(),
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = error_response(self.status(), self.code(), self.description());
        let headers = response.headers_mut();

        match &self {
            Self::MissingToken => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            Self::InvalidToken(_) => {
                headers.insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Bearer error="invalid_token""#),
                );
            }
            Self::InsufficientScope { required } => {
                let challenge = format!(r#"Bearer error="insufficient_scope", scope="{required}""#);
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    headers.insert(WWW_AUTHENTICATE, value);
                }
            }
            Self::RateLimitExceeded {
                limit,
                retry_after_secs,
            } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = error_response(StatusCode::UNAUTHORIZED, "missing_token", "no token");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let json = body_json(response).await;
        assert_eq!(json["error"], "missing_token");
        assert_eq!(json["error_description"], "no token");
        assert!(json["timestamp"].as_str().unwrap().parse::<i64>().is_ok());
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::InvalidToken(InvalidTokenReason::Inactive).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InsufficientScope {
                required: "redsys.api".into()
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::RateLimitExceeded {
                limit: 100,
                retry_after_secs: 10
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_introspection_failure_indistinguishable_from_inactive() {
        let failed = AuthError::InvalidToken(InvalidTokenReason::IntrospectionFailed);
        let inactive = AuthError::InvalidToken(InvalidTokenReason::Inactive);

        assert_eq!(failed.code(), inactive.code());
        assert_eq!(failed.description(), inactive.description());
        assert_eq!(failed.status(), inactive.status());
    }

    #[tokio::test]
    async fn test_expired_description() {
        let response = AuthError::InvalidToken(InvalidTokenReason::Expired).into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_token");
        assert_eq!(json["error_description"], "Token has expired");
    }

    #[test]
    fn test_insufficient_scope_challenge_header() {
        let response = AuthError::InsufficientScope {
            required: "redsys.api".into(),
        }
        .into_response();

        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            r#"Bearer error="insufficient_scope", scope="redsys.api""#
        );
    }

    #[test]
    fn test_rate_limit_headers() {
        let response = AuthError::RateLimitExceeded {
            limit: 100,
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "100");
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "0");
    }
}
