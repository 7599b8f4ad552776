//! RFC 7662 token introspection client with bounded retry.
//!
//! # Protocol
//!
//! Each attempt is a form-encoded `POST`:
//!
//! ```text
//! POST <INTROSPECTION_URL>
//! Content-Type: application/x-www-form-urlencoded
//!
//! token=<token>&client_id=<id>&client_secret=<secret>
//! ```
//!
//! # Retry Policy
//!
//! Up to `max_retries` attempts. An attempt fails, and is retried, on:
//!
//! - transport errors (connect, TLS, reset) and per-attempt timeouts
//! - any non-2xx status
//! - a body that is not a JSON object
//!
//! A JSON object that is malformed but parseable is *not* a failure: absent
//! fields and fields of the wrong type take their zero value, so `{}` or
//! `{"active": "yes"}` is a valid answer meaning "inactive". Timestamps are
//! accepted as integers or floats.
//!
//! Between attempts the client sleeps an exponential backoff with ±20% jitter.
//! When every attempt fails the caller receives
//! [`IntrospectionError::Exhausted`]; the gatekeeper reports that to clients
//! exactly like an inactive token.

use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument};

use super::audit::{AttemptOutcome, SecurityEventLogger, token_fingerprint};
use super::token::TokenInfo;
use crate::config::Config;
use crate::error::AppResult;
use crate::metrics;

/// Jitter percentage for exponential backoff (±20%).
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

/// Upper bound on the wait between two attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Failure of one attempt, or of the whole introspection call.
#[derive(Error, Debug)]
pub enum IntrospectionError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    #[error("response body is not a JSON object: {0}")]
    Malformed(String),

    #[error("all {attempts} introspection attempts failed; last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<IntrospectionError>,
    },
}

/// `aud` is a string or an array of strings depending on the server.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

/// Wire shape of an introspection response. Every field is optional; `null`
/// and values of the wrong type are treated the same as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IntrospectionResponse {
    #[serde(deserialize_with = "lenient")]
    active: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    scope: Option<String>,
    #[serde(deserialize_with = "lenient")]
    client_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    username: Option<String>,
    #[serde(deserialize_with = "lenient")]
    token_type: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    exp: Option<i64>,
    #[serde(deserialize_with = "lenient_timestamp")]
    iat: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    sub: Option<String>,
    #[serde(deserialize_with = "lenient")]
    aud: Option<Audience>,
    #[serde(deserialize_with = "lenient")]
    iss: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Unix seconds as an integer, or a float truncated toward zero.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Number(number) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(number.as_i64().or_else(|| {
        number
            .as_f64()
            .filter(|secs| secs.is_finite())
            .map(|secs| secs as i64)
    }))
}

impl IntrospectionResponse {
    fn into_token_info(self) -> TokenInfo {
        let audience = match self.aud {
            Some(Audience::One(aud)) => aud,
            Some(Audience::Many(auds)) => auds.join(" "),
            None => String::new(),
        };

        TokenInfo {
            active: self.active.unwrap_or(false),
            scope: self.scope.unwrap_or_default(),
            client_id: self.client_id.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
            token_type: self.token_type.unwrap_or_default(),
            exp: self.exp.unwrap_or(0),
            iat: self.iat.unwrap_or(0),
            subject: self.sub.unwrap_or_default(),
            audience,
            issuer: self.iss.unwrap_or_default(),
            introspected_at: Utc::now(),
        }
    }
}

/// Parse a response body into [`TokenInfo`].
///
/// Fails only when the body is not a JSON object.
pub fn parse_introspection_body(body: &[u8]) -> Result<TokenInfo, IntrospectionError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| IntrospectionError::Malformed(e.to_string()))?;

    if !value.is_object() {
        return Err(IntrospectionError::Malformed(
            "top-level value is not an object".to_string(),
        ));
    }

    let response: IntrospectionResponse = serde_json::from_value(value)
        .map_err(|e| IntrospectionError::Malformed(e.to_string()))?;

    Ok(response.into_token_info())
}

/// Client for the authorization server's introspection endpoint.
///
/// Cheap to clone: the underlying `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct IntrospectionClient {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
    attempt_timeout: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
    audit: SecurityEventLogger,
}

impl std::fmt::Debug for IntrospectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionClient")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("attempt_timeout", &self.attempt_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl IntrospectionClient {
    /// Build a client from configuration with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HttpClient` if the TLS backend cannot be initialized.
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.introspection_timeout)
            .user_agent(concat!("redsys-gatekeeper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_http_client(http, config))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_http_client(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            endpoint: config.introspection_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            attempt_timeout: config.introspection_timeout,
            max_attempts: config.max_retries.max(1),
            retry_base_delay: config.retry_base_delay,
            audit: SecurityEventLogger::new(),
        }
    }

    /// Introspect a token, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Exhausted`] once every attempt has failed.
    #[instrument(skip_all, fields(token = %token_fingerprint(token)))]
    pub async fn introspect(&self, token: &str) -> Result<TokenInfo, IntrospectionError> {
        let fingerprint = token_fingerprint(token);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.backoff_delay(attempt - 1);
                if !delay.is_zero() {
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                    sleep(delay).await;
                }
            }

            let started = Instant::now();
            let result = self.attempt(token).await;
            metrics::record_introspection_duration(started.elapsed().as_secs_f64());

            match result {
                Ok(info) => {
                    metrics::record_introspection_attempt("success");
                    self.audit.introspection_attempt(
                        &fingerprint,
                        attempt,
                        self.max_attempts,
                        &AttemptOutcome::Success {
                            active: info.active,
                        },
                    );
                    return Ok(info);
                }
                Err(e) => {
                    metrics::record_introspection_attempt("failure");
                    self.audit.introspection_attempt(
                        &fingerprint,
                        attempt,
                        self.max_attempts,
                        &AttemptOutcome::Failure {
                            reason: e.to_string(),
                        },
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(IntrospectionError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(last_error.unwrap_or(IntrospectionError::Malformed(
                "no attempt was made".to_string(),
            ))),
        })
    }

    /// One bounded request/response exchange.
    async fn attempt(&self, token: &str) -> Result<TokenInfo, IntrospectionError> {
        // reqwest's own timeout covers the exchange too; this one also bounds
        // body parsing and surfaces a distinct error.
        timeout(self.attempt_timeout, self.exchange(token))
            .await
            .map_err(|_| IntrospectionError::Timeout(self.attempt_timeout))?
    }

    async fn exchange(&self, token: &str) -> Result<TokenInfo, IntrospectionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.attempt_timeout)
            .form(&[
                ("token", token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntrospectionError::Status(status));
        }

        let body = response.bytes().await?;
        parse_introspection_body(&body)
    }

    /// Delay before retry number `retry` (1-based), with jitter applied.
    fn backoff_delay(&self, retry: u32) -> Duration {
        let base_ms = self.retry_base_delay.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }

        let delay_ms = base_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)))
            .min(MAX_RETRY_DELAY.as_millis() as u64);
        let jitter = (delay_ms as f64 * BACKOFF_JITTER_PERCENT * (rand_jitter() * 2.0 - 1.0)) as i64;

        Duration::from_millis((delay_ms as i64 + jitter).max(0) as u64)
    }
}

/// Random value in `[0.0, 1.0)` from the thread-local RNG.
fn rand_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random::<f64>()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let body = br#"{
            "active": true,
            "scope": "redsys.api openid",
            "client_id": "marketplace-web",
            "username": "alice",
            "token_type": "access_token",
            "exp": 1760003600,
            "iat": 1760000000,
            "sub": "user-1",
            "aud": "redsys",
            "iss": "https://auth.redsys.local/"
        }"#;

        let info = parse_introspection_body(body).unwrap();
        assert!(info.active);
        assert_eq!(info.scope, "redsys.api openid");
        assert_eq!(info.subject, "user-1");
        assert_eq!(info.exp, 1_760_003_600);
        assert_eq!(info.audience, "redsys");
        assert_eq!(info.issuer, "https://auth.redsys.local/");
    }

    #[test]
    fn test_parse_missing_fields_default_to_zero_values() {
        let info = parse_introspection_body(b"{}").unwrap();
        assert!(!info.active);
        assert!(info.scope.is_empty());
        assert_eq!(info.exp, 0);
        assert_eq!(info.iat, 0);
    }

    #[test]
    fn test_parse_null_fields_default_to_zero_values() {
        let info = parse_introspection_body(br#"{"active": true, "scope": null, "exp": null}"#)
            .unwrap();
        assert!(info.active);
        assert!(info.scope.is_empty());
        assert_eq!(info.exp, 0);
    }

    #[test]
    fn test_parse_audience_array() {
        let info = parse_introspection_body(br#"{"active": true, "aud": ["redsys", "billing"]}"#)
            .unwrap();
        assert_eq!(info.audience, "redsys billing");
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let bodies: [&[u8]; 5] = [b"[]", b"null", b"\"active\"", b"not json", b""];
        for body in bodies {
            assert!(
                matches!(
                    parse_introspection_body(body),
                    Err(IntrospectionError::Malformed(_))
                ),
                "body {:?} should be rejected",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_parse_wrong_field_types_default_to_zero_values() {
        let info =
            parse_introspection_body(br#"{"active": "yes", "aud": 123, "sub": 7, "exp": "soon"}"#)
                .unwrap();
        assert!(!info.active);
        assert!(info.audience.is_empty());
        assert!(info.subject.is_empty());
        assert_eq!(info.exp, 0);

        let info =
            parse_introspection_body(br#"{"active": true, "scope": ["redsys.api"]}"#).unwrap();
        assert!(info.active);
        assert!(info.scope.is_empty());
    }

    #[test]
    fn test_parse_float_timestamps() {
        let info = parse_introspection_body(
            br#"{"active": true, "exp": 4102444800.0, "iat": 1760000000.75}"#,
        )
        .unwrap();
        assert_eq!(info.exp, 4_102_444_800);
        assert_eq!(info.iat, 1_760_000_000);
    }

    #[test]
    fn test_backoff_disabled_with_zero_base() {
        let config = Config {
            retry_base_delay: Duration::ZERO,
            ..Config::default()
        };
        let client = IntrospectionClient::with_http_client(reqwest::Client::new(), &config);
        assert_eq!(client.backoff_delay(1), Duration::ZERO);
        assert_eq!(client.backoff_delay(5), Duration::ZERO);
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let config = Config {
            retry_base_delay: Duration::from_millis(100),
            ..Config::default()
        };
        let client = IntrospectionClient::with_http_client(reqwest::Client::new(), &config);

        let first = client.backoff_delay(1).as_millis();
        assert!((80..=120).contains(&first), "first delay {first}ms out of range");

        let second = client.backoff_delay(2).as_millis();
        assert!((160..=240).contains(&second), "second delay {second}ms out of range");

        let capped = client.backoff_delay(30);
        assert!(capped <= MAX_RETRY_DELAY + MAX_RETRY_DELAY / 5);
    }

    #[test]
    fn test_zero_retries_still_makes_one_attempt() {
        let config = Config {
            max_retries: 0,
            ..Config::default()
        };
        let client = IntrospectionClient::with_http_client(reqwest::Client::new(), &config);
        assert_eq!(client.max_attempts, 1);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config {
            client_secret: "hunter2".to_string(),
            ..Config::default()
        };
        let client = IntrospectionClient::with_http_client(reqwest::Client::new(), &config);
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_rand_jitter_returns_value_in_range() {
        for _ in 0..100 {
            let jitter = rand_jitter();
            assert!((0.0..1.0).contains(&jitter));
        }
    }
}
