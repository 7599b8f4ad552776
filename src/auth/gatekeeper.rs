//! Authentication pipeline.
//!
//! ```text
//! strip identity headers
//!   → PathBypass ─────────────────────────────────────────→ Bypassed
//!   → RateCheck       (429 rate_limit_exceeded)
//!   → Extract         (401 missing_token)
//!   → Introspect      (401 invalid_token: failure or inactive)
//!   → ExpirationCheck (401 invalid_token: "Token has expired")
//!   → ScopeCheck      (403 insufficient_scope)
//!   → Admit: inject identity headers ────────────────────→ Admitted
//! ```
//!
//! Every terminal state writes one security event and one metrics sample.
//! The pipeline is sequential within a request; the only suspension point is
//! the introspection call.

use std::collections::HashSet;
use std::time::Instant;

use axum::http::{HeaderName, HeaderValue, Request};
use tracing::debug;

use super::audit::{AUTHENTICATION_SUCCESS, RequestContext, SecurityEvent, SecurityEventLogger};
use super::cache::TokenCache;
use super::error::{AuthError, InvalidTokenReason};
use super::extract::extract_bearer;
use super::introspection::IntrospectionClient;
use super::token::{IDENTITY_HEADERS, Principal, TokenInfo};
use super::validator::{has_scope, is_unexpired};
use crate::config::Config;
use crate::metrics;
use crate::middleware::ip::resolve_client_ip;
use crate::middleware::rate_limit::{FixedWindowLimiter, RateDecision, TrustedProxyConfig};
use crate::utils::epoch_seconds;

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Public path; forwarded without authentication.
    Bypassed,
    /// Authenticated; identity headers have been injected.
    Admitted(Principal),
    /// Terminal rejection to be rendered as the response.
    Rejected(AuthError),
}

/// Entries removed by one [`Gatekeeper::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub rate_windows: usize,
    pub cache_entries: usize,
}

/// The per-process authentication pipeline, shared by every request.
#[derive(Debug)]
pub struct Gatekeeper {
    introspector: IntrospectionClient,
    cache: Option<TokenCache>,
    limiter: Option<FixedWindowLimiter>,
    trusted_proxies: TrustedProxyConfig,
    bypass_paths: HashSet<String>,
    required_scope: String,
    audit: SecurityEventLogger,
}

impl Gatekeeper {
    pub fn new(config: &Config, introspector: IntrospectionClient) -> Self {
        let cache = config
            .token_cache_enabled()
            .then(|| TokenCache::new(config.token_cache_ttl));
        // A zero limit is the "disabled" setting.
        let limiter =
            FixedWindowLimiter::new(config.rate_limit_per_minute, config.api_path_prefix.clone())
                .ok();
        let trusted_proxies = TrustedProxyConfig::new(&config.trusted_proxies);

        debug!(
            bypass_paths = ?config.auth_bypass_paths,
            required_scope = %config.required_scope,
            rate_limiting = limiter.is_some(),
            token_cache = cache.is_some(),
            trusted_proxies = trusted_proxies.is_enabled(),
            "Gatekeeper configured"
        );

        Self {
            introspector,
            cache,
            limiter,
            trusted_proxies,
            bypass_paths: config.auth_bypass_paths.iter().cloned().collect(),
            required_scope: config.required_scope.clone(),
            audit: SecurityEventLogger::new(),
        }
    }

    /// Run the pipeline over `req`.
    ///
    /// Inbound identity headers are always removed. On admission the verified
    /// identity is written back as headers and as a [`Principal`] extension.
    pub async fn evaluate<B>(&self, req: &mut Request<B>) -> AuthDecision {
        strip_identity_headers(req);

        if self.is_bypass_path(req.uri().path()) {
            debug!(path = %req.uri().path(), "Public path, authentication bypassed");
            metrics::record_auth_decision("bypassed", "");
            return AuthDecision::Bypassed;
        }

        let client_ip = resolve_client_ip(req, &self.trusted_proxies).into_owned();
        let ctx = RequestContext::from_request(req, client_ip);
        let token = extract_bearer(req.headers()).map(str::to_owned);

        match self.authenticate(token.as_deref(), &ctx).await {
            Ok(info) => match inject_identity(req, &info) {
                Ok(principal) => {
                    self.audit.record(&SecurityEvent::new(
                        AUTHENTICATION_SUCCESS,
                        &ctx,
                        Some(format!("subject={}", principal.subject)),
                    ));
                    metrics::record_auth_decision("admitted", "");
                    AuthDecision::Admitted(principal)
                }
                Err(err) => self.reject(&ctx, err, Some("claim not encodable as header")),
            },
            Err((err, detail)) => self.reject(&ctx, err, detail.as_deref()),
        }
    }

    /// Rate check through scope check. Returns the validated token or the
    /// rejection with an audit detail.
    async fn authenticate(
        &self,
        token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<TokenInfo, (AuthError, Option<String>)> {
        if let Some(limiter) = &self.limiter
            && let RateDecision::Reject {
                limit,
                class,
                retry_after_secs,
            } = limiter.check(&ctx.client_ip, &ctx.path).await
        {
            metrics::record_rate_limited(class.as_str());
            return Err((
                AuthError::RateLimitExceeded {
                    limit,
                    retry_after_secs,
                },
                Some(format!("class={} limit={limit}", class.as_str())),
            ));
        }

        let Some(token) = token else {
            return Err((AuthError::MissingToken, None));
        };

        let info = self.lookup(token).await?;
        let now = epoch_seconds();

        if !info.active {
            return Err((
                AuthError::InvalidToken(InvalidTokenReason::Inactive),
                Some("token inactive".to_string()),
            ));
        }

        if !is_unexpired(&info, now) {
            return Err((
                AuthError::InvalidToken(InvalidTokenReason::Expired),
                Some(format!("exp={} now={now}", info.exp)),
            ));
        }

        if !has_scope(&info, &self.required_scope) {
            return Err((
                AuthError::InsufficientScope {
                    required: self.required_scope.clone(),
                },
                Some(format!("granted='{}'", info.scope)),
            ));
        }

        Ok(info)
    }

    /// Cache first, then the authorization server.
    async fn lookup(&self, token: &str) -> Result<TokenInfo, (AuthError, Option<String>)> {
        let now = epoch_seconds();

        if let Some(cache) = &self.cache
            && let Some(info) = cache.get(token, now).await
        {
            metrics::record_token_cache_hit();
            return Ok(info);
        }

        let info = self.introspector.introspect(token).await.map_err(|e| {
            (
                AuthError::InvalidToken(InvalidTokenReason::IntrospectionFailed),
                Some(e.to_string()),
            )
        })?;

        if let Some(cache) = &self.cache {
            cache.insert(token, &info, now).await;
        }
        Ok(info)
    }

    fn reject(&self, ctx: &RequestContext, err: AuthError, detail: Option<&str>) -> AuthDecision {
        self.audit.record(&SecurityEvent::new(
            err.event_name(),
            ctx,
            detail.map(str::to_string),
        ));
        metrics::record_auth_decision("rejected", err.code());
        AuthDecision::Rejected(err)
    }

    /// Evict expired rate windows and cache entries.
    pub async fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        let mut tracked_windows = 0;
        let mut cached = 0;

        if let Some(limiter) = &self.limiter {
            stats.rate_windows = limiter.evict_expired(Instant::now()).await;
            tracked_windows = limiter.tracked().await;
        }
        if let Some(cache) = &self.cache {
            stats.cache_entries = cache.evict_expired(epoch_seconds()).await;
            cached = cache.len().await;
        }

        metrics::set_tracked_state(tracked_windows, cached);
        stats
    }

    pub fn is_bypass_path(&self, path: &str) -> bool {
        self.bypass_paths.contains(path)
    }
}

fn strip_identity_headers<B>(req: &mut Request<B>) {
    let headers = req.headers_mut();
    for name in IDENTITY_HEADERS {
        if headers.remove(name).is_some() {
            debug!(header = name, "Stripped inbound identity header");
        }
    }
}

/// Write the verified identity into the request.
///
/// All values are encoded before any is inserted, so a failure leaves the
/// request without identity headers.
fn inject_identity<B>(req: &mut Request<B>, info: &TokenInfo) -> Result<Principal, AuthError> {
    let principal = info.principal();

    let mut encoded = Vec::with_capacity(IDENTITY_HEADERS.len());
    for (name, value) in principal.header_pairs() {
        let value = HeaderValue::from_str(value)
            .map_err(|_| AuthError::InvalidToken(InvalidTokenReason::UnrepresentableClaims))?;
        encoded.push((HeaderName::from_static(name), value));
    }

    let headers = req.headers_mut();
    for (name, value) in encoded {
        headers.insert(name, value);
    }
    req.extensions_mut().insert(principal.clone());

    Ok(principal)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "opaque-token-1";

    fn config(introspection_url: String) -> Config {
        Config {
            introspection_url,
            retry_base_delay: Duration::ZERO,
            introspection_timeout: Duration::from_millis(500),
            ..Config::default()
        }
    }

    fn gatekeeper(config: &Config) -> Gatekeeper {
        let client = IntrospectionClient::with_http_client(reqwest::Client::new(), config);
        Gatekeeper::new(config, client)
    }

    fn request(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn mock_introspection(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    fn active_body(scope: &str) -> serde_json::Value {
        serde_json::json!({
            "active": true,
            "sub": "user-1",
            "scope": scope,
            "client_id": "marketplace-web",
            "token_type": "Bearer",
            "exp": epoch_seconds() + 3600,
        })
    }

    #[tokio::test]
    async fn test_bypass_ignores_credentials_and_strips_spoofed_identity() {
        // Unroutable endpoint: a bypass must never introspect.
        let gk = gatekeeper(&config("http://127.0.0.1:9/introspect".into()));
        let mut req = request("/health", Some("Basic Zm9vOmJhcg=="));
        req.headers_mut()
            .insert("x-user-id", HeaderValue::from_static("admin"));

        assert_eq!(gk.evaluate(&mut req).await, AuthDecision::Bypassed);
        assert!(req.headers().get("x-user-id").is_none());
    }

    #[tokio::test]
    async fn test_bypass_is_exact_match() {
        let gk = gatekeeper(&config("http://127.0.0.1:9/introspect".into()));
        assert!(gk.is_bypass_path("/health"));
        assert!(!gk.is_bypass_path("/health/"));
        assert!(!gk.is_bypass_path("/HEALTH"));

        let mut req = request("/health/", None);
        assert_eq!(
            gk.evaluate(&mut req).await,
            AuthDecision::Rejected(AuthError::MissingToken)
        );
    }

    #[tokio::test]
    async fn test_missing_and_malformed_bearer() {
        let gk = gatekeeper(&config("http://127.0.0.1:9/introspect".into()));

        for auth in [None, Some("bearer abc"), Some("Bearer "), Some("Token abc")] {
            let mut req = request("/api/v1/jobs", auth);
            assert_eq!(
                gk.evaluate(&mut req).await,
                AuthDecision::Rejected(AuthError::MissingToken),
                "auth header {auth:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_admit_injects_identity() {
        let server = mock_introspection(active_body("redsys.api jobs:read")).await;
        let gk = gatekeeper(&config(format!("{}/introspect", server.uri())));

        let mut req = request("/api/v1/jobs", Some(&format!("Bearer {TOKEN}")));
        req.headers_mut()
            .insert("x-user-id", HeaderValue::from_static("spoofed"));

        let decision = gk.evaluate(&mut req).await;
        let AuthDecision::Admitted(principal) = decision else {
            panic!("expected admission, got {decision:?}");
        };
        assert_eq!(principal.subject, "user-1");
        assert_eq!(req.headers().get("x-user-id").unwrap(), "user-1");
        assert_eq!(
            req.headers().get("x-user-scope").unwrap(),
            "redsys.api jobs:read"
        );
        assert_eq!(req.headers().get("x-client-id").unwrap(), "marketplace-web");
        assert_eq!(req.headers().get("x-token-type").unwrap(), "Bearer");
        assert_eq!(req.extensions().get::<Principal>(), Some(&principal));
    }

    #[tokio::test]
    async fn test_inactive_token_rejected() {
        let server = mock_introspection(serde_json::json!({"active": false})).await;
        let gk = gatekeeper(&config(format!("{}/introspect", server.uri())));

        let mut req = request("/api/v1/jobs", Some("Bearer revoked"));
        assert_eq!(
            gk.evaluate(&mut req).await,
            AuthDecision::Rejected(AuthError::InvalidToken(InvalidTokenReason::Inactive))
        );
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let server = mock_introspection(serde_json::json!({
            "active": true,
            "scope": "redsys.api",
            "exp": epoch_seconds() - 301,
        }))
        .await;
        let gk = gatekeeper(&config(format!("{}/introspect", server.uri())));

        let mut req = request("/api/v1/jobs", Some("Bearer old"));
        assert_eq!(
            gk.evaluate(&mut req).await,
            AuthDecision::Rejected(AuthError::InvalidToken(InvalidTokenReason::Expired))
        );
    }

    #[tokio::test]
    async fn test_wrong_scope_rejected() {
        let server = mock_introspection(active_body("other.scope")).await;
        let gk = gatekeeper(&config(format!("{}/introspect", server.uri())));

        let mut req = request("/api/v1/jobs", Some("Bearer t"));
        assert_eq!(
            gk.evaluate(&mut req).await,
            AuthDecision::Rejected(AuthError::InsufficientScope {
                required: "redsys.api".into()
            })
        );
        assert!(req.headers().get("x-user-id").is_none());
    }

    #[tokio::test]
    async fn test_unencodable_claim_fails_closed() {
        let mut body = active_body("redsys.api");
        body["sub"] = serde_json::json!("user\nX-Admin: true");
        let server = mock_introspection(body).await;
        let gk = gatekeeper(&config(format!("{}/introspect", server.uri())));

        let mut req = request("/api/v1/jobs", Some("Bearer t"));
        assert_eq!(
            gk.evaluate(&mut req).await,
            AuthDecision::Rejected(AuthError::InvalidToken(
                InvalidTokenReason::UnrepresentableClaims
            ))
        );
        assert!(req.headers().get("x-user-scope").is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_token() {
        let cfg = Config {
            rate_limit_per_minute: 2,
            ..config("http://127.0.0.1:9/introspect".into())
        };
        let gk = gatekeeper(&cfg);

        for _ in 0..2 {
            let mut req = request("/api/v1/jobs", None);
            assert_eq!(
                gk.evaluate(&mut req).await,
                AuthDecision::Rejected(AuthError::MissingToken)
            );
        }

        let mut req = request("/api/v1/jobs", None);
        assert!(matches!(
            gk.evaluate(&mut req).await,
            AuthDecision::Rejected(AuthError::RateLimitExceeded { limit: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_cache_avoids_second_introspection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(active_body("redsys.api")))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = Config {
            token_cache_ttl: Duration::from_secs(60),
            ..config(server.uri())
        };
        let gk = gatekeeper(&cfg);

        for _ in 0..3 {
            let mut req = request("/api/v1/jobs", Some("Bearer cached"));
            assert!(matches!(
                gk.evaluate(&mut req).await,
                AuthDecision::Admitted(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_sweep_without_state_is_empty() {
        let cfg = Config {
            rate_limit_per_minute: 0,
            ..config("http://127.0.0.1:9/introspect".into())
        };
        let gk = gatekeeper(&cfg);
        assert_eq!(gk.sweep().await, SweepStats::default());
    }
}
