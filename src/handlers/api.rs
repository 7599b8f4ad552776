//! Demo API endpoints showing the identity contract.
//!
//! Handlers never see the bearer token. They read the identity the gatekeeper
//! injected, either from the `X-User-*` headers or as an `Extension<Principal>`.

use axum::http::HeaderMap;
use axum::{Extension, Json};

use crate::auth::Principal;
use crate::auth::token::{USER_ID_HEADER, USER_SCOPE_HEADER};
use crate::models::{HelloResponse, MeResponse, SERVICE_NAME};
use crate::utils::epoch_seconds_string;

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// `GET /api/v1/hello`
pub async fn hello(headers: HeaderMap) -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Hello, Redsys Backend API!",
        status: "success",
        service: SERVICE_NAME,
        user_id: header_string(&headers, USER_ID_HEADER),
        user_scope: header_string(&headers, USER_SCOPE_HEADER),
        timestamp: epoch_seconds_string(),
    })
}

/// `GET /api/v1/me`
///
/// Only reachable through the gatekeeper; without an admitted request the
/// extension is missing and axum answers 500.
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse {
        status: "success",
        principal,
        timestamp: epoch_seconds_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_hello_echoes_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("user-1"));
        headers.insert(USER_SCOPE_HEADER, HeaderValue::from_static("redsys.api"));

        let Json(body) = hello(headers).await;
        assert_eq!(body.user_id, "user-1");
        assert_eq!(body.user_scope, "redsys.api");
        assert_eq!(body.service, SERVICE_NAME);
    }

    #[tokio::test]
    async fn test_hello_without_identity() {
        let Json(body) = hello(HeaderMap::new()).await;
        assert!(body.user_id.is_empty());
        assert!(body.user_scope.is_empty());
    }
}
