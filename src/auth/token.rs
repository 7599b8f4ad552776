//! Introspected token claims and the identity forwarded downstream.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Header carrying the token subject to downstream handlers.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the granted scope string.
pub const USER_SCOPE_HEADER: &str = "x-user-scope";
/// Header carrying the OAuth2 client the token was issued to.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
/// Header carrying the token type reported by the authorization server.
pub const TOKEN_TYPE_HEADER: &str = "x-token-type";

/// All identity headers the gatekeeper owns. Inbound copies are stripped.
pub const IDENTITY_HEADERS: [&str; 4] = [
    USER_ID_HEADER,
    USER_SCOPE_HEADER,
    CLIENT_ID_HEADER,
    TOKEN_TYPE_HEADER,
];

/// Result of a successful introspection call.
///
/// Built fresh from each introspection response and never mutated. Fields the
/// authorization server omitted hold their zero value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Whether the token is currently active. `false` makes every other field meaningless.
    pub active: bool,
    /// Space-delimited granted scopes.
    pub scope: String,
    pub client_id: String,
    pub username: String,
    pub token_type: String,
    /// Expiration, Unix seconds. Zero means the server asserted none.
    pub exp: i64,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    pub subject: String,
    pub audience: String,
    pub issuer: String,
    /// Wall-clock time the introspection response was received.
    pub introspected_at: DateTime<Utc>,
}

impl TokenInfo {
    /// A token the server reported as inactive.
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: String::new(),
            client_id: String::new(),
            username: String::new(),
            token_type: String::new(),
            exp: 0,
            iat: 0,
            subject: String::new(),
            audience: String::new(),
            issuer: String::new(),
            introspected_at: Utc::now(),
        }
    }

    /// Iterate the granted scopes as a set of whitespace-separated tokens.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    /// Identity to forward downstream. Excludes the token itself and its expiry.
    pub fn principal(&self) -> Principal {
        Principal {
            subject: self.subject.clone(),
            scope: self.scope.clone(),
            client_id: self.client_id.clone(),
            token_type: self.token_type.clone(),
        }
    }
}

/// Authenticated caller identity.
///
/// Injected into the request both as headers and as a request extension, so
/// axum handlers can take `Extension<Principal>` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub scope: String,
    pub client_id: String,
    pub token_type: String,
}

impl Principal {
    /// Header name/value pairs in injection order.
    pub fn header_pairs(&self) -> [(&'static str, &str); 4] {
        [
            (USER_ID_HEADER, self.subject.as_str()),
            (USER_SCOPE_HEADER, self.scope.as_str()),
            (CLIENT_ID_HEADER, self.client_id.as_str()),
            (TOKEN_TYPE_HEADER, self.token_type.as_str()),
        ]
    }
}
