//! Bearer credential extraction from the `Authorization` header.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// Literal scheme prefix. Matching is case-sensitive with exactly one space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Longest token accepted, in characters.
pub const MAX_TOKEN_LENGTH: usize = 1000;

/// Extract the bearer token from request headers.
///
/// Returns `None` for a missing, non-UTF-8, or malformed header; callers
/// treat every such case as a missing token.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    parse_bearer(value)
}

/// Parse a raw `Authorization` header value.
///
/// The remainder after `"Bearer "` is returned verbatim; it must be non-empty
/// and at most [`MAX_TOKEN_LENGTH`] characters.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let token = value.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() || token.chars().count() > MAX_TOKEN_LENGTH {
        return None;
    }
    Some(token)
}
