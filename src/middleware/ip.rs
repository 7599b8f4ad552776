//! Client address resolution for rate limiting and audit records.
//!
//! # Resolution Order
//!
//! 1. If the TCP peer (from axum's `ConnectInfo`) is inside `TRUSTED_PROXIES`,
//!    or the peer is unknown, forwarding headers are consulted:
//!    - `X-Forwarded-For` (first entry of the comma-separated list)
//!    - `X-Real-IP`
//! 2. Otherwise, or when no forwarding header is present, the peer address.
//! 3. [`UNKNOWN_IP`] when nothing is available.
//!
//! With `TRUSTED_PROXIES` unset no peer is trusted, so a directly connected
//! client is always keyed by its socket address. Deployments behind a proxy
//! must list the proxy networks.
//!
//! ```nginx
//! # nginx: overwrite, never append
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::debug;

use super::rate_limit::TrustedProxyConfig;

/// Fallback key when no client address can be determined.
///
/// All such requests share one rate window.
pub const UNKNOWN_IP: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardedIp<'a> {
    FromXff(&'a str),
    FromRealIp(&'a str),
    NotFound,
}

#[inline]
fn forwarded_ip<B>(req: &Request<B>) -> ForwardedIp<'_> {
    // Format: "client, proxy1, proxy2"
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next()
        && !first_ip.trim().is_empty()
    {
        return ForwardedIp::FromXff(first_ip.trim());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return ForwardedIp::FromRealIp(value.trim());
    }

    ForwardedIp::NotFound
}

/// TCP peer address, present when the server was started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Resolve the client address used as the rate-limit key.
///
/// Returns a borrowed [`UNKNOWN_IP`] when nothing can be determined.
pub fn resolve_client_ip<B>(
    req: &Request<B>,
    trusted_proxies: &TrustedProxyConfig,
) -> Cow<'static, str> {
    let peer = peer_addr(req);
    let trust_headers = peer.is_none_or(|addr| trusted_proxies.is_trusted(&addr.ip()));

    if trust_headers {
        match forwarded_ip(req) {
            ForwardedIp::FromXff(ip) => return Cow::Owned(ip.to_string()),
            ForwardedIp::FromRealIp(ip) => return Cow::Owned(ip.to_string()),
            ForwardedIp::NotFound => {}
        }
    } else if forwarded_ip(req) != ForwardedIp::NotFound {
        debug!(
            peer = ?peer,
            "Ignoring forwarding headers from untrusted peer"
        );
    }

    match peer {
        Some(addr) => Cow::Owned(addr.ip().to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}
