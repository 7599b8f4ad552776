//! HTTP middleware for authentication and rate limiting.
//!
//! - **Gatekeeper layer**: runs the bearer-token pipeline in front of every route
//! - **Rate Limiting**: fixed-window counters per client address and path class
//! - **Client Address**: peer-aware resolution with trusted-proxy validation
//!
//! # Security Considerations
//!
//! - Forwarding headers are honored only from trusted proxies
//! - Inbound identity headers are stripped before any decision is made

pub mod auth;
pub mod ip;
pub mod rate_limit;

pub use auth::{GatekeeperLayer, GatekeeperService};
pub use ip::{UNKNOWN_IP, resolve_client_ip};
pub use rate_limit::{
    CidrRange, FixedWindowLimiter, PathClass, RateDecision, RateLimitError, TrustedProxyConfig,
};
