//! Per-client fixed-window rate limiting.
//!
//! # Algorithm
//!
//! Each `(client address, path class)` pair owns a [`RateWindow`]: a start
//! instant and a counter. On every check, under one lock:
//!
//! 1. if more than [`WINDOW`] has elapsed since the start, the counter resets
//!    and the window restarts at "now"
//! 2. the counter is incremented
//! 3. the request is admitted iff the post-increment count is within the limit
//!
//! The read-reset-increment sequence is serialized by a mutex so concurrent
//! requests cannot lose updates.
//!
//! # Path Classes
//!
//! Paths under the API prefix (default `/api/`) get the base limit; every
//! other path gets twice the base limit.
//!
//! # Scope
//!
//! State is in-process. Running several gatekeeper replicas multiplies the
//! effective limit by the replica count; a shared counter store would be
//! needed for a cluster-wide guarantee.
//!
//! # IP Spoofing Mitigation
//!
//! The client key comes from [`super::ip::resolve_client_ip`], which only
//! honors `X-Forwarded-For` from peers inside `TRUSTED_PROXIES`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Length of one rate window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Error type for rate limiter configuration.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// Limit value cannot be zero.
    #[error("rate limit must be greater than 0; omit the limiter to disable limiting")]
    ZeroLimit,
}

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    /// A bare address is treated as a single-host range.
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            let ip: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                network: ip,
                prefix_len: max_prefix(&ip),
            });
        };

        let ip: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&ip) {
            return None;
        }

        Some(Self {
            network: ip,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len)
                };
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Peers whose forwarding headers are believed.
///
/// With no ranges configured no peer is trusted.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    /// Check if trusted proxy validation is enabled (any ranges configured).
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Check if a peer address is a trusted proxy.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Fixed Window Limiter
// =============================================================================

/// Which limit a path falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathClass {
    /// Under the API prefix: base limit.
    Api,
    /// Everything else: twice the base limit.
    Other,
}

impl PathClass {
    pub fn classify(path: &str, api_prefix: &str) -> Self {
        if path.starts_with(api_prefix) {
            Self::Api
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Other => "other",
        }
    }
}

/// Counter state for one client and path class.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub window_start: Instant,
    pub count: u32,
    pub limit: u32,
}

impl RateWindow {
    fn new(now: Instant, limit: u32) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) > WINDOW
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admit,
    Reject {
        limit: u32,
        class: PathClass,
        /// Whole seconds until the window resets (at least 1).
        retry_after_secs: u64,
    },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// In-process fixed-window limiter keyed by client identity and path class.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    base_limit: NonZeroU32,
    api_prefix: String,
    windows: Mutex<HashMap<(String, PathClass), RateWindow>>,
}

impl FixedWindowLimiter {
    /// Create a limiter with `base_limit` requests per minute on API paths.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::ZeroLimit` if `base_limit` is 0.
    pub fn new(base_limit: u32, api_prefix: impl Into<String>) -> Result<Self, RateLimitError> {
        let base_limit = NonZeroU32::new(base_limit).ok_or(RateLimitError::ZeroLimit)?;
        Ok(Self {
            base_limit,
            api_prefix: api_prefix.into(),
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Per-minute limit for a path class.
    pub fn limit_for(&self, class: PathClass) -> u32 {
        match class {
            PathClass::Api => self.base_limit.get(),
            PathClass::Other => self.base_limit.get().saturating_mul(2),
        }
    }

    /// Check and count a request from `client` to `path`.
    pub async fn check(&self, client: &str, path: &str) -> RateDecision {
        self.check_at(client, path, Instant::now()).await
    }

    /// Same as [`Self::check`] with an explicit clock reading.
    pub async fn check_at(&self, client: &str, path: &str, now: Instant) -> RateDecision {
        let class = PathClass::classify(path, &self.api_prefix);
        let limit = self.limit_for(class);

        let mut windows = self.windows.lock().await;
        let window = windows
            .entry((client.to_string(), class))
            .or_insert_with(|| RateWindow::new(now, limit));

        if window.is_expired(now) {
            *window = RateWindow::new(now, limit);
        }
        window.count = window.count.saturating_add(1);

        if window.count <= window.limit {
            RateDecision::Admit
        } else {
            let elapsed = now.saturating_duration_since(window.window_start);
            let retry_after_secs = WINDOW.saturating_sub(elapsed).as_secs().max(1);
            RateDecision::Reject {
                limit: window.limit,
                class,
                retry_after_secs,
            }
        }
    }

    /// Remove windows that have expired at `now`. Returns how many were removed.
    pub async fn evict_expired(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| !window.is_expired(now));
        let removed = before - windows.len();
        if removed > 0 {
            trace!(removed, remaining = windows.len(), "Evicted idle rate windows");
        }
        removed
    }

    /// Number of tracked windows.
    pub async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}
