//! Opt-in, time-bounded cache of active introspection results.
//!
//! Disabled unless `TOKEN_CACHE_TTL_SECS > 0`. Entries are keyed by the
//! SHA-256 of the token, so raw tokens are never held in memory beyond the
//! request. Only active results are cached, and an entry never outlives the
//! token's own `exp`; a token revoked at the authorization server keeps being
//! admitted until its entry expires, which is the trade-off of enabling it.

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::trace;

use super::token::TokenInfo;

#[derive(Debug, Clone)]
struct CachedToken {
    info: TokenInfo,
    /// Unix seconds after which the entry is unusable.
    expires_at: i64,
}

/// Cache of introspection results keyed by token hash.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a token at `now` (Unix seconds). Expired entries are ignored.
    pub async fn get(&self, token: &str, now: i64) -> Option<TokenInfo> {
        let key = cache_key(token);
        let entries = self.entries.read().await;
        entries
            .get(&key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.info.clone())
    }

    /// Store an introspection result observed at `now`.
    ///
    /// Inactive results are not stored. The entry expires at
    /// `min(now + ttl, exp)`; a token without `exp` is not cached at all.
    pub async fn insert(&self, token: &str, info: &TokenInfo, now: i64) {
        if !info.active || info.exp <= now {
            return;
        }

        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_secs).min(info.exp);

        self.entries.write().await.insert(
            cache_key(token),
            CachedToken {
                info: info.clone(),
                expires_at,
            },
        );
    }

    /// Drop every entry expired at `now`. Returns how many were removed.
    pub async fn evict_expired(&self, now: i64) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        let removed = before - entries.len();
        if removed > 0 {
            trace!(removed, remaining = entries.len(), "Evicted expired token cache entries");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn cache_key(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
