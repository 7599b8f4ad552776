//! Gatekeeper configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with defaults
//! suitable for local development against an Ory Hydra admin port. In
//! production, configure via environment variables or a `.env` file.
//!
//! # Introspection
//!
//! - `INTROSPECTION_URL`: RFC 7662 endpoint (default: Hydra admin introspect)
//! - `OAUTH_CLIENT_ID` / `OAUTH_CLIENT_SECRET`: credentials sent in the form body
//! - `INTROSPECTION_TIMEOUT_MS`: per-attempt timeout (default: 5000)
//! - `INTROSPECTION_MAX_RETRIES`: attempts per request (default: 3)
//! - `TOKEN_CACHE_TTL_SECS`: cache active introspection results (default: 0, disabled)
//!
//! # Access Policy
//!
//! - `REQUIRED_SCOPE`: scope every admitted token must carry (default: `redsys.api`)
//! - `AUTH_BYPASS_PATHS`: comma-separated public paths (exact match)
//! - `RATE_LIMIT_PER_MINUTE`: base limit for API paths; others get twice this
//! - `TRUSTED_PROXIES`: CIDRs whose `X-Forwarded-For` is honored

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected 'pretty' or 'json')")),
        }
    }
}

/// Gatekeeper configuration.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Gatekeeper will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Allowed CORS origins; `*` allows any
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Introspection Configuration
    // =========================================================================
    /// RFC 7662 introspection endpoint
    pub introspection_url: String,

    /// Client id presented to the introspection endpoint
    pub client_id: String,

    /// Client secret presented to the introspection endpoint
    pub client_secret: String,

    /// Timeout for each individual introspection attempt
    pub introspection_timeout: Duration,

    /// Number of introspection attempts before giving up (>= 1)
    pub max_retries: u32,

    /// Base delay for exponential backoff between attempts (zero = retry immediately)
    pub retry_base_delay: Duration,

    /// How long an active introspection result may be reused (zero = no cache)
    pub token_cache_ttl: Duration,

    // =========================================================================
    // Access Policy
    // =========================================================================
    /// Scope that must be present in the granted scope set
    pub required_scope: String,

    /// Paths that bypass authentication entirely (exact match)
    pub auth_bypass_paths: Vec<String>,

    /// Paths starting with this prefix use the base rate limit
    pub api_path_prefix: String,

    /// Requests per minute per client on API paths (0 = rate limiting disabled)
    pub rate_limit_per_minute: u32,

    /// Trusted proxy CIDR ranges; forwarding headers are only honored from these.
    /// Empty trusts no peer: forwarding headers count only without a known peer address.
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log filter (e.g., "info", "debug", "redsys_gatekeeper=trace")
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Port for the Prometheus exporter (0 = disabled)
    pub metrics_port: u16,

    /// Interval of the background task evicting stale rate windows and cache entries
    pub state_sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Introspection
            introspection_url: env::var("INTROSPECTION_URL")
                .unwrap_or_else(|_| DEFAULT_INTROSPECTION_URL.to_string()),
            client_id: env::var("OAUTH_CLIENT_ID")
                .unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string()),
            client_secret: env::var("OAUTH_CLIENT_SECRET").unwrap_or_default(),
            introspection_timeout: Duration::from_millis(Self::parse_env(
                "INTROSPECTION_TIMEOUT_MS",
                5000,
            )?),
            max_retries: Self::parse_env("INTROSPECTION_MAX_RETRIES", 3)?,
            retry_base_delay: Duration::from_millis(Self::parse_env(
                "INTROSPECTION_RETRY_BASE_DELAY_MS",
                100,
            )?),
            token_cache_ttl: Duration::from_secs(Self::parse_env("TOKEN_CACHE_TTL_SECS", 0)?),

            // Access policy
            required_scope: env::var("REQUIRED_SCOPE")
                .unwrap_or_else(|_| DEFAULT_REQUIRED_SCOPE.to_string()),
            auth_bypass_paths: Self::parse_auth_bypass_paths(),
            api_path_prefix: env::var("API_PATH_PREFIX").unwrap_or_else(|_| "/api/".to_string()),
            rate_limit_per_minute: Self::parse_env("RATE_LIMIT_PER_MINUTE", 100)?,
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_env("LOG_FORMAT", LogFormat::Pretty)?,
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
            state_sweep_interval: Duration::from_secs(Self::parse_env(
                "STATE_SWEEP_INTERVAL_SECS",
                60,
            )?),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        let url = self.introspection_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::ConfigError(format!(
                "INTROSPECTION_URL must be an http(s) URL, got '{url}'"
            )));
        }

        if self.client_id.trim().is_empty() {
            return Err(AppError::ConfigError(
                "OAUTH_CLIENT_ID must not be empty".to_string(),
            ));
        }

        if self.introspection_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "INTROSPECTION_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(AppError::ConfigError(
                "INTROSPECTION_MAX_RETRIES must be at least 1".to_string(),
            ));
        }

        if self.required_scope.trim().is_empty()
            || self.required_scope.split_whitespace().count() != 1
        {
            return Err(AppError::ConfigError(
                "REQUIRED_SCOPE must be a single non-empty scope token".to_string(),
            ));
        }

        if !self.api_path_prefix.starts_with('/') {
            return Err(AppError::ConfigError(
                "API_PATH_PREFIX must start with '/'".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.state_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "STATE_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_per_minute > 0
    }

    /// Check if introspection results are cached.
    pub fn token_cache_enabled(&self) -> bool {
        !self.token_cache_ttl.is_zero()
    }

    /// Get the metrics endpoint address, or `None` when metrics are disabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        (self.metrics_port > 0).then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping empty entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }

    /// Parse auth bypass paths; entries not starting with '/' are ignored.
    fn parse_auth_bypass_paths() -> Vec<String> {
        Self::parse_list("AUTH_BYPASS_PATHS", DEFAULT_BYPASS_PATHS)
            .into_iter()
            .filter(|p| p.starts_with('/'))
            .collect()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

const DEFAULT_INTROSPECTION_URL: &str = "http://localhost:4445/admin/oauth2/introspect";
const DEFAULT_CLIENT_ID: &str = "redsys-backend";
const DEFAULT_REQUIRED_SCOPE: &str = "redsys.api";
const DEFAULT_BYPASS_PATHS: &str = "/health,/ready,/api/v1/hello";

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_body_size: 1024 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            introspection_url: DEFAULT_INTROSPECTION_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: String::new(),
            introspection_timeout: Duration::from_millis(5000),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            token_cache_ttl: Duration::ZERO,
            required_scope: DEFAULT_REQUIRED_SCOPE.to_string(),
            auth_bypass_paths: split_list(DEFAULT_BYPASS_PATHS),
            api_path_prefix: "/api/".to_string(),
            rate_limit_per_minute: 100,
            trusted_proxies: vec![],
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 0,
            state_sweep_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.introspection_timeout, Duration::from_millis(5000));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.rate_limit_per_minute, 100);
        assert_eq!(config.required_scope, "redsys.api");
        assert_eq!(
            config.auth_bypass_paths,
            vec!["/health", "/ready", "/api/v1/hello"]
        );
        assert!(!config.token_cache_enabled());
        assert!(config.metrics_addr().is_none());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_rate_limiting_enabled() {
        assert!(Config::default().rate_limiting_enabled());

        let config = Config {
            rate_limit_per_minute: 0,
            ..Config::default()
        };
        assert!(!config.rate_limiting_enabled());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = Config {
            introspection_url: "ftp://auth.local/introspect".to_string(),
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("INTROSPECTION_URL"));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = Config {
            max_retries: 0,
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("INTROSPECTION_MAX_RETRIES"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = Config {
            introspection_timeout: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_multi_token_scope() {
        let config = Config {
            required_scope: "redsys.api admin".to_string(),
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("REQUIRED_SCOPE"));
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(" /health , ,/ready,"),
            vec!["/health".to_string(), "/ready".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
