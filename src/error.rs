use thiserror::Error;

/// Process-level error types.
///
/// Request-time authentication failures are not represented here; those are
/// [`crate::auth::AuthError`] and never escape the middleware. `AppError`
/// covers configuration and startup problems, which the binary maps to exit
/// codes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
