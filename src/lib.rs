//! # RedSys Gatekeeper
//!
//! OAuth2 bearer-token gatekeeper for axum services:
//!
//! - **Introspection**: RFC 7662 token introspection with bounded retry
//! - **Validation**: expiry with clock-skew allowance, exact scope membership
//! - **Rate Limiting**: fixed-window counters per client and path class
//! - **Audit**: structured security events under the `security_audit` target
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Catch Panic → Request ID → Trace → CORS)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  GatekeeperLayer → Gatekeeper                               │
//! │    rate limit → extract → introspect → expiry → scope       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, hello, me)                               │
//! └─────────────────────────────────────────────────────────────┘
//!                        │
//!                        ▼ POST token=…
//!              Authorization server (RFC 7662)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use redsys_gatekeeper::{AppState, Config, IntrospectionClient, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let introspector = IntrospectionClient::new(&config)?;
//!
//!     let state = AppState::new(config, introspector);
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Downstream Contract
//!
//! Admitted requests carry `X-User-ID`, `X-User-Scope`, `X-Client-ID` and
//! `X-Token-Type`, and a [`auth::Principal`] request extension. Inbound copies
//! of those headers are always stripped.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use auth::{Gatekeeper, IntrospectionClient};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
