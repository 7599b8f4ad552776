//! OAuth2 bearer-token authentication.
//!
//! # Architecture
//!
//! ```text
//! Request → strip identity headers → bypass? → rate check → extract bearer
//!         → cache / introspect (RFC 7662, retried) → active? → expiry → scope
//!         → inject X-User-ID / X-User-Scope / X-Client-ID / X-Token-Type → handler
//!
//!   any failure → SecurityEventLogger + JSON error (401 / 403 / 429)
//! ```
//!
//! [`Gatekeeper`] owns the pipeline; [`crate::middleware::GatekeeperLayer`]
//! plugs it into a Tower stack.

pub mod audit;
pub mod cache;
pub mod error;
pub mod extract;
pub mod gatekeeper;
pub mod introspection;
pub mod token;
pub mod validator;

pub use audit::{SecurityEvent, SecurityEventLogger};
pub use error::{AuthError, InvalidTokenReason, error_response};
pub use extract::{extract_bearer, parse_bearer};
pub use gatekeeper::{AuthDecision, Gatekeeper, SweepStats};
pub use introspection::{IntrospectionClient, IntrospectionError};
pub use token::{Principal, TokenInfo};
