//! Fuzz testing for untrusted input parsers.
//!
//! Both parsers see attacker-controlled bytes: the `Authorization` header
//! from clients and the introspection body from the network. Neither may
//! panic, and any token returned must satisfy the extractor's own bounds.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the bearer fuzz target
//! cargo +nightly fuzz run fuzz_bearer
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_bearer -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use redsys_gatekeeper::auth::extract::{BEARER_PREFIX, MAX_TOKEN_LENGTH, parse_bearer};
use redsys_gatekeeper::auth::introspection::parse_introspection_body;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Some(token) = parse_bearer(s)
    {
        assert!(!token.is_empty());
        assert!(token.chars().count() <= MAX_TOKEN_LENGTH);
        assert!(s.starts_with(BEARER_PREFIX));
    }

    let _ = parse_introspection_body(data);
});
