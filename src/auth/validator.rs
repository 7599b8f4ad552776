//! Expiration and scope checks over introspection results.
//!
//! Both checks are pure: they see only the [`TokenInfo`] and the caller's
//! notion of "now".

use super::token::TokenInfo;

/// Allowance for clock drift between this service and the authorization server.
pub const CLOCK_SKEW_SECS: i64 = 300;

/// Whether the token is still usable at `now` (Unix seconds).
///
/// Valid iff `now < exp + skew`. A token sitting exactly on the boundary is
/// expired. `exp == 0` falls out of the same rule as long expired.
pub fn is_unexpired(info: &TokenInfo, now: i64) -> bool {
    now < info.exp.saturating_add(CLOCK_SKEW_SECS)
}

/// Whether `required` is a member of the granted scope set.
///
/// Exact membership after splitting on whitespace: `api` does not match a
/// granted `other-api-extra`. An empty grant never matches.
pub fn has_scope(info: &TokenInfo, required: &str) -> bool {
    !required.is_empty() && info.scopes().any(|granted| granted == required)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn token(exp: i64, scope: &str) -> TokenInfo {
        TokenInfo {
            active: true,
            exp,
            scope: scope.to_string(),
            ..TokenInfo::inactive()
        }
    }

    #[test]
    fn test_expired_beyond_skew() {
        assert!(!is_unexpired(&token(NOW - CLOCK_SKEW_SECS - 1, ""), NOW));
    }

    #[test]
    fn test_valid_within_skew() {
        assert!(is_unexpired(&token(NOW + CLOCK_SKEW_SECS - 1, ""), NOW));
        // Already past exp but inside the drift allowance
        assert!(is_unexpired(&token(NOW - CLOCK_SKEW_SECS + 1, ""), NOW));
    }

    #[test]
    fn test_exact_boundary_is_expired() {
        assert!(!is_unexpired(&token(NOW - CLOCK_SKEW_SECS, ""), NOW));
    }

    #[test]
    fn test_zero_exp_is_expired() {
        assert!(!is_unexpired(&token(0, ""), NOW));
    }

    #[test]
    fn test_huge_exp_does_not_overflow() {
        assert!(is_unexpired(&token(i64::MAX, ""), NOW));
    }

    #[test]
    fn test_scope_exact_membership() {
        assert!(has_scope(&token(0, "openid redsys.api offline"), "redsys.api"));
        assert!(has_scope(&token(0, "redsys.api"), "redsys.api"));
    }

    #[test]
    fn test_scope_substring_is_not_membership() {
        assert!(!has_scope(&token(0, "other-api-extra"), "api"));
        assert!(!has_scope(&token(0, "redsys.api.admin"), "redsys.api"));
    }

    #[test]
    fn test_empty_scope_never_matches() {
        assert!(!has_scope(&token(0, ""), "redsys.api"));
        assert!(!has_scope(&token(0, "   "), "redsys.api"));
        assert!(!has_scope(&token(0, "redsys.api"), ""));
    }
}
