//! Scope constants and helpers.
//!
//! Scopes travel as space-delimited strings on the wire and as `Vec<String>`
//! everywhere else.

/// OpenID Connect scope. Requests an ID token.
pub const OPENID: &str = "openid";

/// Requests a refresh token backed by an offline grant.
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Requests a device secret for device single sign-on.
pub const DEVICE_SSO: &str = "device_sso";

/// Full user access, reserved for first-party clients.
pub const FULL_ACCESS: &str = "https://authgear.com/scopes/full-access";

/// Allows exchanging a device secret for a pre-authenticated URL token.
pub const PRE_AUTHENTICATED_URL: &str = "https://authgear.com/scopes/pre-authenticated-url";

/// Scopes granted to anonymous and biometric logins unless the caller asks
/// for something else.
#[must_use]
pub fn default_app_scopes() -> Vec<String> {
    vec![
        OPENID.to_string(),
        OFFLINE_ACCESS.to_string(),
        FULL_ACCESS.to_string(),
    ]
}

/// Splits a space-delimited scope string.
#[must_use]
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Joins scopes into the space-delimited wire form.
#[must_use]
pub fn join_scope(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Returns `true` if `scopes` contains `scope`.
#[must_use]
pub fn contains(scopes: &[String], scope: &str) -> bool {
    scopes.iter().any(|s| s == scope)
}

/// Returns `true` if every scope in `required` is present in `scopes`.
#[must_use]
pub fn contains_all<S: AsRef<str>>(scopes: &[String], required: &[S]) -> bool {
    required.iter().all(|r| contains(scopes, r.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        assert_eq!(
            parse_scope("openid  offline_access\tdevice_sso"),
            vec!["openid", "offline_access", "device_sso"]
        );
        assert!(parse_scope("").is_empty());
        assert!(parse_scope("   ").is_empty());
    }

    #[test]
    fn test_contains_all() {
        let scopes = parse_scope("openid offline_access");
        assert!(contains_all(&scopes, &[OPENID]));
        assert!(contains_all(&scopes, &[OPENID, OFFLINE_ACCESS]));
        assert!(!contains_all(&scopes, &[OFFLINE_ACCESS, FULL_ACCESS]));
        assert!(contains_all::<&str>(&scopes, &[]));
    }

    #[test]
    fn test_join_scope() {
        assert_eq!(join_scope(&default_app_scopes()), format!("openid offline_access {FULL_ACCESS}"));
    }
}
