//! Validation of scopes requested directly at the token endpoint.

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::scope;
use crate::types::OAuthClient;

/// Checks that a client may request a set of scopes.
pub trait ScopesValidator: Send + Sync {
    /// Validates `scopes` for `client`.
    ///
    /// # Errors
    ///
    /// Returns `invalid_scope` describing the first offending scope.
    fn validate_scopes(&self, client: &OAuthClient, scopes: &[String]) -> OAuthResult<()>;
}

/// The built-in scope rules.
///
/// - the full-access scope is reserved for first-party clients
/// - `device_sso` needs `offline_access`
/// - the pre-authenticated URL scope needs `device_sso`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScopesValidator;

impl ScopesValidator for DefaultScopesValidator {
    fn validate_scopes(&self, client: &OAuthClient, scopes: &[String]) -> OAuthResult<()> {
        if scopes.is_empty() {
            return Err(OAuthError::invalid_scope("scope is required"));
        }
        if scope::contains(scopes, scope::FULL_ACCESS) && !client.has_full_access_scope() {
            return Err(OAuthError::invalid_scope(
                "full-access scope is not allowed for this client",
            ));
        }
        if scope::contains(scopes, scope::DEVICE_SSO) && !scope::contains(scopes, scope::OFFLINE_ACCESS)
        {
            return Err(OAuthError::invalid_scope(
                "device_sso scope requires offline_access scope",
            ));
        }
        if scope::contains(scopes, scope::PRE_AUTHENTICATED_URL)
            && !scope::contains(scopes, scope::DEVICE_SSO)
        {
            return Err(OAuthError::invalid_scope(
                "pre-authenticated-url scope requires device_sso scope",
            ));
        }
        Ok(())
    }
}
