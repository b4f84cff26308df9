//! Single-use code grants and the authorization request they capture.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::scope;
use crate::types::session::SessionType;

/// How long a freshly minted code grant stays redeemable.
pub const CODE_GRANT_LIFETIME: Duration = Duration::minutes(5);

// =============================================================================
// Authorization Request
// =============================================================================

/// The authorization request a code grant was issued for.
///
/// Kept whole so the token endpoint can re-derive scopes, PKCE challenge,
/// nonce and UI parameters at exchange time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthorizationRequest {
    /// Client that initiated the request.
    pub client_id: String,

    /// Redirect URI given in the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Space-delimited requested scopes.
    pub scope: String,

    /// PKCE code challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE code challenge method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// OIDC nonce echoed into the ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Whether the resulting session takes part in SSO.
    pub x_sso_enabled: bool,

    /// Preferred UI locales.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_locales: Option<String>,
}

impl AuthorizationRequest {
    /// Returns the requested scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        scope::parse_scope(&self.scope)
    }

    /// Returns the stored code challenge, treating empty as absent.
    #[must_use]
    pub fn code_challenge(&self) -> Option<&str> {
        self.code_challenge.as_deref().filter(|c| !c.is_empty())
    }

    /// Returns `true` if SSO was requested.
    #[must_use]
    pub fn sso_enabled(&self) -> bool {
        self.x_sso_enabled
    }

    /// Recovers the UI parameters of the original request.
    #[must_use]
    pub fn ui_param(&self) -> UiParam {
        UiParam {
            ui_locales: self.ui_locales.clone(),
        }
    }
}

/// UI parameters restored from the authorization request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiParam {
    /// Preferred UI locales.
    pub ui_locales: Option<String>,
}

// =============================================================================
// Authentication Info
// =============================================================================

/// The result of authenticating a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthenticationInfo {
    /// Authenticated user.
    pub user_id: String,

    /// When authentication happened.
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,

    /// Authentication method references.
    #[serde(default)]
    pub amr: Vec<String>,

    /// Type of the session the user was already signed in with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated_by_session_type: Option<SessionType>,

    /// ID of the session the user was already signed in with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated_by_session_id: Option<String>,

    /// Whether issuing an offline grant from this authentication counts as a
    /// fresh login for event purposes.
    #[serde(default)]
    pub should_fire_authenticated_event_when_issue_offline_grant: bool,
}

impl AuthenticationInfo {
    /// Creates authentication info for a fresh login.
    #[must_use]
    pub fn new(user_id: impl Into<String>, authenticated_at: OffsetDateTime) -> Self {
        Self {
            user_id: user_id.into(),
            authenticated_at,
            amr: Vec::new(),
            authenticated_by_session_type: None,
            authenticated_by_session_id: None,
            should_fire_authenticated_event_when_issue_offline_grant: false,
        }
    }

    /// Records the session the user was authenticated by.
    #[must_use]
    pub fn with_session(mut self, session_type: SessionType, session_id: impl Into<String>) -> Self {
        self.authenticated_by_session_type = Some(session_type);
        self.authenticated_by_session_id = Some(session_id.into());
        self
    }

    /// Sets the authentication method references.
    #[must_use]
    pub fn with_amr(mut self, amr: Vec<String>) -> Self {
        self.amr = amr;
        self
    }
}

// =============================================================================
// Code Grant
// =============================================================================

/// A single-use authorization code, stored by the hash of the code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeGrant {
    /// Owning application.
    pub app_id: String,

    /// Authorization the code was issued under.
    pub authorization_id: String,

    /// SHA-256 hex hash of the code.
    pub code_hash: String,

    /// Redirect URI the code must be redeemed with.
    pub redirect_uri: String,

    /// The original authorization request.
    pub authorization_request: AuthorizationRequest,

    /// Authentication result the code carries.
    pub authentication_info: AuthenticationInfo,

    /// Encoded SID of the session named by `id_token_hint`, for reauth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_hint_sid: Option<String>,

    /// DPoP key thumbprint the code is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpop_jkt: Option<String>,

    /// When the code was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the code stops being redeemable.
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

impl CodeGrant {
    /// Returns `true` if the code is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expire_at
    }

    /// Returns `true` if the presented DPoP proof satisfies the code binding.
    ///
    /// An unbound code accepts any proof, including none.
    #[must_use]
    pub fn match_dpop_jkt(&self, proof_jkt: Option<&str>) -> bool {
        match_jkt(self.dpop_jkt.as_deref(), proof_jkt)
    }
}

/// A single-use code gating a settings change behind re-authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsActionGrant {
    /// Owning application.
    pub app_id: String,

    /// SHA-256 hex hash of the code.
    pub code_hash: String,

    /// Redirect URI the code must be redeemed with.
    pub redirect_uri: String,

    /// User who re-authenticated.
    pub user_id: String,

    /// The original authorization request.
    pub authorization_request: AuthorizationRequest,

    /// When the code was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the code stops being redeemable.
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

impl SettingsActionGrant {
    /// Returns `true` if the code is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expire_at
    }
}

/// Compares a stored JKT binding with the JKT of the presented proof.
pub(crate) fn match_jkt(bound: Option<&str>, proof: Option<&str>) -> bool {
    match bound.filter(|b| !b.is_empty()) {
        None => true,
        Some(bound) => proof.is_some_and(|p| crate::oauth::secret::constant_time_eq(bound, p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_grant(dpop_jkt: Option<&str>) -> CodeGrant {
        let now = OffsetDateTime::now_utc();
        CodeGrant {
            app_id: "app".to_string(),
            authorization_id: "authz".to_string(),
            code_hash: "hash".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            authorization_request: AuthorizationRequest::default(),
            authentication_info: AuthenticationInfo::new("user", now),
            id_token_hint_sid: None,
            dpop_jkt: dpop_jkt.map(str::to_string),
            created_at: now,
            expire_at: now + CODE_GRANT_LIFETIME,
        }
    }

    #[test]
    fn test_code_grant_expiry() {
        let grant = code_grant(None);
        assert!(!grant.is_expired_at(grant.created_at));
        assert!(grant.is_expired_at(grant.expire_at + Duration::seconds(1)));
    }

    #[test]
    fn test_unbound_code_accepts_any_proof() {
        let grant = code_grant(None);
        assert!(grant.match_dpop_jkt(None));
        assert!(grant.match_dpop_jkt(Some("jkt")));
    }

    #[test]
    fn test_bound_code_requires_matching_proof() {
        let grant = code_grant(Some("jkt-1"));
        assert!(grant.match_dpop_jkt(Some("jkt-1")));
        assert!(!grant.match_dpop_jkt(Some("jkt-2")));
        assert!(!grant.match_dpop_jkt(None));
    }

    #[test]
    fn test_authorization_request_accessors() {
        let request = AuthorizationRequest {
            scope: "openid offline_access".to_string(),
            code_challenge: Some(String::new()),
            ui_locales: Some("fi".to_string()),
            ..AuthorizationRequest::default()
        };

        assert_eq!(request.scopes(), vec!["openid", "offline_access"]);
        assert_eq!(request.code_challenge(), None);
        assert_eq!(request.ui_param().ui_locales.as_deref(), Some("fi"));
    }
}
