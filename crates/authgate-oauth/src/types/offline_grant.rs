//! Offline grants: the server-side record behind refresh tokens.
//!
//! An offline grant can hold several live refresh tokens (one per client that
//! joined the session), a rotating device secret, and at most one app2app
//! device key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::OAuthError;
use crate::oauth::secret::constant_time_eq_bytes;
use crate::scope;
use crate::types::client::OAuthClient;
use crate::types::grant::{AuthenticationInfo, match_jkt};
use crate::types::session::{SessionType, encode_sid};

/// Free-form device description sent by native SDKs.
pub type DeviceInfo = serde_json::Map<String, Value>;

fn to_time_duration(d: std::time::Duration) -> time::Duration {
    time::Duration::try_from(d).unwrap_or(time::Duration::MAX)
}

// =============================================================================
// Access Events
// =============================================================================

/// A single access to an offline grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessEvent {
    /// When the access happened.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Remote IP of the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    /// User agent of the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AccessEvent {
    /// Creates an access event.
    #[must_use]
    pub fn new(
        timestamp: OffsetDateTime,
        remote_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            remote_ip,
            user_agent,
        }
    }
}

/// First and latest access to an offline grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessInfo {
    /// Access that created the grant.
    pub initial_access: AccessEvent,
    /// Most recent access.
    pub last_access: AccessEvent,
}

// =============================================================================
// Device Key Binding
// =============================================================================

/// App2app device key state of an offline grant.
///
/// A key moves from `Unbound` to `Bound` once and never changes afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", content = "jwk", rename_all = "snake_case")]
pub enum DeviceKeyBinding {
    /// No device key has been bound.
    #[default]
    Unbound,
    /// A public JWK is bound.
    Bound(Value),
}

/// Outcome of presenting a device key to a grant.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceKeyTransition {
    /// The presented key is already bound; nothing to write.
    Unchanged,
    /// The presented key should be bound.
    Bind(Value),
}

impl DeviceKeyBinding {
    /// Returns `true` if a key is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }

    /// Returns the bound key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&Value> {
        match self {
            Self::Unbound => None,
            Self::Bound(key) => Some(key),
        }
    }

    /// Decides what presenting `new_key` does to this binding.
    ///
    /// Keys are compared as canonical JSON bytes in constant time. A bound key
    /// can never be replaced. An unbound grant only accepts a key when the
    /// client enables insecure device-key binding.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` if a different key is already bound.
    /// - `invalid_request` if binding requires the insecure flag and it is off.
    pub fn transition(
        &self,
        new_key: &Value,
        insecure_binding_enabled: bool,
    ) -> Result<DeviceKeyTransition, OAuthError> {
        let new_json = serde_json::to_vec(new_key)?;

        if let Self::Bound(current) = self {
            let current_json = serde_json::to_vec(current)?;
            if constant_time_eq_bytes(&new_json, &current_json) {
                return Ok(DeviceKeyTransition::Unchanged);
            }
            return Err(OAuthError::invalid_grant(
                "app2app device key cannot be changed",
            ));
        }

        if !insecure_binding_enabled {
            return Err(OAuthError::invalid_request(
                "x_app2app_insecure_device_key_binding_enabled must be true to allow updating x_app2app_device_key_jwt",
            ));
        }

        Ok(DeviceKeyTransition::Bind(new_key.clone()))
    }
}

// =============================================================================
// Offline Grant
// =============================================================================

/// One refresh token held by an offline grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenEntry {
    /// SHA-256 hex hash of the refresh token.
    pub token_hash: String,
    /// Client the token was issued to.
    pub client_id: String,
    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Scopes granted to the token.
    pub scopes: Vec<String>,
    /// Authorization the token was issued under.
    pub authorization_id: String,
    /// DPoP key thumbprint the token is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpop_jkt: Option<String>,
}

/// A refresh-token session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineGrant {
    /// Grant ID. Also the prefix of every refresh token it issues.
    pub id: String,
    /// Owning application.
    pub app_id: String,
    /// Client that created the grant.
    pub initial_client_id: String,
    /// Signed-in user.
    pub user_id: String,
    /// Biometric identity the grant was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    /// IDP session the grant was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_session_id: Option<String>,
    /// Authentication method references.
    #[serde(default)]
    pub amr: Vec<String>,
    /// When the grant was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the user last authenticated for this grant.
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,
    /// Live refresh tokens.
    pub refresh_tokens: Vec<RefreshTokenEntry>,
    /// Access history.
    pub access_info: AccessInfo,
    /// Device description.
    #[serde(default)]
    pub device_info: DeviceInfo,
    /// Whether the grant takes part in SSO.
    pub sso_enabled: bool,
    /// SHA-256 hex hash of the current device secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_secret_hash: Option<String>,
    /// DPoP key thumbprint the device secret is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_secret_dpop_jkt: Option<String>,
    /// App2app device key.
    #[serde(default)]
    pub app2app_device_key: DeviceKeyBinding,
    /// When the grant expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

impl OfflineGrant {
    /// Returns the encoded SID of this grant.
    #[must_use]
    pub fn sid(&self) -> String {
        encode_sid(SessionType::OfflineGrant, &self.id)
    }

    /// Returns the authentication info of this grant.
    #[must_use]
    pub fn authentication_info(&self) -> AuthenticationInfo {
        AuthenticationInfo::new(self.user_id.clone(), self.authenticated_at)
            .with_amr(self.amr.clone())
            .with_session(SessionType::OfflineGrant, self.id.clone())
    }

    /// Returns `true` if the grant is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expire_at
    }

    /// Computes the expiry under the refresh-token settings of `client`.
    ///
    /// The absolute lifetime counts from creation; the idle timeout, when
    /// enabled, counts from the last access. Whichever ends first wins.
    #[must_use]
    pub fn compute_expiry(&self, client: &OAuthClient) -> OffsetDateTime {
        let absolute = self
            .created_at
            .saturating_add(to_time_duration(client.refresh_token_lifetime));
        if !client.refresh_token_idle_timeout_enabled {
            return absolute;
        }
        let idle = self
            .access_info
            .last_access
            .timestamp
            .saturating_add(to_time_duration(client.refresh_token_idle_timeout));
        absolute.min(idle)
    }

    /// Returns the scopes held by the given client's refresh token.
    #[must_use]
    pub fn scopes_for(&self, client_id: &str) -> Vec<String> {
        self.refresh_tokens
            .iter()
            .find(|t| t.client_id == client_id)
            .map(|t| t.scopes.clone())
            .unwrap_or_default()
    }

    /// Returns `true` if the given client's refresh token holds every scope
    /// in `required`.
    #[must_use]
    pub fn has_all_scopes<S: AsRef<str>>(&self, client_id: &str, required: &[S]) -> bool {
        self.refresh_tokens
            .iter()
            .filter(|t| t.client_id == client_id)
            .any(|t| scope::contains_all(&t.scopes, required))
    }

    /// Returns `true` if the presented DPoP proof satisfies the device-secret
    /// binding.
    #[must_use]
    pub fn match_device_secret_dpop_jkt(&self, proof_jkt: Option<&str>) -> bool {
        match_jkt(self.device_secret_dpop_jkt.as_deref(), proof_jkt)
    }

    /// Narrows the grant to the refresh token with `token_hash`.
    ///
    /// Returns `None` if the hash is not one of the grant's live tokens.
    #[must_use]
    pub fn to_session(&self, token_hash: &str) -> Option<OfflineGrantSession> {
        let entry = self
            .refresh_tokens
            .iter()
            .find(|t| crate::oauth::secret::constant_time_eq(&t.token_hash, token_hash))?;

        Some(OfflineGrantSession {
            offline_grant: self.clone(),
            client_id: entry.client_id.clone(),
            scopes: entry.scopes.clone(),
            authorization_id: entry.authorization_id.clone(),
            token_hash: entry.token_hash.clone(),
            dpop_jkt: entry.dpop_jkt.clone(),
            created_at: entry.created_at,
        })
    }
}

/// An offline grant seen through one of its refresh tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineGrantSession {
    /// The grant.
    pub offline_grant: OfflineGrant,
    /// Client the refresh token was issued to.
    pub client_id: String,
    /// Scopes of the refresh token.
    pub scopes: Vec<String>,
    /// Authorization of the refresh token.
    pub authorization_id: String,
    /// Hash of the refresh token.
    pub token_hash: String,
    /// DPoP binding of the refresh token.
    pub dpop_jkt: Option<String>,
    /// When the refresh token was issued.
    pub created_at: OffsetDateTime,
}

impl OfflineGrantSession {
    /// Returns the backing grant ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.offline_grant.id
    }

    /// Returns `true` if the presented DPoP proof satisfies the refresh
    /// token's binding. Unbound tokens accept any request.
    #[must_use]
    pub fn match_dpop_jkt(&self, proof_jkt: Option<&str>) -> bool {
        match_jkt(self.dpop_jkt.as_deref(), proof_jkt)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_grant() -> OfflineGrant {
        let now = OffsetDateTime::now_utc();
        let event = AccessEvent::new(now, None, None);
        OfflineGrant {
            id: "grant-1".to_string(),
            app_id: "app".to_string(),
            initial_client_id: "client-a".to_string(),
            user_id: "user-1".to_string(),
            identity_id: None,
            idp_session_id: None,
            amr: vec![],
            created_at: now,
            authenticated_at: now,
            refresh_tokens: vec![RefreshTokenEntry {
                token_hash: "hash-a".to_string(),
                client_id: "client-a".to_string(),
                created_at: now,
                scopes: vec!["openid".to_string(), "offline_access".to_string()],
                authorization_id: "authz-a".to_string(),
                dpop_jkt: None,
            }],
            access_info: AccessInfo {
                initial_access: event.clone(),
                last_access: event,
            },
            device_info: DeviceInfo::new(),
            sso_enabled: false,
            device_secret_hash: None,
            device_secret_dpop_jkt: None,
            app2app_device_key: DeviceKeyBinding::Unbound,
            expire_at: now + time::Duration::days(1),
        }
    }

    #[test]
    fn test_to_session_matches_hash() {
        let grant = sample_grant();

        let session = grant.to_session("hash-a").unwrap();
        assert_eq!(session.client_id, "client-a");
        assert_eq!(session.session_id(), "grant-1");
        assert_eq!(session.authorization_id, "authz-a");

        assert!(grant.to_session("hash-b").is_none());
    }

    #[test]
    fn test_session_dpop_binding() {
        let mut grant = sample_grant();
        let unbound = grant.to_session("hash-a").unwrap();
        assert!(unbound.match_dpop_jkt(None));
        assert!(unbound.match_dpop_jkt(Some("jkt-a")));

        grant.refresh_tokens[0].dpop_jkt = Some("jkt-a".to_string());
        let bound = grant.to_session("hash-a").unwrap();
        assert!(bound.match_dpop_jkt(Some("jkt-a")));
        assert!(!bound.match_dpop_jkt(Some("jkt-b")));
        assert!(!bound.match_dpop_jkt(None));
    }

    #[test]
    fn test_scopes_per_client() {
        let grant = sample_grant();
        assert!(grant.has_all_scopes("client-a", &["openid"]));
        assert!(!grant.has_all_scopes("client-a", &[scope::PRE_AUTHENTICATED_URL]));
        assert!(!grant.has_all_scopes("client-b", &["openid"]));
        assert!(grant.scopes_for("client-b").is_empty());
    }

    #[test]
    fn test_device_key_first_bind_requires_insecure_flag() {
        let binding = DeviceKeyBinding::Unbound;
        let key = json!({"kty": "EC", "crv": "P-384", "x": "a", "y": "b"});

        let err = binding.transition(&key, false).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");

        let transition = binding.transition(&key, true).unwrap();
        assert_eq!(transition, DeviceKeyTransition::Bind(key));
    }

    #[test]
    fn test_device_key_same_key_is_noop() {
        let key = json!({"kty": "EC", "crv": "P-384", "x": "a", "y": "b"});
        let binding = DeviceKeyBinding::Bound(key.clone());

        assert_eq!(
            binding.transition(&key, false).unwrap(),
            DeviceKeyTransition::Unchanged
        );
    }

    #[test]
    fn test_device_key_cannot_change_regardless_of_flag() {
        let binding = DeviceKeyBinding::Bound(json!({"kty": "EC", "x": "a"}));
        let other = json!({"kty": "EC", "x": "b"});

        for flag in [false, true] {
            let err = binding.transition(&other, flag).unwrap_err();
            assert_eq!(err.oauth_error_code(), "invalid_grant");
        }
    }

    #[test]
    fn test_device_secret_dpop_binding() {
        let mut grant = sample_grant();
        assert!(grant.match_device_secret_dpop_jkt(None));

        grant.device_secret_dpop_jkt = Some("jkt".to_string());
        assert!(grant.match_device_secret_dpop_jkt(Some("jkt")));
        assert!(!grant.match_device_secret_dpop_jkt(Some("other")));
        assert!(!grant.match_device_secret_dpop_jkt(None));
    }

    #[test]
    fn test_compute_expiry_takes_earlier_bound() {
        let mut grant = sample_grant();
        let client = OAuthClient {
            refresh_token_lifetime: std::time::Duration::from_secs(10 * 86400),
            refresh_token_idle_timeout: std::time::Duration::from_secs(86400),
            ..OAuthClient::new("client-a")
        };

        // Idle timeout ends first.
        assert_eq!(
            grant.compute_expiry(&client),
            grant.access_info.last_access.timestamp + time::Duration::days(1)
        );

        // Absolute lifetime ends first once the last access is late enough.
        grant.access_info.last_access.timestamp =
            grant.created_at + time::Duration::days(9) + time::Duration::hours(12);
        assert_eq!(
            grant.compute_expiry(&client),
            grant.created_at + time::Duration::days(10)
        );

        let no_idle = OAuthClient {
            refresh_token_idle_timeout_enabled: false,
            ..client
        };
        grant.access_info.last_access.timestamp = grant.created_at;
        assert_eq!(
            grant.compute_expiry(&no_idle),
            grant.created_at + time::Duration::days(10)
        );
    }

    #[test]
    fn test_authentication_info_points_back_to_grant() {
        let grant = sample_grant();
        let info = grant.authentication_info();
        assert_eq!(info.user_id, "user-1");
        assert_eq!(info.authenticated_by_session_type, Some(SessionType::OfflineGrant));
        assert_eq!(info.authenticated_by_session_id.as_deref(), Some("grant-1"));
    }
}
