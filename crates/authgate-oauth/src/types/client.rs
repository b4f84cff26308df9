//! OAuth 2.0 client registration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::oauth::grant_type::GrantType;

/// Default refresh-token lifetime (90 days).
pub const DEFAULT_REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Default refresh-token idle timeout (30 days).
pub const DEFAULT_REFRESH_TOKEN_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth 2.0 client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OAuthClient {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Human-readable display name.
    pub name: Option<String>,

    /// Whether this client authenticates with a client secret.
    pub confidential: bool,

    /// Grant types registered for this client, as wire values.
    ///
    /// Grant types in [`GrantType::WHITELISTED`] are allowed regardless.
    pub grant_types: Vec<String>,

    /// Allowed redirect URIs.
    pub redirect_uris: Vec<String>,

    /// Whether the client is first-party and may hold the full-access scope.
    pub full_access: bool,

    /// Maximum live offline grants per user. `1` evicts older sessions; `0`
    /// means unlimited.
    pub max_concurrent_session: u32,

    /// Whether the client takes part in app2app authentication.
    pub app2app_enabled: bool,

    /// Whether an app2app device key may be bound to an offline grant that
    /// was created without one.
    pub app2app_insecure_device_key_binding_enabled: bool,

    /// Absolute lifetime of offline grants initiated by this client.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Whether offline grants expire after a period of inactivity.
    pub refresh_token_idle_timeout_enabled: bool,

    /// Inactivity period after which an offline grant expires.
    #[serde(with = "humantime_serde")]
    pub refresh_token_idle_timeout: Duration,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            name: None,
            confidential: false,
            grant_types: vec![
                GrantType::AuthorizationCode.as_str().to_string(),
                GrantType::RefreshToken.as_str().to_string(),
            ],
            redirect_uris: Vec::new(),
            full_access: false,
            max_concurrent_session: 0,
            app2app_enabled: false,
            app2app_insecure_device_key_binding_enabled: false,
            refresh_token_lifetime: DEFAULT_REFRESH_TOKEN_LIFETIME,
            refresh_token_idle_timeout_enabled: true,
            refresh_token_idle_timeout: DEFAULT_REFRESH_TOKEN_IDLE_TIMEOUT,
        }
    }
}

impl OAuthClient {
    /// Creates a public client with default settings.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if this client has no client secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        !self.confidential
    }

    /// Returns `true` if this client authenticates with a client secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.confidential
    }

    /// Returns `true` if the client may hold the full-access scope.
    #[must_use]
    pub fn has_full_access_scope(&self) -> bool {
        self.full_access
    }

    /// Returns `true` if the grant type is registered on the client itself,
    /// ignoring the whitelist.
    #[must_use]
    pub fn has_registered_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Returns `true` if the client may use `grant_type` at the token
    /// endpoint.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: &str) -> bool {
        self.has_registered_grant_type(grant_type)
            || GrantType::WHITELISTED
                .iter()
                .any(|g| g.as_str() == grant_type)
    }

    /// Returns `true` if offline_access may yield a refresh token.
    #[must_use]
    pub fn allows_refresh_token(&self) -> bool {
        self.has_registered_grant_type(GrantType::RefreshToken.as_str())
    }
}

// =============================================================================
// Client Credentials
// =============================================================================

/// Client secrets registered for a confidential client.
///
/// Several secrets may be live at once while a secret is being rotated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientCredentials {
    /// The client these secrets belong to.
    pub client_id: String,

    /// Plain octet secrets.
    pub secrets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelisted_grant_types_always_allowed() {
        let client = OAuthClient {
            grant_types: vec![],
            ..OAuthClient::new("c1")
        };

        assert!(client.is_grant_type_allowed("authorization_code"));
        assert!(client.is_grant_type_allowed("urn:authgear:params:oauth:grant-type:id-token"));
        assert!(!client.is_grant_type_allowed("client_credentials"));
        assert!(!client.allows_refresh_token());
    }

    #[test]
    fn test_registered_grant_type_allowed() {
        let client = OAuthClient {
            grant_types: vec!["client_credentials".to_string()],
            ..OAuthClient::new("c1")
        };

        assert!(client.is_grant_type_allowed("client_credentials"));
    }

    #[test]
    fn test_client_deserialize_with_humantime() {
        let json = r#"{
            "client_id": "mobile",
            "confidential": false,
            "full_access": true,
            "refresh_token_lifetime": "7days",
            "refresh_token_idle_timeout": "1day"
        }"#;

        let client: OAuthClient = serde_json::from_str(json).unwrap();
        assert_eq!(client.client_id, "mobile");
        assert!(client.is_public());
        assert!(client.has_full_access_scope());
        assert_eq!(client.refresh_token_lifetime, Duration::from_secs(7 * 86400));
        assert_eq!(client.refresh_token_idle_timeout, Duration::from_secs(86400));
        assert!(client.allows_refresh_token());
    }
}
