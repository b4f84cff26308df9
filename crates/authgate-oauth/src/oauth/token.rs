//! Token endpoint request and response types.
//!
//! Fields that only some grant types use are all optional here; which ones
//! are required is decided by [`TokenRequest::validate`] once the grant type
//! is known.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::grant_type::GrantType;
use crate::oauth::pkce;
use crate::scope;
use crate::types::{DeviceInfo, OAuthClient};

// =============================================================================
// Request
// =============================================================================

/// Token request parameters, as posted to the token endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    /// Requested grant type.
    pub grant_type: String,

    /// Authorization or settings-action code.
    pub code: Option<String>,

    /// PKCE code verifier.
    pub code_verifier: Option<String>,

    /// Redirect URI the code was issued for.
    pub redirect_uri: Option<String>,

    /// Refresh token.
    pub refresh_token: Option<String>,

    /// Client ID.
    pub client_id: Option<String>,

    /// Client secret for confidential clients.
    pub client_secret: Option<String>,

    /// Space-delimited scopes.
    pub scope: Option<String>,

    /// Token exchange subject token.
    pub subject_token: Option<String>,

    /// Token exchange subject token type.
    pub subject_token_type: Option<String>,

    /// Token exchange actor token.
    pub actor_token: Option<String>,

    /// Token exchange actor token type.
    pub actor_token_type: Option<String>,

    /// Token exchange requested token type.
    pub requested_token_type: Option<String>,

    /// Token exchange audience.
    pub audience: Option<String>,

    /// Base64url-encoded JSON object describing the device.
    pub x_device_info: Option<String>,

    /// App2app JWT carrying a device key to bind during code exchange.
    pub x_app2app_device_key_jwt: Option<String>,

    /// Anonymous, biometric or app2app request JWT.
    pub jwt: Option<String>,

    /// Device secret presented for rotation.
    pub device_secret: Option<String>,

    /// PKCE challenge for the code minted by an app2app request.
    pub code_challenge: Option<String>,

    /// PKCE challenge method for the code minted by an app2app request.
    pub code_challenge_method: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl TokenRequest {
    /// Returns the authorization code, if present and non-empty.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        non_empty(&self.code)
    }

    /// Returns the PKCE verifier, if present and non-empty.
    #[must_use]
    pub fn code_verifier(&self) -> Option<&str> {
        non_empty(&self.code_verifier)
    }

    /// Returns the redirect URI, or the empty string.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or_default()
    }

    /// Returns the refresh token, if present and non-empty.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(&self.refresh_token)
    }

    /// Returns the client ID, if present and non-empty.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        non_empty(&self.client_id)
    }

    /// Returns the client secret, if present and non-empty.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        non_empty(&self.client_secret)
    }

    /// Returns the requested scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(scope::parse_scope)
            .unwrap_or_default()
    }

    /// Returns the request JWT, if present and non-empty.
    #[must_use]
    pub fn jwt(&self) -> Option<&str> {
        non_empty(&self.jwt)
    }

    /// Returns the presented device secret, if present and non-empty.
    #[must_use]
    pub fn device_secret(&self) -> Option<&str> {
        non_empty(&self.device_secret)
    }

    /// Returns the app2app device key JWT, if present and non-empty.
    #[must_use]
    pub fn app2app_device_key_jwt(&self) -> Option<&str> {
        non_empty(&self.x_app2app_device_key_jwt)
    }

    /// Returns the app2app PKCE challenge, if present and non-empty.
    #[must_use]
    pub fn code_challenge(&self) -> Option<&str> {
        non_empty(&self.code_challenge)
    }

    /// Decodes `x_device_info`.
    ///
    /// An absent or empty field yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if the field is not base64url-encoded JSON
    /// object.
    pub fn device_info(&self) -> OAuthResult<DeviceInfo> {
        let Some(encoded) = non_empty(&self.x_device_info) else {
            return Ok(DeviceInfo::new());
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| OAuthError::invalid_request(format!("invalid x_device_info: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| OAuthError::invalid_request(format!("invalid x_device_info: {e}")))
    }

    /// Checks that the fields the grant type needs are present.
    ///
    /// This runs before the client's grant-type permission is checked.
    ///
    /// # Errors
    ///
    /// - `unsupported_grant_type` for an unknown grant type
    /// - `invalid_request` naming the first missing field
    pub fn validate(&self, client: &OAuthClient) -> OAuthResult<GrantType> {
        let grant_type = GrantType::parse(&self.grant_type)
            .ok_or_else(|| OAuthError::unsupported_grant_type(self.grant_type.clone()))?;

        match grant_type {
            GrantType::AuthorizationCode | GrantType::SettingsAction => {
                if self.code().is_none() {
                    return Err(OAuthError::invalid_request("code is required"));
                }
                if client.is_public() && self.code_verifier().is_none() {
                    return Err(OAuthError::invalid_request("PKCE code verifier is required"));
                }
                if client.is_confidential() && self.client_secret().is_none() {
                    return Err(OAuthError::invalid_request("client secret is required"));
                }
            }
            GrantType::RefreshToken => {
                if self.refresh_token().is_none() {
                    return Err(OAuthError::invalid_request("refresh token is required"));
                }
            }
            GrantType::AnonymousRequest | GrantType::BiometricRequest => {
                if self.jwt().is_none() {
                    return Err(OAuthError::invalid_request("jwt is required"));
                }
            }
            GrantType::App2AppRequest => {
                if self.jwt().is_none() {
                    return Err(OAuthError::invalid_request("jwt is required"));
                }
                if self.refresh_token().is_none() {
                    return Err(OAuthError::invalid_request("refresh token is required"));
                }
                if self.client_id().is_none() {
                    return Err(OAuthError::invalid_request("client id is required"));
                }
                if self.redirect_uri().is_empty() {
                    return Err(OAuthError::invalid_request("redirect uri is required"));
                }
                if self.code_challenge().is_some() {
                    let method = self.code_challenge_method.as_deref().unwrap_or_default();
                    if !pkce::is_supported_method(method) {
                        return Err(OAuthError::invalid_request(
                            "only 'S256' PKCE transform is supported",
                        ));
                    }
                }
            }
            // Token exchange validates per requested_token_type.
            GrantType::IdToken | GrantType::TokenExchange => {}
        }

        Ok(grant_type)
    }
}

// =============================================================================
// Response
// =============================================================================

/// Successful token response.
///
/// Built up by the grant handlers: device-secret rotation, access-token
/// issuance and ID-token issuance each fill in their own fields.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 1800,
///   "refresh_token": "0b7c...",
///   "id_token": "eyJhbG..."
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    /// Access token, or the exchanged token for token exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Token type of `access_token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Lifetime of `access_token` in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// OIDC ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Device secret for device SSO.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_secret: Option<String>,

    /// Token type of the exchanged token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,

    /// Authorization code minted by an app2app request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl TokenResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a bearer access token.
    pub fn set_access_token(&mut self, token: impl Into<String>, expires_in: u64) {
        self.access_token = Some(token.into());
        self.token_type = Some("Bearer".to_string());
        self.expires_in = Some(expires_in);
    }

    /// Sets the refresh token.
    pub fn set_refresh_token(&mut self, token: impl Into<String>) {
        self.refresh_token = Some(token.into());
    }

    /// Sets the ID token.
    pub fn set_id_token(&mut self, token: impl Into<String>) {
        self.id_token = Some(token.into());
    }

    /// Sets the device secret.
    pub fn set_device_secret(&mut self, secret: impl Into<String>) {
        self.device_secret = Some(secret.into());
    }

    /// Returns `true` if nothing has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
