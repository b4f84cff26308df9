//! Grant types and token types recognised by the token endpoint.

use std::fmt;

/// Token type of a pre-authenticated URL token (token exchange output).
pub const PRE_AUTHENTICATED_URL_TOKEN_TYPE: &str =
    "urn:authgear:params:oauth:token-type:pre-authenticated-url-token";

/// Token type of an OIDC ID token (token exchange subject).
pub const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";

/// Token type of a device secret (token exchange actor).
pub const DEVICE_SECRET_TOKEN_TYPE: &str = "urn:x-oath:params:oauth:token-type:device-secret";

/// Grant types accepted at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantType {
    /// `authorization_code`
    AuthorizationCode,
    /// `refresh_token`
    RefreshToken,
    /// RFC 8693 token exchange.
    TokenExchange,
    /// Sign in as an anonymous user.
    AnonymousRequest,
    /// Biometric setup or sign in.
    BiometricRequest,
    /// Hand a session over to another app.
    App2AppRequest,
    /// Re-issue an ID token for the current session.
    IdToken,
    /// Redeem a settings-action code.
    SettingsAction,
}

impl GrantType {
    /// Grant types every client may use, whatever it registered.
    pub const WHITELISTED: [GrantType; 8] = [
        Self::AuthorizationCode,
        Self::RefreshToken,
        Self::AnonymousRequest,
        Self::BiometricRequest,
        Self::App2AppRequest,
        Self::IdToken,
        Self::SettingsAction,
        Self::TokenExchange,
    ];

    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
            Self::AnonymousRequest => "urn:authgear:params:oauth:grant-type:anonymous-request",
            Self::BiometricRequest => "urn:authgear:params:oauth:grant-type:biometric-request",
            Self::App2AppRequest => "urn:authgear:params:oauth:grant-type:app2app-request",
            Self::IdToken => "urn:authgear:params:oauth:grant-type:id-token",
            Self::SettingsAction => "urn:authgear:params:oauth:grant-type:settings-action",
        }
    }

    /// Parses a wire value. Returns `None` for unknown grant types.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::WHITELISTED.into_iter().find(|g| g.as_str() == s)
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
