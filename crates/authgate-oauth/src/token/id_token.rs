//! OpenID Connect ID tokens.
//!
//! ID tokens double as session handles for native apps: the `sid` claim names
//! the session, and `ds_hash` pins the device secret that may be traded for a
//! pre-authenticated URL token.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::token::jwt::JwtService;
use crate::types::AuthenticationInfo;

/// Default ID token lifetime.
pub const DEFAULT_ID_TOKEN_LIFETIME: Duration = Duration::hours(1);

/// Claims of an ID token issued by this server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (user ID).
    pub sub: String,

    /// Audience (client ID).
    pub aud: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// When the user last authenticated (Unix timestamp).
    pub auth_time: i64,

    /// Encoded session ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Nonce from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Authentication method references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amr: Vec<String>,

    /// Hash of the device secret bound to the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_hash: Option<String>,

    /// Preferred UI locales.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_locales: Option<String>,
}

/// Inputs for a new ID token.
#[derive(Debug, Clone)]
pub struct IssueIdTokenOptions {
    /// Audience.
    pub client_id: String,
    /// Encoded session ID.
    pub sid: Option<String>,
    /// Nonce to echo.
    pub nonce: Option<String>,
    /// Authentication the token describes.
    pub authentication_info: AuthenticationInfo,
    /// Device secret hash to pin.
    pub device_secret_hash: Option<String>,
    /// Preferred UI locales.
    pub ui_locales: Option<String>,
}

impl IssueIdTokenOptions {
    /// Creates options for `client_id` describing `authentication_info`.
    #[must_use]
    pub fn new(client_id: impl Into<String>, authentication_info: AuthenticationInfo) -> Self {
        Self {
            client_id: client_id.into(),
            sid: None,
            nonce: None,
            authentication_info,
            device_secret_hash: None,
            ui_locales: None,
        }
    }

    /// Sets the session ID.
    #[must_use]
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Sets the device secret hash.
    #[must_use]
    pub fn with_device_secret_hash(mut self, hash: Option<String>) -> Self {
        self.device_secret_hash = hash;
        self
    }
}

/// Issues and verifies ID tokens.
pub trait IdTokenIssuer: Send + Sync {
    /// Returns the issuer identifier.
    fn iss(&self) -> &str;

    /// Issues an ID token.
    ///
    /// # Errors
    ///
    /// Returns an internal error if signing fails.
    fn issue_id_token(&self, options: IssueIdTokenOptions) -> OAuthResult<String>;

    /// Verifies an ID token issued by this server and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if the token is malformed, expired or not
    /// signed by this server.
    fn verify_id_token(&self, token: &str) -> OAuthResult<IdTokenClaims>;
}

/// [`IdTokenIssuer`] backed by the server signing key.
pub struct JwtIdTokenIssuer {
    jwt: Arc<JwtService>,
    lifetime: Duration,
}

impl JwtIdTokenIssuer {
    /// Creates an issuer with the default lifetime.
    #[must_use]
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self {
            jwt,
            lifetime: DEFAULT_ID_TOKEN_LIFETIME,
        }
    }

    /// Sets the ID token lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
}

impl IdTokenIssuer for JwtIdTokenIssuer {
    fn iss(&self) -> &str {
        self.jwt.issuer()
    }

    fn issue_id_token(&self, options: IssueIdTokenOptions) -> OAuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let info = options.authentication_info;

        let claims = IdTokenClaims {
            iss: self.jwt.issuer().to_string(),
            sub: info.user_id,
            aud: options.client_id,
            iat: now.unix_timestamp(),
            exp: (now + self.lifetime).unix_timestamp(),
            auth_time: info.authenticated_at.unix_timestamp(),
            sid: options.sid,
            nonce: options.nonce,
            amr: info.amr,
            ds_hash: options.device_secret_hash,
            ui_locales: options.ui_locales,
        };

        self.jwt
            .encode(&claims)
            .map_err(|e| OAuthError::internal(format!("failed to encode ID token: {e}")))
    }

    fn verify_id_token(&self, token: &str) -> OAuthResult<IdTokenClaims> {
        self.jwt
            .decode::<IdTokenClaims>(token)
            .map(|data| data.claims)
            .map_err(|e| OAuthError::invalid_request(format!("invalid ID token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::SigningKeyPair;

    fn issuer() -> JwtIdTokenIssuer {
        let key = SigningKeyPair::generate_ec().unwrap();
        JwtIdTokenIssuer::new(Arc::new(JwtService::new(key, "https://auth.example.com")))
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer();
        let info = AuthenticationInfo::new("user-1", OffsetDateTime::now_utc())
            .with_amr(vec!["x_biometric".to_string()]);

        let token = issuer
            .issue_id_token(
                IssueIdTokenOptions::new("client-a", info)
                    .with_sid("c2lk")
                    .with_device_secret_hash(Some("ds".to_string())),
            )
            .unwrap();

        let claims = issuer.verify_id_token(&token).unwrap();
        assert_eq!(claims.iss, "https://auth.example.com");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.aud, "client-a");
        assert_eq!(claims.sid.as_deref(), Some("c2lk"));
        assert_eq!(claims.ds_hash.as_deref(), Some("ds"));
        assert_eq!(claims.amr, vec!["x_biometric"]);
    }

    #[test]
    fn test_verify_rejects_foreign_token() {
        let a = issuer();
        let b = issuer();
        let token = a
            .issue_id_token(IssueIdTokenOptions::new(
                "client-a",
                AuthenticationInfo::new("user-1", OffsetDateTime::now_utc()),
            ))
            .unwrap();

        let err = b.verify_id_token(&token).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }
}
