//! Access token encoding.
//!
//! The opaque token value is what the access grant is stored under. How it is
//! presented to the client (JWT, opaque string) is up to the issuer, which
//! may also consult hooks and refuse.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::scope::join_scope;
use crate::token::jwt::JwtService;
use crate::types::{AccessGrant, GrantSessionKind, OAuthClient};

/// JWT access token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer.
    pub iss: String,
    /// Subject (user ID).
    pub sub: String,
    /// Audience (client ID).
    pub aud: String,
    /// Client the token was issued to.
    pub client_id: String,
    /// Space-delimited scopes.
    pub scope: String,
    /// Backing session ID.
    pub sid: String,
    /// Backing session kind.
    pub session_kind: GrantSessionKind,
    /// Token ID: hash of the opaque token.
    pub jti: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Turns an access grant into the token string handed to the client.
pub trait AccessTokenIssuer: Send + Sync {
    /// Encodes the access token for `grant`.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::HookDisallowed`] if a hook refused the token, or
    /// an internal error if encoding fails.
    fn encode_access_token(
        &self,
        client: &OAuthClient,
        grant: &AccessGrant,
        user_id: &str,
        token: &str,
    ) -> OAuthResult<String>;
}

/// [`AccessTokenIssuer`] producing signed JWTs.
pub struct JwtAccessTokenIssuer {
    jwt: Arc<JwtService>,
}

impl JwtAccessTokenIssuer {
    /// Creates a new JWT access token issuer.
    #[must_use]
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self { jwt }
    }
}

impl AccessTokenIssuer for JwtAccessTokenIssuer {
    fn encode_access_token(
        &self,
        client: &OAuthClient,
        grant: &AccessGrant,
        user_id: &str,
        _token: &str,
    ) -> OAuthResult<String> {
        let claims = AccessTokenClaims {
            iss: self.jwt.issuer().to_string(),
            sub: user_id.to_string(),
            aud: client.client_id.clone(),
            client_id: client.client_id.clone(),
            scope: join_scope(&grant.scopes),
            sid: grant.session_id.clone(),
            session_kind: grant.session_kind,
            jti: grant.token_hash.clone(),
            iat: grant.created_at.unix_timestamp(),
            exp: grant.expire_at.unix_timestamp(),
        };

        self.jwt
            .encode(&claims)
            .map_err(|e| OAuthError::internal(format!("failed to encode access token: {e}")))
    }
}
