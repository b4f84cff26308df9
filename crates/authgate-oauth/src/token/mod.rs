//! Token issuance.
//!
//! - [`jwt`] - signing keys and JWT helpers
//! - [`id_token`] - OIDC ID tokens
//! - [`access_token`] - access token encoding
//! - [`service`] - refresh tokens, access grants and device secrets

pub mod access_token;
pub mod id_token;
pub mod jwt;
pub mod service;

#[cfg(test)]
pub(crate) mod mocks;

pub use access_token::{AccessTokenClaims, AccessTokenIssuer, JwtAccessTokenIssuer};
pub use id_token::{IdTokenClaims, IdTokenIssuer, IssueIdTokenOptions, JwtIdTokenIssuer};
pub use jwt::{JwtError, JwtService, SigningKeyPair};
pub use service::{
    IssueAccessGrantOptions, IssueOfflineGrantOptions, IssueRefreshTokenOptions, TokenService,
};
