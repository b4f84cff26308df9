//! OAuth 2.0 protocol primitives used by the token endpoint.
//!
//! - [`app2app`] - app2app request JWTs
//! - [`grant_type`] - grant type and token type identifiers
//! - [`token`] - token request parsing/validation and the response accumulator
//! - [`pkce`] - PKCE S256 verifier
//! - [`dpop`] - DPoP proof verification and key thumbprints
//! - [`secret`] - opaque token generation, hashing and constant-time comparison

pub mod app2app;
pub mod dpop;
pub mod grant_type;
pub mod pkce;
pub mod secret;
pub mod token;

pub use app2app::{APP2APP_JWT_TYPE, App2AppRequest};
pub use dpop::{DpopProof, verify_dpop_proof};
pub use grant_type::{
    DEVICE_SECRET_TOKEN_TYPE, GrantType, ID_TOKEN_TYPE, PRE_AUTHENTICATED_URL_TOKEN_TYPE,
};
pub use pkce::{PkceError, PkceVerifier, compute_s256_challenge};
pub use secret::{constant_time_eq, generate_token, hash_token};
pub use token::{TokenRequest, TokenResponse};
