//! # authgate-oauth
//!
//! The OAuth 2.0 / OpenID Connect token endpoint of Authgate.
//!
//! This crate turns authorization artifacts (codes, refresh tokens,
//! anonymous and biometric assertions, device secrets, app2app requests)
//! into access, refresh and ID tokens, enforcing PKCE, DPoP, device-secret
//! and app2app device-key binding along the way.
//!
//! ## Modules
//!
//! - [`handler`] - the token endpoint and one handler per grant type
//! - [`lifecycle`] - offline grant issuance, rotation and key binding
//! - [`token`] - access/ID token issuers and the token service
//! - [`oauth`] - request parsing, PKCE, DPoP, app2app JWTs, opaque secrets
//! - [`types`] - clients, grants, sessions, authorizations
//! - [`storage`] - grant store traits
//! - [`services`] - collaborators: clients, scopes, authorizations, events, challenges
//! - [`interaction`] - the interaction-graph seam used by anonymous and biometric sign-in
//! - [`http`] - axum handler for `POST /oauth2/token`
//! - [`config`] - configuration loading
//! - [`telemetry`] - tracing bootstrap
//!
//! Storage and collaborator implementations live in `authgate-oauth-memory`
//! or in the embedding application.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod interaction;
pub mod lifecycle;
pub mod oauth;
pub mod scope;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod token;
pub mod types;

pub use config::{TokenEndpointConfig, load_config};
pub use error::OAuthError;
pub use handler::{RequestContext, TokenHandler, TokenHandlerDeps, TokenHandlerOptions};
pub use http::{TokenEndpointState, router, token_handler};
pub use lifecycle::OfflineGrantManager;
pub use oauth::{GrantType, TokenRequest, TokenResponse};
pub use types::{OAuthClient, OfflineGrant};

/// Type alias for token endpoint results.
pub type OAuthResult<T> = Result<T, OAuthError>;
