//! HTTP handlers for the token endpoint.
//!
//! - [`token`] - `POST /oauth2/token`

pub mod token;

pub use token::{TOKEN_ENDPOINT_PATH, TokenEndpointState, router, token_handler};
