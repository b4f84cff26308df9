//! Storage traits for grants and sessions.
//!
//! The token endpoint never caches what it reads through these traits across
//! requests. In-process implementations live in `authgate-oauth-memory`.

pub mod code_grant;
pub mod offline_grant;

use async_trait::async_trait;

use crate::OAuthResult;
use crate::types::AppSessionToken;

pub use code_grant::{CodeGrantStore, SettingsActionGrantStore};
pub use offline_grant::OfflineGrantStore;

/// Storage for app-session tokens.
#[async_trait]
pub trait AppSessionTokenStore: Send + Sync {
    /// Stores a new app-session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    async fn create_app_session_token(&self, token: &AppSessionToken) -> OAuthResult<()>;
}
