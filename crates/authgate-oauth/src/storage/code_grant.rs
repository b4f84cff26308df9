//! Single-use code storage.
//!
//! Codes are looked up by the SHA-256 hash of the plaintext code. The token
//! endpoint deletes a code only after tokens were issued for it; a failed
//! delete is logged and otherwise ignored.

use async_trait::async_trait;

use crate::OAuthResult;
use crate::types::{CodeGrant, SettingsActionGrant};

/// Storage for authorization codes.
#[async_trait]
pub trait CodeGrantStore: Send + Sync {
    /// Stores a new code grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    async fn create_code_grant(&self, grant: &CodeGrant) -> OAuthResult<()>;

    /// Finds a code grant by code hash.
    ///
    /// Expired grants are returned too; callers check expiry themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_code_grant(&self, code_hash: &str) -> OAuthResult<Option<CodeGrant>>;

    /// Deletes a code grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_code_grant(&self, grant: &CodeGrant) -> OAuthResult<()>;
}

/// Storage for settings-action codes.
#[async_trait]
pub trait SettingsActionGrantStore: Send + Sync {
    /// Stores a new settings-action grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    async fn create_settings_action_grant(&self, grant: &SettingsActionGrant) -> OAuthResult<()>;

    /// Finds a settings-action grant by code hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_settings_action_grant(
        &self,
        code_hash: &str,
    ) -> OAuthResult<Option<SettingsActionGrant>>;

    /// Deletes a settings-action grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_settings_action_grant(&self, grant: &SettingsActionGrant) -> OAuthResult<()>;
}
