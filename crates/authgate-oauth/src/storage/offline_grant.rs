//! Offline grant storage.
//!
//! # Atomicity
//!
//! Every `update_*` method is a single read-modify-write of one grant and
//! must be atomic with respect to other updates of the same grant. The new
//! expiry is written together with the change it belongs to. Updates of a
//! grant that no longer exists fail with [`OAuthError::InvalidGrant`].
//!
//! [`OAuthError::InvalidGrant`]: crate::error::OAuthError::InvalidGrant

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::OAuthResult;
use crate::types::{AccessEvent, DeviceInfo, OfflineGrant, RefreshTokenEntry};

/// Storage for offline grants (refresh-token sessions).
#[async_trait]
pub trait OfflineGrantStore: Send + Sync {
    /// Stores a new offline grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    async fn create_offline_grant(&self, grant: &OfflineGrant) -> OAuthResult<()>;

    /// Finds an offline grant by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_offline_grant(&self, id: &str) -> OAuthResult<Option<OfflineGrant>>;

    /// Deletes an offline grant and with it every refresh token it holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_offline_grant(&self, grant: &OfflineGrant) -> OAuthResult<()>;

    /// Records an access and merges the device info.
    ///
    /// Merging is shallow: each top-level key of `device_info` replaces the
    /// stored value under that key and keys absent from `device_info` are
    /// kept. An empty `device_info` leaves the stored info unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant does not exist or the update fails.
    async fn access_offline_grant_and_update_device_info(
        &self,
        id: &str,
        access_event: AccessEvent,
        device_info: DeviceInfo,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant>;

    /// Sets the authentication time after a reauthentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant does not exist or the update fails.
    async fn update_offline_grant_authenticated_at(
        &self,
        id: &str,
        authenticated_at: OffsetDateTime,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant>;

    /// Binds an app2app device key.
    ///
    /// Implementations must refuse to replace a different key bound
    /// concurrently, failing with `invalid_grant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant does not exist, holds a different key,
    /// or the update fails.
    async fn update_offline_grant_app2app_device_key(
        &self,
        id: &str,
        key: Value,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant>;

    /// Replaces the device secret hash and its DPoP binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant does not exist or the update fails.
    async fn update_offline_grant_device_secret_hash(
        &self,
        id: &str,
        device_secret_hash: String,
        dpop_jkt: Option<String>,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant>;

    /// Adds a refresh token for another client joining the grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant does not exist or the update fails.
    async fn add_offline_grant_refresh_token(
        &self,
        id: &str,
        entry: RefreshTokenEntry,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant>;

    /// Lists every offline grant of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_offline_grants(&self, user_id: &str) -> OAuthResult<Vec<OfflineGrant>>;

    /// Lists the offline grants a client created for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_client_offline_grants(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> OAuthResult<Vec<OfflineGrant>>;
}
