//! Offline grant lifecycle.
//!
//! Every mutation of a live offline grant recomputes its expiry and goes
//! through one atomic store update, so concurrent requests against the same
//! grant never lose each other's writes.

use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;

use crate::OAuthResult;
use crate::oauth::secret::{constant_time_eq, hash_token};
use crate::oauth::token::TokenResponse;
use crate::scope;
use crate::services::SessionManager;
use crate::storage::OfflineGrantStore;
use crate::token::service::{IssueOfflineGrantOptions, TokenService};
use crate::types::{AccessEvent, DeviceInfo, DeviceKeyTransition, OAuthClient, OfflineGrant};

/// Issues, rotates and re-binds offline grants.
pub struct OfflineGrantManager {
    tokens: Arc<TokenService>,
    sessions: Arc<dyn SessionManager>,
}

impl OfflineGrantManager {
    /// Creates a new manager.
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, sessions: Arc<dyn SessionManager>) -> Self {
        Self { tokens, sessions }
    }

    fn store(&self) -> &Arc<dyn OfflineGrantStore> {
        self.tokens.offline_grants()
    }

    /// Computes the expiry of `grant` from its initial client's settings.
    #[must_use]
    pub fn compute_expiry(&self, grant: &OfflineGrant) -> OffsetDateTime {
        self.tokens.compute_offline_grant_expiry(grant)
    }

    /// Creates an offline grant for `client`.
    ///
    /// With `revoke_existing` set and a client limited to one concurrent
    /// session, the user's other grants from this client are revoked first.
    ///
    /// # Errors
    ///
    /// Returns an error if revocation or creation fails.
    pub async fn issue_offline_grant(
        &self,
        client: &OAuthClient,
        opts: IssueOfflineGrantOptions,
        resp: Option<&mut TokenResponse>,
        revoke_existing: bool,
    ) -> OAuthResult<(OfflineGrant, String)> {
        if revoke_existing && client.max_concurrent_session == 1 {
            self.revoke_client_offline_grants(&client.client_id, &opts.authentication_info.user_id)
                .await?;
        }
        self.tokens.issue_offline_grant(client, opts, resp).await
    }

    /// Revokes every offline grant `user_id` holds from `client_id`, without
    /// session-ended events.
    ///
    /// # Errors
    ///
    /// Returns the first revocation failure.
    pub async fn revoke_client_offline_grants(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> OAuthResult<()> {
        let grants = self
            .store()
            .list_client_offline_grants(client_id, user_id)
            .await?;
        for grant in &grants {
            self.sessions.revoke_without_event(grant).await?;
        }
        if !grants.is_empty() {
            tracing::info!(
                client_id = %client_id,
                revoked = grants.len(),
                "revoked existing offline grants"
            );
        }
        Ok(())
    }

    /// Mints a new device secret into `resp` and binds its hash (and the
    /// proof key, if any) to the grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be updated.
    pub async fn rotate_device_secret(
        &self,
        grant: &OfflineGrant,
        dpop_jkt: Option<&str>,
        resp: &mut TokenResponse,
    ) -> OAuthResult<OfflineGrant> {
        let hash = TokenService::issue_device_secret(resp);
        let expire_at = self.compute_expiry(grant);
        let grant = self
            .store()
            .update_offline_grant_device_secret_hash(
                &grant.id,
                hash,
                dpop_jkt.map(str::to_string),
                expire_at,
            )
            .await?;
        tracing::debug!(offline_grant_id = %grant.id, "device secret rotated");
        Ok(grant)
    }

    /// Rotates the device secret when `device_sso` is among the authorized
    /// scopes. Returns the grant and whether it rotated.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be updated.
    pub async fn rotate_device_secret_if_sufficient_scope(
        &self,
        authorized_scopes: &[String],
        grant: OfflineGrant,
        dpop_jkt: Option<&str>,
        resp: &mut TokenResponse,
    ) -> OAuthResult<(OfflineGrant, bool)> {
        if !scope::contains(authorized_scopes, scope::DEVICE_SSO) {
            return Ok((grant, false));
        }
        let grant = self.rotate_device_secret(&grant, dpop_jkt, resp).await?;
        Ok((grant, true))
    }

    /// Rotates the device secret only when the caller presented the current
    /// one and `device_sso` is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be updated.
    pub async fn rotate_device_secret_if_present_and_valid(
        &self,
        device_secret: Option<&str>,
        authorized_scopes: &[String],
        grant: OfflineGrant,
        dpop_jkt: Option<&str>,
        resp: &mut TokenResponse,
    ) -> OAuthResult<(OfflineGrant, bool)> {
        let Some(device_secret) = device_secret else {
            return Ok((grant, false));
        };
        let stored = grant.device_secret_hash.as_deref().unwrap_or_default();
        if !constant_time_eq(&hash_token(device_secret), stored) {
            return Ok((grant, false));
        }
        self.rotate_device_secret_if_sufficient_scope(authorized_scopes, grant, dpop_jkt, resp)
            .await
    }

    /// Binds a presented app2app device key to the grant when `client` takes
    /// part in app2app.
    ///
    /// # Errors
    ///
    /// See [`Self::bind_app2app_device_key`].
    pub async fn update_app2app_device_key_if_needed(
        &self,
        client: &OAuthClient,
        grant: OfflineGrant,
        key: Option<&Value>,
    ) -> OAuthResult<OfflineGrant> {
        match key.filter(|_| client.app2app_enabled) {
            Some(key) => self.bind_app2app_device_key(client, grant, key).await,
            None => Ok(grant),
        }
    }

    /// Presents `key` to the grant's device-key binding and persists the
    /// binding if the key is new.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` if a different key is already bound.
    /// - `invalid_request` if binding needs the client's insecure flag.
    pub async fn bind_app2app_device_key(
        &self,
        client: &OAuthClient,
        grant: OfflineGrant,
        key: &Value,
    ) -> OAuthResult<OfflineGrant> {
        match grant
            .app2app_device_key
            .transition(key, client.app2app_insecure_device_key_binding_enabled)?
        {
            DeviceKeyTransition::Unchanged => Ok(grant),
            DeviceKeyTransition::Bind(key) => {
                let expire_at = self.compute_expiry(&grant);
                let grant = self
                    .store()
                    .update_offline_grant_app2app_device_key(&grant.id, key, expire_at)
                    .await?;
                tracing::info!(offline_grant_id = %grant.id, "app2app device key bound");
                Ok(grant)
            }
        }
    }

    /// Advances `authenticated_at` if `authenticated_at` is newer.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be updated.
    pub async fn update_authenticated_at_if_newer(
        &self,
        grant: OfflineGrant,
        authenticated_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        if authenticated_at <= grant.authenticated_at {
            return Ok(grant);
        }
        let expire_at = self.compute_expiry(&grant);
        self.store()
            .update_offline_grant_authenticated_at(&grant.id, authenticated_at, expire_at)
            .await
    }

    /// Records an access and merges the latest device info into the grant,
    /// extending the idle expiry accordingly.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be updated.
    pub async fn access_and_update_device_info(
        &self,
        grant: &OfflineGrant,
        access_event: AccessEvent,
        device_info: DeviceInfo,
    ) -> OAuthResult<OfflineGrant> {
        let mut accessed = grant.clone();
        accessed.access_info.last_access = access_event.clone();
        let expire_at = self.compute_expiry(&accessed);
        self.store()
            .access_offline_grant_and_update_device_info(
                &grant.id,
                access_event,
                device_info,
                expire_at,
            )
            .await
    }
}
