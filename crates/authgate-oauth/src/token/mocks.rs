//! In-process collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::services::{AuthorizationService, SessionManager};
use crate::storage::OfflineGrantStore;
use crate::types::{
    AccessEvent, Authorization, DeviceInfo, DeviceKeyBinding, OfflineGrant, RefreshTokenEntry,
};

#[derive(Default)]
pub(crate) struct MockOfflineGrantStore {
    pub(crate) grants: RwLock<HashMap<String, OfflineGrant>>,
}

impl MockOfflineGrantStore {
    async fn update(
        &self,
        id: &str,
        f: impl FnOnce(&mut OfflineGrant),
    ) -> OAuthResult<OfflineGrant> {
        let mut grants = self.grants.write().await;
        let grant = grants
            .get_mut(id)
            .ok_or_else(|| OAuthError::invalid_grant("offline grant not found"))?;
        f(grant);
        Ok(grant.clone())
    }
}

#[async_trait]
impl OfflineGrantStore for MockOfflineGrantStore {
    async fn create_offline_grant(&self, grant: &OfflineGrant) -> OAuthResult<()> {
        self.grants
            .write()
            .await
            .insert(grant.id.clone(), grant.clone());
        Ok(())
    }

    async fn get_offline_grant(&self, id: &str) -> OAuthResult<Option<OfflineGrant>> {
        Ok(self.grants.read().await.get(id).cloned())
    }

    async fn delete_offline_grant(&self, grant: &OfflineGrant) -> OAuthResult<()> {
        self.grants.write().await.remove(&grant.id);
        Ok(())
    }

    async fn access_offline_grant_and_update_device_info(
        &self,
        id: &str,
        access_event: AccessEvent,
        device_info: DeviceInfo,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, |g| {
            g.access_info.last_access = access_event;
            g.device_info.extend(device_info);
            g.expire_at = expire_at;
        })
        .await
    }

    async fn update_offline_grant_authenticated_at(
        &self,
        id: &str,
        authenticated_at: OffsetDateTime,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, |g| {
            g.authenticated_at = authenticated_at;
            g.expire_at = expire_at;
        })
        .await
    }

    async fn update_offline_grant_app2app_device_key(
        &self,
        id: &str,
        key: Value,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, |g| {
            g.app2app_device_key = DeviceKeyBinding::Bound(key);
            g.expire_at = expire_at;
        })
        .await
    }

    async fn update_offline_grant_device_secret_hash(
        &self,
        id: &str,
        device_secret_hash: String,
        dpop_jkt: Option<String>,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, |g| {
            g.device_secret_hash = Some(device_secret_hash);
            g.device_secret_dpop_jkt = dpop_jkt;
            g.expire_at = expire_at;
        })
        .await
    }

    async fn add_offline_grant_refresh_token(
        &self,
        id: &str,
        entry: RefreshTokenEntry,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, |g| {
            g.refresh_tokens.push(entry);
            g.expire_at = expire_at;
        })
        .await
    }

    async fn list_offline_grants(&self, user_id: &str) -> OAuthResult<Vec<OfflineGrant>> {
        Ok(self
            .grants
            .read()
            .await
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_client_offline_grants(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> OAuthResult<Vec<OfflineGrant>> {
        Ok(self
            .list_offline_grants(user_id)
            .await?
            .into_iter()
            .filter(|g| g.initial_client_id == client_id)
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct MockAuthorizationService {
    authorizations: RwLock<HashMap<String, Authorization>>,
}

#[async_trait]
impl AuthorizationService for MockAuthorizationService {
    async fn check_and_grant(
        &self,
        client_id: &str,
        user_id: &str,
        scopes: &[String],
    ) -> OAuthResult<Authorization> {
        let now = OffsetDateTime::now_utc();
        let id = format!("{client_id}:{user_id}");
        let mut authorizations = self.authorizations.write().await;
        let authz = authorizations.entry(id.clone()).or_insert_with(|| Authorization {
            id,
            app_id: "app".to_string(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            scopes: vec![],
        });
        authz.grant(scopes, now);
        Ok(authz.clone())
    }

    async fn get_by_id(&self, id: &str) -> OAuthResult<Option<Authorization>> {
        Ok(self.authorizations.read().await.get(id).cloned())
    }
}

/// Deletes revoked grants from the store and remembers their IDs.
pub(crate) struct MockSessionManager {
    store: Arc<MockOfflineGrantStore>,
    pub(crate) revoked: RwLock<Vec<String>>,
}

impl MockSessionManager {
    pub(crate) fn new(store: Arc<MockOfflineGrantStore>) -> Self {
        Self {
            store,
            revoked: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SessionManager for MockSessionManager {
    async fn revoke_without_event(&self, grant: &OfflineGrant) -> OAuthResult<()> {
        self.store.delete_offline_grant(grant).await?;
        self.revoked.write().await.push(grant.id.clone());
        Ok(())
    }
}
