//! Offline grant store.

use async_trait::async_trait;
use authgate_oauth::OAuthResult;
use authgate_oauth::error::OAuthError;
use authgate_oauth::storage::OfflineGrantStore;
use authgate_oauth::types::{
    AccessEvent, DeviceInfo, DeviceKeyBinding, OfflineGrant, RefreshTokenEntry,
};
use dashmap::DashMap;
use serde_json::Value;
use time::OffsetDateTime;

/// Offline grants keyed by ID.
///
/// Each update runs under the shard lock of its entry, so concurrent updates
/// of one grant are serialized.
#[derive(Debug, Default)]
pub struct MemoryOfflineGrantStore {
    grants: DashMap<String, OfflineGrant>,
}

impl MemoryOfflineGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live grants.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    fn update<F>(&self, id: &str, expire_at: OffsetDateTime, f: F) -> OAuthResult<OfflineGrant>
    where
        F: FnOnce(&mut OfflineGrant) -> OAuthResult<()>,
    {
        let mut entry = self
            .grants
            .get_mut(id)
            .ok_or_else(|| OAuthError::invalid_grant("offline grant not found"))?;
        f(entry.value_mut())?;
        entry.expire_at = expire_at;
        Ok(entry.clone())
    }
}

#[async_trait]
impl OfflineGrantStore for MemoryOfflineGrantStore {
    async fn create_offline_grant(&self, grant: &OfflineGrant) -> OAuthResult<()> {
        if self.grants.contains_key(&grant.id) {
            return Err(OAuthError::storage(format!(
                "offline grant {} already exists",
                grant.id
            )));
        }
        self.grants.insert(grant.id.clone(), grant.clone());
        Ok(())
    }

    async fn get_offline_grant(&self, id: &str) -> OAuthResult<Option<OfflineGrant>> {
        Ok(self.grants.get(id).map(|g| g.clone()))
    }

    async fn delete_offline_grant(&self, grant: &OfflineGrant) -> OAuthResult<()> {
        self.grants.remove(&grant.id);
        Ok(())
    }

    async fn access_offline_grant_and_update_device_info(
        &self,
        id: &str,
        access_event: AccessEvent,
        device_info: DeviceInfo,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, expire_at, |grant| {
            grant.access_info.last_access = access_event;
            grant.device_info.extend(device_info);
            Ok(())
        })
    }

    async fn update_offline_grant_authenticated_at(
        &self,
        id: &str,
        authenticated_at: OffsetDateTime,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, expire_at, |grant| {
            grant.authenticated_at = authenticated_at;
            Ok(())
        })
    }

    async fn update_offline_grant_app2app_device_key(
        &self,
        id: &str,
        key: Value,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, expire_at, |grant| {
            if let DeviceKeyBinding::Bound(current) = &grant.app2app_device_key {
                if *current != key {
                    return Err(OAuthError::invalid_grant(
                        "app2app device key cannot be changed",
                    ));
                }
            }
            grant.app2app_device_key = DeviceKeyBinding::Bound(key);
            Ok(())
        })
    }

    async fn update_offline_grant_device_secret_hash(
        &self,
        id: &str,
        device_secret_hash: String,
        dpop_jkt: Option<String>,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, expire_at, |grant| {
            grant.device_secret_hash = Some(device_secret_hash);
            grant.device_secret_dpop_jkt = dpop_jkt;
            Ok(())
        })
    }

    async fn add_offline_grant_refresh_token(
        &self,
        id: &str,
        entry: RefreshTokenEntry,
        expire_at: OffsetDateTime,
    ) -> OAuthResult<OfflineGrant> {
        self.update(id, expire_at, |grant| {
            grant.refresh_tokens.push(entry);
            Ok(())
        })
    }

    async fn list_offline_grants(&self, user_id: &str) -> OAuthResult<Vec<OfflineGrant>> {
        Ok(self
            .grants
            .iter()
            .filter(|g| g.user_id == user_id)
            .map(|g| g.clone())
            .collect())
    }

    async fn list_client_offline_grants(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> OAuthResult<Vec<OfflineGrant>> {
        Ok(self
            .grants
            .iter()
            .filter(|g| g.user_id == user_id && g.initial_client_id == client_id)
            .map(|g| g.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate_oauth::types::AccessInfo;
    use serde_json::json;

    fn grant(id: &str, client_id: &str, user_id: &str) -> OfflineGrant {
        let now = OffsetDateTime::now_utc();
        let event = AccessEvent::new(now, None, None);
        OfflineGrant {
            id: id.to_string(),
            app_id: "app".to_string(),
            initial_client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            identity_id: None,
            idp_session_id: None,
            amr: vec![],
            created_at: now,
            authenticated_at: now,
            refresh_tokens: vec![],
            access_info: AccessInfo {
                initial_access: event.clone(),
                last_access: event,
            },
            device_info: DeviceInfo::new(),
            sso_enabled: false,
            device_secret_hash: None,
            device_secret_dpop_jkt: None,
            app2app_device_key: DeviceKeyBinding::Unbound,
            expire_at: now + time::Duration::days(1),
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = MemoryOfflineGrantStore::new();
        let g = grant("g1", "mobile", "u1");

        store.create_offline_grant(&g).await.unwrap();
        assert!(store.create_offline_grant(&g).await.is_err());
        assert_eq!(store.get_offline_grant("g1").await.unwrap(), Some(g.clone()));

        store.delete_offline_grant(&g).await.unwrap();
        assert!(store.get_offline_grant("g1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_writes_expiry() {
        let store = MemoryOfflineGrantStore::new();
        store
            .create_offline_grant(&grant("g1", "mobile", "u1"))
            .await
            .unwrap();

        let expire_at = OffsetDateTime::now_utc() + time::Duration::hours(3);
        let updated = store
            .update_offline_grant_device_secret_hash("g1", "h".to_string(), None, expire_at)
            .await
            .unwrap();
        assert_eq!(updated.device_secret_hash.as_deref(), Some("h"));
        assert_eq!(updated.expire_at, expire_at);
    }

    #[tokio::test]
    async fn test_update_missing_grant() {
        let store = MemoryOfflineGrantStore::new();
        let err = store
            .update_offline_grant_authenticated_at(
                "missing",
                OffsetDateTime::now_utc(),
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_device_key_cannot_be_replaced() {
        let store = MemoryOfflineGrantStore::new();
        store
            .create_offline_grant(&grant("g1", "mobile", "u1"))
            .await
            .unwrap();
        let expire_at = OffsetDateTime::now_utc() + time::Duration::days(1);

        let key_a = json!({"kty": "EC", "x": "a"});
        let key_b = json!({"kty": "EC", "x": "b"});
        store
            .update_offline_grant_app2app_device_key("g1", key_a.clone(), expire_at)
            .await
            .unwrap();
        store
            .update_offline_grant_app2app_device_key("g1", key_a.clone(), expire_at)
            .await
            .unwrap();

        let err = store
            .update_offline_grant_app2app_device_key("g1", key_b, expire_at)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let g = store.get_offline_grant("g1").await.unwrap().unwrap();
        assert_eq!(g.app2app_device_key.key(), Some(&key_a));
    }

    #[tokio::test]
    async fn test_list_by_user_and_client() {
        let store = MemoryOfflineGrantStore::new();
        for (id, client, user) in [("g1", "a", "u1"), ("g2", "b", "u1"), ("g3", "a", "u2")] {
            store
                .create_offline_grant(&grant(id, client, user))
                .await
                .unwrap();
        }

        assert_eq!(store.list_offline_grants("u1").await.unwrap().len(), 2);
        let listed = store.list_client_offline_grants("a", "u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "g1");
    }

    #[tokio::test]
    async fn test_device_info_is_merged() {
        let store = MemoryOfflineGrantStore::new();
        let mut g = grant("g1", "mobile", "u1");
        g.device_info.insert("model".to_string(), json!("pixel"));
        store.create_offline_grant(&g).await.unwrap();

        let mut info = DeviceInfo::new();
        info.insert("os".to_string(), json!("android"));
        let now = OffsetDateTime::now_utc();
        let updated = store
            .access_offline_grant_and_update_device_info(
                "g1",
                AccessEvent::new(now, Some("203.0.113.7".to_string()), None),
                info,
                now + time::Duration::days(1),
            )
            .await
            .unwrap();

        assert_eq!(updated.device_info["model"], "pixel");
        assert_eq!(updated.device_info["os"], "android");
        assert_eq!(
            updated.access_info.last_access.remote_ip.as_deref(),
            Some("203.0.113.7")
        );

        let mut info = DeviceInfo::new();
        info.insert("model".to_string(), json!("pixel 9"));
        let updated = store
            .access_offline_grant_and_update_device_info(
                "g1",
                AccessEvent::new(now, None, None),
                info,
                now + time::Duration::days(1),
            )
            .await
            .unwrap();
        assert_eq!(updated.device_info["model"], "pixel 9");
        assert_eq!(updated.device_info["os"], "android");

        // A request without device info keeps what is stored.
        let updated = store
            .access_offline_grant_and_update_device_info(
                "g1",
                AccessEvent::new(now, None, None),
                DeviceInfo::new(),
                now + time::Duration::days(1),
            )
            .await
            .unwrap();
        assert_eq!(updated.device_info.len(), 2);
    }
}
