//! IDP sessions and session termination.

use std::sync::Arc;

use async_trait::async_trait;
use authgate_oauth::OAuthResult;
use authgate_oauth::services::{IdpSessionProvider, SessionManager};
use authgate_oauth::storage::OfflineGrantStore;
use authgate_oauth::types::{IdpSession, OfflineGrant};
use dashmap::{DashMap, DashSet};

/// IDP sessions keyed by ID.
#[derive(Debug, Default)]
pub struct MemoryIdpSessionProvider {
    sessions: DashMap<String, IdpSession>,
}

impl MemoryIdpSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: IdpSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }
}

#[async_trait]
impl IdpSessionProvider for MemoryIdpSessionProvider {
    async fn get_idp_session(&self, id: &str) -> OAuthResult<Option<IdpSession>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }
}

/// Revokes offline grants by deleting them from the store, and remembers
/// what it revoked.
pub struct MemorySessionManager {
    offline_grants: Arc<dyn OfflineGrantStore>,
    revoked: DashSet<String>,
}

impl MemorySessionManager {
    pub fn new(offline_grants: Arc<dyn OfflineGrantStore>) -> Self {
        Self {
            offline_grants,
            revoked: DashSet::new(),
        }
    }

    /// Returns `true` if the grant was revoked through this manager.
    pub fn was_revoked(&self, offline_grant_id: &str) -> bool {
        self.revoked.contains(offline_grant_id)
    }
}

#[async_trait]
impl SessionManager for MemorySessionManager {
    async fn revoke_without_event(&self, grant: &OfflineGrant) -> OAuthResult<()> {
        self.offline_grants.delete_offline_grant(grant).await?;
        self.revoked.insert(grant.id.clone());
        tracing::debug!(offline_grant_id = %grant.id, "offline grant revoked");
        Ok(())
    }
}
