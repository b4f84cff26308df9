//! Client/user authorizations.

use async_trait::async_trait;
use authgate_oauth::OAuthResult;
use authgate_oauth::services::AuthorizationService;
use authgate_oauth::types::Authorization;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Authorizations keyed by `(client_id, user_id)`.
#[derive(Debug)]
pub struct MemoryAuthorizationService {
    app_id: String,
    authorizations: DashMap<(String, String), Authorization>,
}

impl MemoryAuthorizationService {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            authorizations: DashMap::new(),
        }
    }

    /// Returns the authorization of `client_id` by `user_id`, if any.
    pub fn get(&self, client_id: &str, user_id: &str) -> Option<Authorization> {
        self.authorizations
            .get(&(client_id.to_string(), user_id.to_string()))
            .map(|a| a.clone())
    }

    /// Removes an authorization, as if the user revoked consent.
    pub fn revoke(&self, client_id: &str, user_id: &str) {
        self.authorizations
            .remove(&(client_id.to_string(), user_id.to_string()));
    }
}

#[async_trait]
impl AuthorizationService for MemoryAuthorizationService {
    async fn check_and_grant(
        &self,
        client_id: &str,
        user_id: &str,
        scopes: &[String],
    ) -> OAuthResult<Authorization> {
        let now = OffsetDateTime::now_utc();
        let mut entry = self
            .authorizations
            .entry((client_id.to_string(), user_id.to_string()))
            .or_insert_with(|| Authorization {
                id: Uuid::new_v4().to_string(),
                app_id: self.app_id.clone(),
                client_id: client_id.to_string(),
                user_id: user_id.to_string(),
                created_at: now,
                updated_at: now,
                scopes: Vec::new(),
            });
        if entry.grant(scopes, now) {
            tracing::debug!(client_id, user_id, "authorization scopes added");
        }
        Ok(entry.clone())
    }

    async fn get_by_id(&self, id: &str) -> OAuthResult<Option<Authorization>> {
        Ok(self
            .authorizations
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.clone()))
    }
}
