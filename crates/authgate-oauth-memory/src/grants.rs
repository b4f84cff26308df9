//! Code grant, settings-action grant and app-session token stores.

use async_trait::async_trait;
use authgate_oauth::OAuthResult;
use authgate_oauth::storage::{AppSessionTokenStore, CodeGrantStore, SettingsActionGrantStore};
use authgate_oauth::types::{AppSessionToken, CodeGrant, SettingsActionGrant};
use dashmap::DashMap;

/// Code grants keyed by code hash.
#[derive(Debug, Default)]
pub struct MemoryCodeGrantStore {
    grants: DashMap<String, CodeGrant>,
}

impl MemoryCodeGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl CodeGrantStore for MemoryCodeGrantStore {
    async fn create_code_grant(&self, grant: &CodeGrant) -> OAuthResult<()> {
        self.grants.insert(grant.code_hash.clone(), grant.clone());
        Ok(())
    }

    async fn get_code_grant(&self, code_hash: &str) -> OAuthResult<Option<CodeGrant>> {
        Ok(self.grants.get(code_hash).map(|g| g.clone()))
    }

    async fn delete_code_grant(&self, grant: &CodeGrant) -> OAuthResult<()> {
        self.grants.remove(&grant.code_hash);
        Ok(())
    }
}

/// Settings-action grants keyed by code hash.
#[derive(Debug, Default)]
pub struct MemorySettingsActionGrantStore {
    grants: DashMap<String, SettingsActionGrant>,
}

impl MemorySettingsActionGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl SettingsActionGrantStore for MemorySettingsActionGrantStore {
    async fn create_settings_action_grant(&self, grant: &SettingsActionGrant) -> OAuthResult<()> {
        self.grants.insert(grant.code_hash.clone(), grant.clone());
        Ok(())
    }

    async fn get_settings_action_grant(
        &self,
        code_hash: &str,
    ) -> OAuthResult<Option<SettingsActionGrant>> {
        Ok(self.grants.get(code_hash).map(|g| g.clone()))
    }

    async fn delete_settings_action_grant(&self, grant: &SettingsActionGrant) -> OAuthResult<()> {
        self.grants.remove(&grant.code_hash);
        Ok(())
    }
}

/// App-session tokens keyed by token hash.
#[derive(Debug, Default)]
pub struct MemoryAppSessionTokenStore {
    tokens: DashMap<String, AppSessionToken>,
}

impl MemoryAppSessionTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a token by its hash.
    pub fn get(&self, token_hash: &str) -> Option<AppSessionToken> {
        self.tokens.get(token_hash).map(|t| t.clone())
    }
}

#[async_trait]
impl AppSessionTokenStore for MemoryAppSessionTokenStore {
    async fn create_app_session_token(&self, token: &AppSessionToken) -> OAuthResult<()> {
        self.tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }
}
