//! In-memory backend for the Authgate token endpoint.
//!
//! Every store and collaborator trait of `authgate-oauth` has an
//! implementation here, built on `dashmap`. Updates of one offline grant are
//! atomic with respect to each other. Nothing is persisted.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use authgate_oauth::{TokenHandler, TokenHandlerOptions};
//! use authgate_oauth_memory::MemoryBackend;
//!
//! let backend = MemoryBackend::new("myapp");
//! let handler = TokenHandler::new(
//!     TokenHandlerOptions::default(),
//!     backend.deps(clients, id_tokens, access_tokens),
//! );
//! ```

pub mod authorization;
pub mod challenge;
pub mod event;
pub mod grants;
pub mod interaction;
pub mod offline_grant;
pub mod pre_authenticated_url;
pub mod session;

use std::sync::Arc;

use authgate_oauth::handler::TokenHandlerDeps;
use authgate_oauth::services::{ClientResolver, DefaultScopesValidator};
use authgate_oauth::token::{AccessTokenIssuer, IdTokenIssuer};

pub use authorization::MemoryAuthorizationService;
pub use challenge::MemoryChallengeProvider;
pub use event::RecordingEventService;
pub use grants::{MemoryAppSessionTokenStore, MemoryCodeGrantStore, MemorySettingsActionGrantStore};
pub use interaction::ScriptedInteractionGraph;
pub use offline_grant::MemoryOfflineGrantStore;
pub use pre_authenticated_url::MemoryPreAuthenticatedUrlTokenService;
pub use session::{MemoryIdpSessionProvider, MemorySessionManager};

/// All in-memory stores and collaborators, shared so tests and embedders can
/// inspect and seed them.
pub struct MemoryBackend {
    pub code_grants: Arc<MemoryCodeGrantStore>,
    pub settings_action_grants: Arc<MemorySettingsActionGrantStore>,
    pub offline_grants: Arc<MemoryOfflineGrantStore>,
    pub app_session_tokens: Arc<MemoryAppSessionTokenStore>,
    pub authorizations: Arc<MemoryAuthorizationService>,
    pub idp_sessions: Arc<MemoryIdpSessionProvider>,
    pub sessions: Arc<MemorySessionManager>,
    pub events: Arc<RecordingEventService>,
    pub challenges: Arc<MemoryChallengeProvider>,
    pub pre_authenticated_url_tokens: Arc<MemoryPreAuthenticatedUrlTokenService>,
    pub interaction: Arc<ScriptedInteractionGraph>,
}

impl MemoryBackend {
    pub fn new(app_id: impl Into<String>) -> Self {
        let offline_grants = Arc::new(MemoryOfflineGrantStore::new());
        Self {
            code_grants: Arc::new(MemoryCodeGrantStore::new()),
            settings_action_grants: Arc::new(MemorySettingsActionGrantStore::new()),
            sessions: Arc::new(MemorySessionManager::new(offline_grants.clone())),
            offline_grants,
            app_session_tokens: Arc::new(MemoryAppSessionTokenStore::new()),
            authorizations: Arc::new(MemoryAuthorizationService::new(app_id)),
            idp_sessions: Arc::new(MemoryIdpSessionProvider::new()),
            events: Arc::new(RecordingEventService::new()),
            challenges: Arc::new(MemoryChallengeProvider::new()),
            pre_authenticated_url_tokens: Arc::new(MemoryPreAuthenticatedUrlTokenService::new()),
            interaction: Arc::new(ScriptedInteractionGraph::new()),
        }
    }

    /// Wires the backend into token handler dependencies.
    pub fn deps(
        &self,
        clients: Arc<dyn ClientResolver>,
        id_tokens: Arc<dyn IdTokenIssuer>,
        access_tokens: Arc<dyn AccessTokenIssuer>,
    ) -> TokenHandlerDeps {
        TokenHandlerDeps {
            clients,
            scopes: Arc::new(DefaultScopesValidator),
            code_grants: self.code_grants.clone(),
            settings_action_grants: self.settings_action_grants.clone(),
            offline_grants: self.offline_grants.clone(),
            app_session_tokens: self.app_session_tokens.clone(),
            authorizations: self.authorizations.clone(),
            idp_sessions: self.idp_sessions.clone(),
            sessions: self.sessions.clone(),
            events: self.events.clone(),
            challenges: self.challenges.clone(),
            pre_authenticated_url_tokens: self.pre_authenticated_url_tokens.clone(),
            interaction: self.interaction.clone(),
            id_tokens,
            access_tokens,
        }
    }
}
