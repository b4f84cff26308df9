//! Collaborators the token endpoint calls into.
//!
//! Most of these are owned by other parts of the identity provider. The
//! token endpoint only relies on the contracts below.

pub mod client;
pub mod code_grant;
pub mod scope;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::OAuthResult;
use crate::types::{Authorization, IdpSession, OfflineGrant};

pub use client::{ClientResolver, StaticClientResolver};
pub use code_grant::{CodeGrantService, CreateCodeGrantOptions};
pub use scope::{DefaultScopesValidator, ScopesValidator};

// =============================================================================
// Authorizations
// =============================================================================

/// Durable client/user authorizations.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Returns the authorization of `client_id` by `user_id`, creating it or
    /// adding any missing scopes first. Never removes scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn check_and_grant(
        &self,
        client_id: &str,
        user_id: &str,
        scopes: &[String],
    ) -> OAuthResult<Authorization>;

    /// Finds an authorization by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_id(&self, id: &str) -> OAuthResult<Option<Authorization>>;
}

// =============================================================================
// Sessions
// =============================================================================

/// Read access to IDP (browser) sessions.
#[async_trait]
pub trait IdpSessionProvider: Send + Sync {
    /// Finds an IDP session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_idp_session(&self, id: &str) -> OAuthResult<Option<IdpSession>>;
}

/// Session termination.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Revokes an offline grant without dispatching a session-ended event.
    ///
    /// # Errors
    ///
    /// Returns an error if the revocation fails.
    async fn revoke_without_event(&self, grant: &OfflineGrant) -> OAuthResult<()>;
}

// =============================================================================
// Events
// =============================================================================

/// Events the token endpoint dispatches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEvent {
    /// A user signed in and an offline grant was issued for it.
    #[serde(rename = "user.authenticated")]
    UserAuthenticated {
        /// The signed-in user.
        user_id: String,
        /// The new session.
        offline_grant_id: String,
        /// Client the session was issued to.
        client_id: String,
    },
}

/// Event dispatch, committed with the request.
#[async_trait]
pub trait EventService: Send + Sync {
    /// Dispatches an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be queued.
    async fn dispatch_event(&self, event: AuthEvent) -> OAuthResult<()>;
}

// =============================================================================
// Challenges
// =============================================================================

/// What a one-time challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengePurpose {
    /// Anonymous sign-in request.
    AnonymousRequest,
    /// Biometric request.
    BiometricRequest,
    /// App2app request.
    App2appRequest,
}

/// One-time challenges.
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Consumes a challenge and returns its purpose.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is unknown, expired or already used.
    async fn consume(&self, token: &str) -> OAuthResult<ChallengePurpose>;
}

// =============================================================================
// Pre-authenticated URL tokens
// =============================================================================

/// Inputs for a pre-authenticated URL token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuePreAuthenticatedUrlTokenOptions {
    /// Owning application.
    pub app_id: String,
    /// Authorization of the requesting client.
    pub authorization_id: String,
    /// Requesting client.
    pub client_id: String,
    /// Offline grant the token opens a session for.
    pub offline_grant_id: String,
    /// Scopes of the token.
    pub scopes: Vec<String>,
}

/// An issued pre-authenticated URL token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreAuthenticatedUrlToken {
    /// Plaintext token.
    pub token: String,
    /// Token type to report.
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Issuer of tokens that open a web session from a native app.
#[async_trait]
pub trait PreAuthenticatedUrlTokenService: Send + Sync {
    /// Issues a pre-authenticated URL token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    async fn issue_pre_authenticated_url_token(
        &self,
        options: IssuePreAuthenticatedUrlTokenOptions,
    ) -> OAuthResult<PreAuthenticatedUrlToken>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AuthEvent::UserAuthenticated {
            user_id: "u1".to_string(),
            offline_grant_id: "g1".to_string(),
            client_id: "c1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user.authenticated");
        assert_eq!(json["user_id"], "u1");
    }

    #[test]
    fn test_challenge_purpose_wire_form() {
        assert_eq!(
            serde_json::to_value(ChallengePurpose::App2appRequest).unwrap(),
            "app2app-request"
        );
    }
}
