//! The token endpoint.
//!
//! [`TokenHandler::handle`] resolves the client, validates the request shape,
//! checks the grant type against the client, and dispatches to one handler
//! per grant type:
//!
//! | Grant type | Handler |
//! |------------|---------|
//! | `authorization_code` | [`authorization_code`] |
//! | `refresh_token` | [`refresh_token`] |
//! | token exchange | [`token_exchange`] |
//! | anonymous request | [`anonymous`] |
//! | biometric request | [`biometric`] |
//! | app2app request | [`app2app`] |
//! | ID token | [`id_token`] |
//! | settings action | [`settings_action`] |
//!
//! Protocol errors reach the caller unchanged. Anything else is logged once
//! here and replaced by a generic `server_error`.

pub mod anonymous;
pub mod app2app;
pub mod app_session;
pub mod authorization_code;
pub mod biometric;
pub mod id_token;
pub mod refresh_token;
pub mod settings_action;
pub mod token_exchange;

use std::sync::Arc;

use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::interaction::{GraphError, InteractionGraphService};
use crate::lifecycle::OfflineGrantManager;
use crate::oauth::app2app::{App2AppRequest, parse_request, parse_request_unverified};
use crate::oauth::dpop::DpopProof;
use crate::oauth::grant_type::GrantType;
use crate::oauth::pkce::PkceVerifier;
use crate::oauth::secret::constant_time_eq;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scope;
use crate::services::{
    AuthorizationService, ChallengeProvider, ChallengePurpose, ClientResolver, CodeGrantService,
    EventService, IdpSessionProvider, PreAuthenticatedUrlTokenService, ScopesValidator,
    SessionManager,
};
use crate::storage::{
    AppSessionTokenStore, CodeGrantStore, OfflineGrantStore, SettingsActionGrantStore,
};
use crate::token::access_token::AccessTokenIssuer;
use crate::token::id_token::{IdTokenIssuer, IssueIdTokenOptions};
use crate::token::service::{IssueAccessGrantOptions, IssueOfflineGrantOptions, TokenService};
use crate::types::{
    AccessEvent, AuthenticationInfo, Authorization, AuthorizationRequest, CallerSession,
    DeviceInfo, GrantSessionKind, OAuthClient, OfflineGrant,
};

/// Generic error for any code that cannot be redeemed.
pub(crate) const INVALID_AUTHORIZATION_CODE: &str = "invalid authorization code";

/// Default lifetime of app-session tokens.
pub const DEFAULT_APP_SESSION_TOKEN_LIFETIME: Duration = Duration::minutes(5);

// =============================================================================
// Request Context
// =============================================================================

/// Per-request data gathered by the HTTP boundary.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Verified DPoP proof, if the request carried one.
    pub dpop_proof: Option<DpopProof>,
    /// Remote IP of the caller.
    pub remote_ip: Option<String>,
    /// User agent of the caller.
    pub user_agent: Option<String>,
    /// Session the caller is already signed in with.
    pub session: Option<CallerSession>,
}

impl RequestContext {
    /// Returns the thumbprint of the DPoP proof key, if any.
    #[must_use]
    pub fn dpop_jkt(&self) -> Option<&str> {
        self.dpop_proof.as_ref().map(|p| p.jkt.as_str())
    }

    /// Builds an access event for this request.
    #[must_use]
    pub fn access_event(&self, now: OffsetDateTime) -> AccessEvent {
        AccessEvent::new(now, self.remote_ip.clone(), self.user_agent.clone())
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Feature switches and lifetimes of the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenHandlerOptions {
    /// Owning application.
    pub app_id: String,
    /// Whether app2app requests are accepted at all.
    pub app2app_enabled: bool,
    /// Whether biometric requests are accepted at all.
    pub biometric_enabled: bool,
    /// Lifetime of access tokens.
    pub access_token_lifetime: Duration,
    /// Lifetime of app-session tokens.
    pub app_session_token_lifetime: Duration,
}

impl Default for TokenHandlerOptions {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app2app_enabled: false,
            biometric_enabled: false,
            access_token_lifetime: crate::token::service::DEFAULT_ACCESS_TOKEN_LIFETIME,
            app_session_token_lifetime: DEFAULT_APP_SESSION_TOKEN_LIFETIME,
        }
    }
}

/// Everything the token endpoint talks to.
pub struct TokenHandlerDeps {
    /// Client registry.
    pub clients: Arc<dyn ClientResolver>,
    /// Scope rules.
    pub scopes: Arc<dyn ScopesValidator>,
    /// Authorization codes.
    pub code_grants: Arc<dyn CodeGrantStore>,
    /// Settings-action codes.
    pub settings_action_grants: Arc<dyn SettingsActionGrantStore>,
    /// Offline grants.
    pub offline_grants: Arc<dyn OfflineGrantStore>,
    /// App-session tokens.
    pub app_session_tokens: Arc<dyn AppSessionTokenStore>,
    /// Client/user authorizations.
    pub authorizations: Arc<dyn AuthorizationService>,
    /// IDP sessions.
    pub idp_sessions: Arc<dyn IdpSessionProvider>,
    /// Session termination.
    pub sessions: Arc<dyn SessionManager>,
    /// Event dispatch.
    pub events: Arc<dyn EventService>,
    /// One-time challenges.
    pub challenges: Arc<dyn ChallengeProvider>,
    /// Pre-authenticated URL tokens.
    pub pre_authenticated_url_tokens: Arc<dyn PreAuthenticatedUrlTokenService>,
    /// Interaction-graph engine.
    pub interaction: Arc<dyn InteractionGraphService>,
    /// ID tokens.
    pub id_tokens: Arc<dyn IdTokenIssuer>,
    /// Access tokens.
    pub access_tokens: Arc<dyn AccessTokenIssuer>,
}

/// The OAuth 2.0 token endpoint.
pub struct TokenHandler {
    options: TokenHandlerOptions,
    clients: Arc<dyn ClientResolver>,
    scopes: Arc<dyn ScopesValidator>,
    code_grants: Arc<dyn CodeGrantStore>,
    settings_action_grants: Arc<dyn SettingsActionGrantStore>,
    offline_grant_store: Arc<dyn OfflineGrantStore>,
    app_session_tokens: Arc<dyn AppSessionTokenStore>,
    authorizations: Arc<dyn AuthorizationService>,
    idp_sessions: Arc<dyn IdpSessionProvider>,
    events: Arc<dyn EventService>,
    challenges: Arc<dyn ChallengeProvider>,
    pre_authenticated_url_tokens: Arc<dyn PreAuthenticatedUrlTokenService>,
    interaction: Arc<dyn InteractionGraphService>,
    id_tokens: Arc<dyn IdTokenIssuer>,
    tokens: Arc<TokenService>,
    offline_grants: OfflineGrantManager,
    code_grant_service: CodeGrantService,
}

impl TokenHandler {
    /// Wires a token endpoint.
    #[must_use]
    pub fn new(options: TokenHandlerOptions, deps: TokenHandlerDeps) -> Self {
        let tokens = Arc::new(
            TokenService::new(
                options.app_id.clone(),
                deps.offline_grants.clone(),
                deps.authorizations.clone(),
                deps.access_tokens,
                deps.clients.clone(),
            )
            .with_access_token_lifetime(options.access_token_lifetime),
        );
        let offline_grants = OfflineGrantManager::new(tokens.clone(), deps.sessions);
        let code_grant_service = CodeGrantService::new(options.app_id.clone(), deps.code_grants.clone());

        Self {
            options,
            clients: deps.clients,
            scopes: deps.scopes,
            code_grants: deps.code_grants,
            settings_action_grants: deps.settings_action_grants,
            offline_grant_store: deps.offline_grants,
            app_session_tokens: deps.app_session_tokens,
            authorizations: deps.authorizations,
            idp_sessions: deps.idp_sessions,
            events: deps.events,
            challenges: deps.challenges,
            pre_authenticated_url_tokens: deps.pre_authenticated_url_tokens,
            interaction: deps.interaction,
            id_tokens: deps.id_tokens,
            tokens,
            offline_grants,
            code_grant_service,
        }
    }

    /// Returns the endpoint options.
    #[must_use]
    pub fn options(&self) -> &TokenHandlerOptions {
        &self.options
    }

    /// Serves one token request.
    ///
    /// # Errors
    ///
    /// - `invalid_client` if the client cannot be resolved
    /// - any protocol error raised by the grant handler
    /// - `server_error` "internal server error" for everything else
    pub async fn handle(
        &self,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        let client_id = req.client_id().unwrap_or_default();
        let Some(client) = self.clients.resolve_client(client_id) else {
            return Err(OAuthError::invalid_client("invalid client ID"));
        };

        match self.do_handle(&client, req, ctx).await {
            Ok(resp) => Ok(resp),
            Err(err) if err.is_protocol_error() => {
                tracing::debug!(
                    client_id = %client.client_id,
                    grant_type = %req.grant_type,
                    error = err.oauth_error_code(),
                    "token request rejected"
                );
                Err(err)
            }
            Err(err) => {
                tracing::error!(
                    client_id = %client.client_id,
                    grant_type = %req.grant_type,
                    error = %err,
                    "token handler failed"
                );
                Err(OAuthError::server_error("internal server error"))
            }
        }
    }

    async fn do_handle(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        let grant_type = req.validate(client)?;

        if !client.is_grant_type_allowed(grant_type.as_str()) {
            return Err(OAuthError::unauthorized_client(
                "grant type is not allowed for this client",
            ));
        }

        match grant_type {
            GrantType::AuthorizationCode => {
                self.handle_authorization_code(client, req, ctx).await
            }
            GrantType::RefreshToken => self.handle_refresh_token(client, req, ctx).await,
            GrantType::TokenExchange => self.handle_token_exchange(client, req, ctx).await,
            GrantType::AnonymousRequest => self.handle_anonymous_request(client, req, ctx).await,
            GrantType::BiometricRequest => self.handle_biometric_request(client, req, ctx).await,
            GrantType::App2AppRequest => self.handle_app2app_request(client, req, ctx).await,
            GrantType::IdToken => self.handle_id_token(client, req, ctx).await,
            GrantType::SettingsAction => self.handle_settings_action_code(client, req).await,
        }
    }

    // -------------------------------------------------------------------------
    // Shared checks
    // -------------------------------------------------------------------------

    /// Checks the redirect URI, PKCE verifier and client secret presented
    /// against a stored code.
    fn verify_code_redemption(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        stored_redirect_uri: &str,
        authorization_request: &AuthorizationRequest,
    ) -> OAuthResult<()> {
        if stored_redirect_uri != req.redirect_uri() {
            return Err(OAuthError::invalid_request("invalid redirect URI"));
        }

        let challenge = authorization_request.code_challenge();
        let verifier = req.code_verifier();
        if client.is_public() || challenge.is_some() || verifier.is_some() {
            let verifier = PkceVerifier::new(verifier.unwrap_or_default())?;
            verifier.verify(challenge.unwrap_or_default())?;
        }

        if client.is_confidential() {
            self.verify_client_secret(client, req.client_secret())?;
        }

        Ok(())
    }

    /// Compares the presented secret with every registered secret of the
    /// client, without stopping at the first match.
    fn verify_client_secret(&self, client: &OAuthClient, secret: Option<&str>) -> OAuthResult<()> {
        let Some(secret) = secret else {
            return Err(OAuthError::invalid_request("invalid client secret"));
        };
        let Some(credentials) = self.clients.lookup_credentials(&client.client_id) else {
            return Err(OAuthError::invalid_request(
                "client secret is not supported for the client",
            ));
        };

        let mut pass = false;
        for candidate in &credentials.secrets {
            if constant_time_eq(secret, candidate) {
                pass = true;
            }
        }
        if !pass {
            return Err(OAuthError::invalid_request("invalid client secret"));
        }
        Ok(())
    }

    /// Reads an app2app JWT and consumes its challenge.
    async fn app2app_verify_and_consume_challenge(
        &self,
        jwt: &str,
    ) -> OAuthResult<App2AppRequest> {
        let request = parse_request_unverified(jwt).map_err(|e| {
            tracing::debug!(error = %e, "invalid app2app jwt payload");
            OAuthError::invalid_request("invalid app2app jwt payload")
        })?;

        match self.challenges.consume(&request.challenge).await {
            Ok(ChallengePurpose::App2appRequest) => Ok(request),
            Ok(purpose) => {
                tracing::debug!(?purpose, "invalid app2app jwt challenge");
                Err(OAuthError::invalid_request("invalid app2app jwt challenge"))
            }
            Err(e) => {
                tracing::debug!(error = %e, "invalid app2app jwt challenge");
                Err(OAuthError::invalid_request("invalid app2app jwt challenge"))
            }
        }
    }

    /// Consumes the challenge of an app2app JWT and returns its key once the
    /// JWT is shown to be signed by it.
    async fn app2app_device_key_verified(&self, jwt: &str) -> OAuthResult<Value> {
        let request = self.app2app_verify_and_consume_challenge(jwt).await?;
        verify_app2app_signature(jwt, &request.key)?;
        Ok(request.key)
    }
}

impl TokenHandler {
    /// Creates a fresh offline grant for a user who just signed in at the
    /// token endpoint, then issues its access token and, with `openid`, an
    /// ID token. Used by the anonymous and biometric grants.
    async fn issue_tokens_for_new_offline_grant(
        &self,
        client: &OAuthClient,
        ctx: &RequestContext,
        grant: NewOfflineGrant,
    ) -> OAuthResult<(TokenResponse, OfflineGrant)> {
        let mut resp = TokenResponse::new();
        let scopes = grant.scopes;
        let authorization_id = grant.authorization.id.clone();
        let user_id = grant.authorization.user_id.clone();

        let opts = IssueOfflineGrantOptions {
            scopes: scopes.clone(),
            authorization_id: authorization_id.clone(),
            authentication_info: grant.authentication_info,
            idp_session_id: None,
            identity_id: grant.identity_id,
            device_info: grant.device_info,
            sso_enabled: false,
            app2app_device_key: None,
            issue_device_secret: scope::contains(&scopes, scope::DEVICE_SSO),
            dpop_jkt: ctx.dpop_jkt().map(str::to_string),
            access_event: ctx.access_event(OffsetDateTime::now_utc()),
        };
        let (offline_grant, token_hash) = self
            .offline_grants
            .issue_offline_grant(client, opts, Some(&mut resp), true)
            .await?;

        self.tokens
            .issue_access_grant(
                client,
                IssueAccessGrantOptions {
                    scopes: scopes.clone(),
                    authorization_id,
                    user_id,
                    session_id: offline_grant.id.clone(),
                    session_kind: GrantSessionKind::Offline,
                    refresh_token_hash: Some(token_hash),
                },
                &mut resp,
            )
            .map_err(translate_access_token_error)?;

        if scope::contains(&scopes, scope::OPENID) {
            let id_token = self.id_tokens.issue_id_token(
                IssueIdTokenOptions::new(
                    client.client_id.clone(),
                    offline_grant.authentication_info(),
                )
                .with_sid(offline_grant.sid())
                .with_device_secret_hash(offline_grant.device_secret_hash.clone()),
            )?;
            resp.set_id_token(id_token);
        }

        Ok((resp, offline_grant))
    }
}

/// A sign-in completed at the token endpoint, ready to become an offline
/// grant.
struct NewOfflineGrant {
    scopes: Vec<String>,
    authorization: Authorization,
    authentication_info: AuthenticationInfo,
    identity_id: Option<String>,
    device_info: DeviceInfo,
}

fn verify_app2app_signature(jwt: &str, key: &Value) -> OAuthResult<()> {
    parse_request(jwt, key).map(|_| ()).map_err(|e| {
        tracing::debug!(error = %e, "invalid app2app jwt signature");
        OAuthError::invalid_request("invalid app2app jwt signature")
    })
}

pub(crate) use crate::oauth::dpop::invalid_dpop_key_binding;

/// Maps a dry-run failure of the interaction graph.
///
/// Invariant violations tagged with one of `disallowed_causes` mean the
/// client may not use the flow; rejected credentials are an invalid grant.
pub(crate) fn translate_graph_error(err: GraphError, disallowed_causes: &[&str]) -> OAuthError {
    if let Some(cause) = disallowed_causes.iter().find(|c| err.has_cause(c)) {
        return OAuthError::unauthorized_client(*cause);
    }
    match err {
        GraphError::InvalidCredentials => OAuthError::invalid_grant("InvalidCredentials"),
        other => other.into_run_error(),
    }
}

/// Maps a hook refusal from the access-token issuer to a protocol error.
pub(crate) fn translate_access_token_error(err: OAuthError) -> OAuthError {
    match err {
        OAuthError::HookDisallowed(_) => {
            OAuthError::server_error("access token generation is disallowed by hook")
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_access_token_error() {
        let err = translate_access_token_error(OAuthError::hook_disallowed("blocked"));
        assert_eq!(err.oauth_error_code(), "server_error");
        assert!(err.is_protocol_error());
        assert_eq!(
            err.public_description(),
            "access token generation is disallowed by hook"
        );

        let err = translate_access_token_error(OAuthError::storage("db down"));
        assert!(!err.is_protocol_error());
    }

    #[test]
    fn test_translate_graph_error() {
        let err = translate_graph_error(
            GraphError::InvariantViolated {
                cause: "BiometricDisallowed".to_string(),
                message: "biometric is disallowed".to_string(),
            },
            &["BiometricDisallowed"],
        );
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
        assert_eq!(err.public_description(), "BiometricDisallowed");

        let err = translate_graph_error(GraphError::InvalidCredentials, &[]);
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let err = translate_graph_error(
            GraphError::InvariantViolated {
                cause: "SomethingElse".to_string(),
                message: "nope".to_string(),
            },
            &["BiometricDisallowed"],
        );
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert_eq!(err.public_description(), "invariant violated (SomethingElse): nope");

        let err = translate_graph_error(GraphError::Other("boom".to_string()), &[]);
        assert!(!err.is_protocol_error());
    }

    #[test]
    fn test_request_context_access_event() {
        let ctx = RequestContext {
            remote_ip: Some("203.0.113.7".to_string()),
            user_agent: Some("sdk/1.0".to_string()),
            ..RequestContext::default()
        };
        let now = OffsetDateTime::now_utc();
        let event = ctx.access_event(now);
        assert_eq!(event.timestamp, now);
        assert_eq!(event.remote_ip.as_deref(), Some("203.0.113.7"));
        assert!(ctx.dpop_jkt().is_none());
    }
}
