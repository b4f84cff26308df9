//! Biometric-request grant.
//!
//! The request JWT names its action in the `action` claim:
//!
//! - `setup` attaches a biometric identity to the signed-in user and issues
//!   nothing;
//! - `authenticate` signs the user in with that identity and issues a new
//!   offline grant, evicting any other grant created with the same identity.

use serde_json::Value;
use time::OffsetDateTime;

use super::{NewOfflineGrant, RequestContext, TokenHandler, translate_graph_error};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::interaction::{GraphError, GraphInput, Intent};
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scope;
use crate::services::AuthEvent;
use crate::token::jwt::unverified_payload;
use crate::types::{AuthenticationInfo, OAuthClient};

const BIOMETRIC_DISALLOWED: &str = "BiometricDisallowed";
const ANONYMOUS_USER_ADD_IDENTITY: &str = "AnonymousUserAddIdentity";

/// Action requested by a biometric JWT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BiometricAction {
    Setup,
    Authenticate,
}

fn parse_action(jwt: &str) -> OAuthResult<BiometricAction> {
    let payload = unverified_payload(jwt).map_err(|e| OAuthError::invalid_request(e.to_string()))?;
    let action = payload.get("action").cloned().unwrap_or(Value::Null);
    match action.as_str() {
        Some("setup") => Ok(BiometricAction::Setup),
        Some("authenticate") => Ok(BiometricAction::Authenticate),
        _ => Err(OAuthError::invalid_request(format!(
            "invalid action: {action}"
        ))),
    }
}

impl TokenHandler {
    pub(super) async fn handle_biometric_request(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        if !self.options.biometric_enabled {
            return Err(OAuthError::invalid_request(
                "biometric authentication is disabled",
            ));
        }
        if !client.has_full_access_scope() {
            return Err(OAuthError::unauthorized_client(
                "this client may not use biometric authentication",
            ));
        }

        let jwt = req.jwt().unwrap_or_default();
        match parse_action(jwt)? {
            BiometricAction::Setup => self.handle_biometric_setup(jwt, ctx).await,
            BiometricAction::Authenticate => {
                self.handle_biometric_authenticate(client, req, jwt, ctx)
                    .await
            }
        }
    }

    async fn handle_biometric_setup(
        &self,
        jwt: &str,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        let Some(session) = ctx.session.as_ref() else {
            return Err(OAuthError::session_required(
                "biometric setup requires authenticated user",
            ));
        };

        let outcome = self
            .interaction
            .dry_run(
                Intent::AddIdentity {
                    user_id: session.user_id().to_string(),
                },
                GraphInput::BiometricRequest {
                    jwt: jwt.to_string(),
                },
            )
            .await
            .map_err(|e| {
                translate_graph_error(e, &[BIOMETRIC_DISALLOWED, ANONYMOUS_USER_ADD_IDENTITY])
            })?;
        if !outcome.is_complete() {
            return Err(OAuthError::invalid_request(
                "interaction not completed for biometric setup",
            ));
        }

        self.interaction
            .run(&outcome.graph)
            .await
            .map_err(GraphError::into_run_error)?;

        tracing::info!(user_id = %session.user_id(), "biometric identity added");
        Ok(TokenResponse::new())
    }

    async fn handle_biometric_authenticate(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        jwt: &str,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        let device_info = req.device_info()?;

        let outcome = self
            .interaction
            .dry_run(
                Intent::token_login(),
                GraphInput::BiometricRequest {
                    jwt: jwt.to_string(),
                },
            )
            .await
            .map_err(|e| translate_graph_error(e, &[BIOMETRIC_DISALLOWED]))?;
        if !outcome.is_complete() {
            return Err(OAuthError::invalid_request(
                "interaction not completed for biometric authenticate",
            ));
        }
        let graph = outcome.graph;

        let info = AuthenticationInfo::new(graph.user_id()?, OffsetDateTime::now_utc())
            .with_amr(graph.amr.clone());
        let identity_id = graph.last_identity_id()?.to_string();

        self.interaction
            .run(&graph)
            .await
            .map_err(GraphError::into_run_error)?;

        let mut scopes = vec![
            scope::OPENID.to_string(),
            scope::OFFLINE_ACCESS.to_string(),
            scope::FULL_ACCESS.to_string(),
        ];
        let requested = req.scopes();
        if !requested.is_empty() {
            self.scopes.validate_scopes(client, &requested)?;
            scopes = requested;
        }
        if !scope::contains_all(&scopes, &[scope::OFFLINE_ACCESS, scope::FULL_ACCESS]) {
            return Err(OAuthError::invalid_scope(
                "offline_access and full-access must be requested",
            ));
        }

        let authorization = self
            .authorizations
            .check_and_grant(&client.client_id, &info.user_id, &scopes)
            .await?;

        // One device per biometric identity.
        let existing = self
            .offline_grant_store
            .list_offline_grants(&authorization.user_id)
            .await?;
        for grant in existing
            .iter()
            .filter(|g| g.identity_id.as_deref() == Some(identity_id.as_str()))
        {
            self.offline_grant_store.delete_offline_grant(grant).await?;
            tracing::info!(
                offline_grant_id = %grant.id,
                "revoked offline grant of the same biometric identity"
            );
        }

        let user_id = authorization.user_id.clone();
        let (resp, offline_grant) = self
            .issue_tokens_for_new_offline_grant(
                client,
                ctx,
                NewOfflineGrant {
                    scopes,
                    authorization,
                    authentication_info: info,
                    identity_id: Some(identity_id),
                    device_info,
                },
            )
            .await?;

        self.events
            .dispatch_event(AuthEvent::UserAuthenticated {
                user_id,
                offline_grant_id: offline_grant.id.clone(),
                client_id: client.client_id.clone(),
            })
            .await?;

        Ok(resp)
    }
}
