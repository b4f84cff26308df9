//! `refresh_token` grant.

use time::OffsetDateTime;

use super::{RequestContext, TokenHandler, translate_access_token_error};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scope;
use crate::token::id_token::IssueIdTokenOptions;
use crate::token::service::IssueAccessGrantOptions;
use crate::types::{Authorization, GrantSessionKind, OAuthClient, OfflineGrantSession};

impl TokenHandler {
    pub(super) async fn handle_refresh_token(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        let device_info = req.device_info()?;

        let (authz, mut grant, token_hash) = self
            .tokens
            .parse_refresh_token(req.refresh_token().unwrap_or_default(), ctx.dpop_jkt())
            .await?;

        let access_event = ctx.access_event(OffsetDateTime::now_utc());
        grant.access_info.last_access = access_event.clone();
        let Some(session) = grant.to_session(&token_hash) else {
            return Err(OAuthError::invalid_grant("invalid refresh token"));
        };

        let resp = self
            .issue_tokens_for_refresh_token(client, req, ctx, &session, &authz)
            .await?;

        if client.client_id != session.client_id {
            return Err(OAuthError::invalid_request(
                "client id doesn't match the refresh token",
            ));
        }

        self.offline_grants
            .access_and_update_device_info(&grant, access_event, device_info)
            .await?;

        Ok(resp)
    }

    async fn issue_tokens_for_refresh_token(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
        session: &OfflineGrantSession,
        authz: &Authorization,
    ) -> OAuthResult<TokenResponse> {
        let mut resp = TokenResponse::new();

        let (grant, _) = self
            .offline_grants
            .rotate_device_secret_if_present_and_valid(
                req.device_secret(),
                &session.scopes,
                session.offline_grant.clone(),
                ctx.dpop_jkt(),
                &mut resp,
            )
            .await?;

        if scope::contains(&session.scopes, scope::OPENID) {
            let id_token = self.id_tokens.issue_id_token(
                IssueIdTokenOptions::new(
                    client.client_id.clone(),
                    session.offline_grant.authentication_info(),
                )
                .with_sid(session.offline_grant.sid())
                .with_device_secret_hash(grant.device_secret_hash),
            )?;
            resp.set_id_token(id_token);
        }

        self.tokens
            .issue_access_grant(
                client,
                IssueAccessGrantOptions {
                    scopes: session.scopes.clone(),
                    authorization_id: authz.id.clone(),
                    user_id: authz.user_id.clone(),
                    session_id: session.session_id().to_string(),
                    session_kind: GrantSessionKind::Offline,
                    refresh_token_hash: Some(session.token_hash.clone()),
                },
                &mut resp,
            )
            .map_err(translate_access_token_error)?;

        Ok(resp)
    }
}
