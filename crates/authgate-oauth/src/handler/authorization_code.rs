//! `authorization_code` grant.

use serde_json::Value;
use time::OffsetDateTime;

use super::{
    INVALID_AUTHORIZATION_CODE, RequestContext, TokenHandler, invalid_dpop_key_binding,
    translate_access_token_error,
};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::secret::hash_token;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scope;
use crate::services::AuthEvent;
use crate::token::id_token::IssueIdTokenOptions;
use crate::token::service::{
    IssueAccessGrantOptions, IssueOfflineGrantOptions, IssueRefreshTokenOptions,
};
use crate::types::session::decode_sid;
use crate::types::{
    Authorization, CodeGrant, DeviceInfo, GrantSessionKind, OAuthClient, SessionType, UiParam,
};

impl TokenHandler {
    pub(super) async fn handle_authorization_code(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        self.issue_tokens_for_authorization_code(client, req, ctx)
            .await
    }

    /// Redeems an authorization code.
    ///
    /// The code is deleted only after tokens were issued. A failed delete is
    /// logged and does not fail the request.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` "invalid authorization code" for unknown or expired
    ///   codes, a PKCE mismatch, or a missing authorization
    /// - `invalid_dpop_proof` if the code is bound to another DPoP key
    /// - `invalid_request` for a redirect URI or client secret mismatch
    pub async fn issue_tokens_for_authorization_code(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        let device_info = req.device_info()?;

        let code_hash = hash_token(req.code().unwrap_or_default());
        let Some(code_grant) = self.code_grants.get_code_grant(&code_hash).await? else {
            return Err(OAuthError::invalid_grant(INVALID_AUTHORIZATION_CODE));
        };

        if !code_grant.match_dpop_jkt(ctx.dpop_jkt()) {
            return Err(invalid_dpop_key_binding());
        }

        let ui_param = code_grant.authorization_request.ui_param();

        if code_grant.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(OAuthError::invalid_grant(INVALID_AUTHORIZATION_CODE));
        }

        self.verify_code_redemption(
            client,
            req,
            &code_grant.redirect_uri,
            &code_grant.authorization_request,
        )?;

        let Some(authz) = self
            .authorizations
            .get_by_id(&code_grant.authorization_id)
            .await?
        else {
            return Err(OAuthError::invalid_grant(INVALID_AUTHORIZATION_CODE));
        };

        let resp = self
            .do_issue_tokens_for_authorization_code(
                client,
                ctx,
                &code_grant,
                &authz,
                device_info,
                req.app2app_device_key_jwt(),
                ui_param,
            )
            .await?;

        if let Err(err) = self.code_grants.delete_code_grant(&code_grant).await {
            tracing::error!(error = %err, "failed to invalidate code grant");
        }

        Ok(resp)
    }

    #[allow(clippy::too_many_arguments)]
    async fn do_issue_tokens_for_authorization_code(
        &self,
        client: &OAuthClient,
        ctx: &RequestContext,
        code: &CodeGrant,
        authz: &Authorization,
        device_info: DeviceInfo,
        app2app_device_key_jwt: Option<&str>,
        ui_param: UiParam,
    ) -> OAuthResult<TokenResponse> {
        let scopes = code.authorization_request.scopes();
        let issue_refresh_token =
            scope::contains(&scopes, scope::OFFLINE_ACCESS) && client.allows_refresh_token();
        let issue_id_token = scope::contains(&scopes, scope::OPENID);
        let issue_device_secret = scope::contains(&scopes, scope::DEVICE_SSO);

        let info = code.authentication_info.clone();

        let app2app_device_key: Option<Value> = match app2app_device_key_jwt {
            Some(jwt) if client.app2app_enabled => Some(self.app2app_device_key_verified(jwt).await?),
            _ => None,
        };

        let dpop_jkt = ctx.dpop_jkt();
        let mut resp = TokenResponse::new();

        // Reauthentication of an existing offline grant.
        if let Some((SessionType::OfflineGrant, grant_id)) =
            code.id_token_hint_sid.as_deref().and_then(decode_sid)
        {
            if let Some(grant) = self.offline_grant_store.get_offline_grant(&grant_id).await? {
                let grant = self
                    .offline_grants
                    .update_authenticated_at_if_newer(grant, info.authenticated_at)
                    .await?;
                let (grant, _) = self
                    .offline_grants
                    .rotate_device_secret_if_sufficient_scope(&scopes, grant, dpop_jkt, &mut resp)
                    .await?;
                self.offline_grants
                    .update_app2app_device_key_if_needed(client, grant, app2app_device_key.as_ref())
                    .await?;
            }
        }

        let idp_session_id = match info.authenticated_by_session_type {
            Some(SessionType::Idp) => info.authenticated_by_session_id.clone(),
            _ => None,
        };
        let opts = IssueOfflineGrantOptions {
            scopes: scopes.clone(),
            authorization_id: authz.id.clone(),
            authentication_info: info.clone(),
            idp_session_id,
            identity_id: None,
            device_info,
            sso_enabled: code.authorization_request.sso_enabled(),
            app2app_device_key,
            issue_device_secret,
            dpop_jkt: dpop_jkt.map(str::to_string),
            access_event: ctx.access_event(OffsetDateTime::now_utc()),
        };

        let mut access_session: Option<(String, GrantSessionKind)> = None;
        let mut refresh_token_hash = None;
        let mut device_secret_hash = None;
        let mut sid = None;

        if issue_refresh_token {
            let (offline_grant, token_hash) = match (
                info.authenticated_by_session_type,
                info.authenticated_by_session_id.as_deref(),
            ) {
                (Some(SessionType::OfflineGrant), Some(grant_id)) => {
                    self.tokens
                        .issue_refresh_token_for_offline_grant(
                            grant_id,
                            client,
                            IssueRefreshTokenOptions {
                                scopes: scopes.clone(),
                                authorization_id: authz.id.clone(),
                                dpop_jkt: dpop_jkt.map(str::to_string),
                            },
                            &mut resp,
                        )
                        .await?
                }
                _ => {
                    self.offline_grants
                        .issue_offline_grant(client, opts, Some(&mut resp), true)
                        .await?
                }
            };

            sid = Some(offline_grant.sid());
            access_session = Some((offline_grant.id.clone(), GrantSessionKind::Offline));
            refresh_token_hash = Some(token_hash);
            device_secret_hash = offline_grant.device_secret_hash.clone();

            if info.should_fire_authenticated_event_when_issue_offline_grant {
                self.events
                    .dispatch_event(AuthEvent::UserAuthenticated {
                        user_id: authz.user_id.clone(),
                        offline_grant_id: offline_grant.id.clone(),
                        client_id: client.client_id.clone(),
                    })
                    .await?;
            }
        } else if let Some(hint_sid) = code.id_token_hint_sid.as_deref() {
            sid = Some(hint_sid.to_string());
            match decode_sid(hint_sid) {
                Some((SessionType::OfflineGrant, grant_id)) => {
                    let Some(offline_grant) =
                        self.offline_grant_store.get_offline_grant(&grant_id).await?
                    else {
                        return Err(OAuthError::invalid_grant("offline grant not found"));
                    };
                    device_secret_hash = offline_grant.device_secret_hash;
                    access_session = Some((grant_id, GrantSessionKind::Offline));
                }
                Some((SessionType::Idp, session_id)) => {
                    access_session = Some((session_id, GrantSessionKind::Session));
                }
                None => {}
            }
        } else if client.is_confidential() {
            // The access token still needs a backing session; no refresh token
            // is handed out.
            let (offline_grant, _) = self
                .offline_grants
                .issue_offline_grant(client, opts, None, false)
                .await?;
            sid = Some(offline_grant.sid());
            access_session = Some((offline_grant.id.clone(), GrantSessionKind::Offline));
        }

        let Some((session_id, session_kind)) = access_session else {
            return Err(OAuthError::invalid_request("cannot issue access token"));
        };

        self.tokens
            .issue_access_grant(
                client,
                IssueAccessGrantOptions {
                    scopes: scopes.clone(),
                    authorization_id: authz.id.clone(),
                    user_id: authz.user_id.clone(),
                    session_id,
                    session_kind,
                    refresh_token_hash,
                },
                &mut resp,
            )
            .map_err(translate_access_token_error)?;

        if issue_id_token {
            let Some(sid) = sid else {
                return Err(OAuthError::invalid_request("cannot issue ID token"));
            };
            let mut opts = IssueIdTokenOptions::new(client.client_id.clone(), info)
                .with_sid(sid)
                .with_device_secret_hash(device_secret_hash);
            opts.nonce = code.authorization_request.nonce.clone();
            opts.ui_locales = ui_param.ui_locales;
            resp.set_id_token(self.id_tokens.issue_id_token(opts)?);
        }

        Ok(resp)
    }
}
