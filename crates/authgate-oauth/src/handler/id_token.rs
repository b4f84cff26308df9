//! ID-token grant: reissues an ID token for the caller's current session.

use super::{RequestContext, TokenHandler};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::token::id_token::IssueIdTokenOptions;
use crate::types::{CallerSession, OAuthClient};

impl TokenHandler {
    pub(super) async fn handle_id_token(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        if !client.has_full_access_scope() {
            return Err(OAuthError::unauthorized_client(
                "this client may not refresh id token",
            ));
        }
        let Some(session) = ctx.session.as_ref() else {
            return Err(OAuthError::session_required("valid session is required"));
        };

        let mut resp = TokenResponse::new();

        let device_secret_hash = match session {
            CallerSession::OfflineGrant(s) => {
                let (grant, _) = self
                    .offline_grants
                    .rotate_device_secret_if_present_and_valid(
                        req.device_secret(),
                        &s.scopes,
                        s.offline_grant.clone(),
                        ctx.dpop_jkt(),
                        &mut resp,
                    )
                    .await?;
                grant.device_secret_hash
            }
            CallerSession::Idp(_) => None,
        };

        let id_token = self.id_tokens.issue_id_token(
            IssueIdTokenOptions::new(client.client_id.clone(), session.authentication_info())
                .with_sid(session.sid())
                .with_device_secret_hash(device_secret_hash),
        )?;
        resp.set_id_token(id_token);

        Ok(resp)
    }
}
