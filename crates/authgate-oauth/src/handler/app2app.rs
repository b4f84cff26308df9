//! App2app-request grant.
//!
//! A second app on the same device asks the app holding a session to sign
//! it in. The holder proves possession of its device key by signing the
//! request JWT; the endpoint answers with an authorization code for the
//! target client, redeemable through the `authorization_code` grant.

use time::OffsetDateTime;
use url::Url;

use super::{RequestContext, TokenHandler, verify_app2app_signature};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scope;
use crate::services::CreateCodeGrantOptions;
use crate::types::{AuthenticationInfo, AuthorizationRequest, OAuthClient, SessionType};

impl TokenHandler {
    pub(super) async fn handle_app2app_request(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        if !client.app2app_enabled {
            return Err(OAuthError::unauthorized_client(
                "this client may not use app2app authentication",
            ));
        }
        if !self.options.app2app_enabled {
            return Err(OAuthError::invalid_request("app2app disabled"));
        }

        let redirect_uri = req.redirect_uri();
        if !is_allowed_redirect_uri(client, redirect_uri) {
            return Err(OAuthError::invalid_request("redirect URI is not allowed"));
        }

        let (_, grant, token_hash) = self
            .tokens
            .parse_refresh_token(req.refresh_token().unwrap_or_default(), ctx.dpop_jkt())
            .await?;
        let Some(session) = grant.to_session(&token_hash) else {
            return Err(OAuthError::invalid_grant("invalid refresh token"));
        };
        let scopes = session.scopes.clone();

        let Some(original_client) = self.clients.resolve_client(&session.client_id) else {
            return Err(OAuthError::server_error(
                "cannot find original client for app2app",
            ));
        };

        let request = self
            .app2app_verify_and_consume_challenge(req.jwt().unwrap_or_default())
            .await?;

        if !grant.app2app_device_key.is_bound()
            && !original_client.app2app_insecure_device_key_binding_enabled
        {
            return Err(OAuthError::invalid_grant(
                "app2app is not allowed in current session",
            ));
        }
        let grant = self
            .offline_grants
            .bind_app2app_device_key(&original_client, grant, &request.key)
            .await?;

        let Some(device_key) = grant.app2app_device_key.key() else {
            return Err(OAuthError::internal("app2app device key missing after binding"));
        };
        verify_app2app_signature(req.jwt().unwrap_or_default(), device_key)?;

        let authz = self
            .authorizations
            .check_and_grant(&client.client_id, &grant.user_id, &scopes)
            .await?;

        let code_challenge = req.code_challenge().map(str::to_string);
        let authorization_request = AuthorizationRequest {
            client_id: client.client_id.clone(),
            redirect_uri: Some(redirect_uri.to_string()),
            scope: scope::join_scope(&authz.scopes),
            code_challenge_method: code_challenge.as_ref().map(|_| "S256".to_string()),
            code_challenge,
            x_sso_enabled: grant.sso_enabled,
            ..AuthorizationRequest::default()
        };

        let (code, _) = self
            .code_grant_service
            .create_code_grant(CreateCodeGrantOptions {
                authorization: authz,
                session: grant
                    .idp_session_id
                    .clone()
                    .map(|id| (SessionType::Idp, id)),
                // The target app gets an offline grant of its own.
                authentication_info: AuthenticationInfo::new(
                    grant.user_id.clone(),
                    OffsetDateTime::now_utc(),
                ),
                id_token_hint_sid: None,
                redirect_uri: redirect_uri.to_string(),
                authorization_request,
                // The two apps do not share key storage.
                dpop_jkt: None,
            })
            .await?;

        tracing::info!(
            offline_grant_id = %grant.id,
            client_id = %client.client_id,
            "app2app code issued"
        );

        let mut resp = TokenResponse::new();
        resp.code = Some(code);
        Ok(resp)
    }
}

fn is_allowed_redirect_uri(client: &OAuthClient, redirect_uri: &str) -> bool {
    if Url::parse(redirect_uri).is_err() {
        return false;
    }
    client.redirect_uris.iter().any(|allowed| allowed == redirect_uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_allowed_redirect_uri() {
        let mut client = OAuthClient::new("app-b");
        client.redirect_uris = vec!["com.example.b://callback".to_string()];

        assert!(is_allowed_redirect_uri(&client, "com.example.b://callback"));
        assert!(!is_allowed_redirect_uri(&client, "com.example.c://callback"));
        assert!(!is_allowed_redirect_uri(&client, "not a url"));
        assert!(!is_allowed_redirect_uri(&client, ""));
    }
}
