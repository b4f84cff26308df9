//! Anonymous-request grant.

use time::OffsetDateTime;

use super::{NewOfflineGrant, RequestContext, TokenHandler, translate_graph_error};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::interaction::{GraphError, GraphInput, Intent};
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scope;
use crate::types::{AuthenticationInfo, OAuthClient};

const ANONYMOUS_USER_DISALLOWED: &str = "AnonymousUserDisallowed";

impl TokenHandler {
    pub(super) async fn handle_anonymous_request(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        if !client.has_full_access_scope() {
            return Err(OAuthError::unauthorized_client(
                "this client may not use anonymous user",
            ));
        }

        let device_info = req.device_info()?;

        let outcome = self
            .interaction
            .dry_run(
                Intent::token_login(),
                GraphInput::AnonymousRequest {
                    jwt: req.jwt().unwrap_or_default().to_string(),
                },
            )
            .await
            .map_err(|e| translate_graph_error(e, &[ANONYMOUS_USER_DISALLOWED]))?;
        if !outcome.is_complete() {
            return Err(OAuthError::invalid_request(
                "interaction not completed for anonymous users",
            ));
        }
        let graph = outcome.graph;

        let info = AuthenticationInfo::new(graph.user_id()?, OffsetDateTime::now_utc());

        self.interaction
            .run(&graph)
            .await
            .map_err(GraphError::into_run_error)?;

        let scopes = vec![
            scope::OPENID.to_string(),
            scope::OFFLINE_ACCESS.to_string(),
            scope::FULL_ACCESS.to_string(),
        ];
        let authorization = self
            .authorizations
            .check_and_grant(&client.client_id, &info.user_id, &scopes)
            .await?;

        let (resp, offline_grant) = self
            .issue_tokens_for_new_offline_grant(
                client,
                ctx,
                NewOfflineGrant {
                    scopes,
                    authorization,
                    authentication_info: info,
                    identity_id: None,
                    device_info,
                },
            )
            .await?;

        tracing::info!(
            offline_grant_id = %offline_grant.id,
            client_id = %client.client_id,
            "anonymous user signed in"
        );

        Ok(resp)
    }
}
