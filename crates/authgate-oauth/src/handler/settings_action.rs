//! Settings-action grant.
//!
//! Redeems a settings-action code exactly like an authorization code, but
//! issues nothing. A successful exchange is the proof of reauthentication.

use time::OffsetDateTime;

use super::{INVALID_AUTHORIZATION_CODE, TokenHandler};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::secret::hash_token;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::types::OAuthClient;

impl TokenHandler {
    pub(super) async fn handle_settings_action_code(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
    ) -> OAuthResult<TokenResponse> {
        let code_hash = hash_token(req.code().unwrap_or_default());
        let Some(grant) = self
            .settings_action_grants
            .get_settings_action_grant(&code_hash)
            .await?
        else {
            return Err(OAuthError::invalid_grant(INVALID_AUTHORIZATION_CODE));
        };

        if grant.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(OAuthError::invalid_grant(INVALID_AUTHORIZATION_CODE));
        }

        self.verify_code_redemption(
            client,
            req,
            &grant.redirect_uri,
            &grant.authorization_request,
        )?;

        if let Err(err) = self
            .settings_action_grants
            .delete_settings_action_grant(&grant)
            .await
        {
            tracing::error!(error = %err, "failed to invalidate settings action grant");
        }

        tracing::debug!(user_id = %grant.user_id, "settings action code redeemed");
        Ok(TokenResponse::new())
    }
}
