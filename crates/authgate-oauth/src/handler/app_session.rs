//! App-session tokens.
//!
//! A first-party app trades a refresh token for a short-lived token that its
//! web views exchange for a browser session.

use time::OffsetDateTime;

use super::{RequestContext, TokenHandler};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::secret::{generate_token, hash_token};
use crate::scope;
use crate::types::AppSessionToken;

impl TokenHandler {
    /// Issues an app-session token for the grant behind `refresh_token`.
    ///
    /// Returns the plaintext token and the stored record.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` if the refresh token is not live
    /// - `invalid_dpop_proof` if the refresh token is bound to another key
    /// - `access_denied` if its client lacks full user access
    pub async fn issue_app_session_token(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> OAuthResult<(String, AppSessionToken)> {
        let (authz, grant, refresh_token_hash) = self
            .tokens
            .parse_refresh_token(refresh_token, ctx.dpop_jkt())
            .await?;

        if !authz.is_authorized(&[scope::FULL_ACCESS]) {
            return Err(OAuthError::access_denied(
                "the client is not authorized to have full user access",
            ));
        }

        let now = OffsetDateTime::now_utc();
        let token = generate_token();
        let record = AppSessionToken {
            app_id: self.options.app_id.clone(),
            offline_grant_id: grant.id.clone(),
            created_at: now,
            expire_at: now + self.options.app_session_token_lifetime,
            token_hash: hash_token(&token),
            refresh_token_hash,
        };

        self.app_session_tokens
            .create_app_session_token(&record)
            .await?;

        tracing::debug!(offline_grant_id = %grant.id, "app session token issued");
        Ok((token, record))
    }
}
