//! Minting of authorization codes.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::OAuthResult;
use crate::oauth::secret::{generate_token, hash_token};
use crate::storage::CodeGrantStore;
use crate::types::{
    AuthenticationInfo, Authorization, AuthorizationRequest, CODE_GRANT_LIFETIME, CodeGrant,
    SessionType,
};

/// Inputs for a new code grant.
#[derive(Debug, Clone)]
pub struct CreateCodeGrantOptions {
    /// Authorization the code is issued under.
    pub authorization: Authorization,
    /// Session the user is signed in with, if any.
    pub session: Option<(SessionType, String)>,
    /// Result of authenticating the user.
    pub authentication_info: AuthenticationInfo,
    /// Encoded SID from `id_token_hint`, for reauthentication.
    pub id_token_hint_sid: Option<String>,
    /// Redirect URI the code must be redeemed with.
    pub redirect_uri: String,
    /// The authorization request to capture.
    pub authorization_request: AuthorizationRequest,
    /// DPoP key thumbprint to bind the code to.
    pub dpop_jkt: Option<String>,
}

/// Creates code grants on behalf of the token endpoint (app2app).
pub struct CodeGrantService {
    app_id: String,
    store: Arc<dyn CodeGrantStore>,
}

impl CodeGrantService {
    /// Creates a new code grant service.
    pub fn new(app_id: impl Into<String>, store: Arc<dyn CodeGrantStore>) -> Self {
        Self {
            app_id: app_id.into(),
            store,
        }
    }

    /// Mints a code and stores its grant. Returns the plaintext code.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    pub async fn create_code_grant(
        &self,
        opts: CreateCodeGrantOptions,
    ) -> OAuthResult<(String, CodeGrant)> {
        let now = OffsetDateTime::now_utc();
        let code = generate_token();

        let mut info = opts.authentication_info;
        if let Some((session_type, session_id)) = opts.session {
            info = info.with_session(session_type, session_id);
        }

        let grant = CodeGrant {
            app_id: self.app_id.clone(),
            authorization_id: opts.authorization.id,
            code_hash: hash_token(&code),
            redirect_uri: opts.redirect_uri,
            authorization_request: opts.authorization_request,
            authentication_info: info,
            id_token_hint_sid: opts.id_token_hint_sid,
            dpop_jkt: opts.dpop_jkt,
            created_at: now,
            expire_at: now + CODE_GRANT_LIFETIME,
        };

        self.store.create_code_grant(&grant).await?;
        tracing::debug!(authorization_id = %grant.authorization_id, "code grant created");

        Ok((code, grant))
    }
}
