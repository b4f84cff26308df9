//! Token exchange for pre-authenticated URL tokens.
//!
//! A native app trades its ID token (subject) and device secret (actor) for a
//! short-lived token that opens a web session for the same user. The device
//! secret is rotated on every exchange and a new ID token pinned to the new
//! secret is returned for use as the next `id_token_hint`.

use time::OffsetDateTime;

use super::{RequestContext, TokenHandler, invalid_dpop_key_binding};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::grant_type::{
    DEVICE_SECRET_TOKEN_TYPE, ID_TOKEN_TYPE, PRE_AUTHENTICATED_URL_TOKEN_TYPE,
};
use crate::oauth::secret::{constant_time_eq, hash_token};
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scope;
use crate::services::IssuePreAuthenticatedUrlTokenOptions;
use crate::token::id_token::{IdTokenClaims, IssueIdTokenOptions};
use crate::types::session::decode_sid;
use crate::types::{OAuthClient, OfflineGrant, SessionType};

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl TokenHandler {
    pub(super) async fn handle_token_exchange(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        match req.requested_token_type.as_deref() {
            Some(PRE_AUTHENTICATED_URL_TOKEN_TYPE) => {
                self.handle_pre_authenticated_url_token(client, req, ctx)
                    .await
            }
            _ => Err(OAuthError::invalid_request(
                "requested_token_type not supported",
            )),
        }
    }

    async fn handle_pre_authenticated_url_token(
        &self,
        client: &OAuthClient,
        req: &TokenRequest,
        ctx: &RequestContext,
    ) -> OAuthResult<TokenResponse> {
        if req.actor_token_type.as_deref() != Some(DEVICE_SECRET_TOKEN_TYPE) {
            return Err(OAuthError::invalid_request(format!(
                "expected actor_token_type = {DEVICE_SECRET_TOKEN_TYPE}"
            )));
        }
        if req.subject_token_type.as_deref() != Some(ID_TOKEN_TYPE) {
            return Err(OAuthError::invalid_request(format!(
                "expected subject_token_type = {ID_TOKEN_TYPE}"
            )));
        }
        let Some(device_secret) = non_empty(req.actor_token.as_ref()) else {
            return Err(OAuthError::invalid_request("actor_token is required"));
        };
        let Some(subject_token) = non_empty(req.subject_token.as_ref()) else {
            return Err(OAuthError::invalid_request("subject_token is required"));
        };

        let claims = self
            .id_tokens
            .verify_id_token(subject_token)
            .map_err(|_| OAuthError::invalid_request("subject_token is not a valid id token"))?;
        let iss = self.id_tokens.iss();
        if req.audience.as_deref() != Some(iss) {
            return Err(OAuthError::invalid_request(format!(
                "expected audience to be {iss}"
            )));
        }

        let grant = self
            .resolve_id_token_offline_grant(&claims)
            .await?
            .filter(|g| g.has_all_scopes(&g.initial_client_id, &[scope::PRE_AUTHENTICATED_URL]));
        let Some(grant) = grant else {
            return Err(OAuthError::insufficient_scope(
                "pre-authenticated url is not allowed for this session",
            ));
        };

        verify_id_token_device_secret_hash(&grant, &claims, device_secret, ctx.dpop_jkt())?;

        let mut scopes = grant.scopes_for(&grant.initial_client_id);
        let requested = req.scopes();
        if !requested.is_empty() {
            if !grant.has_all_scopes(&grant.initial_client_id, &requested) {
                return Err(OAuthError::invalid_scope(
                    "requesting extra scopes is not allowed",
                ));
            }
            self.scopes.validate_scopes(client, &requested)?;
            scopes = requested;
        }

        let authz = self
            .authorizations
            .check_and_grant(&client.client_id, &grant.user_id, &scopes)
            .await?;

        let token = self
            .pre_authenticated_url_tokens
            .issue_pre_authenticated_url_token(IssuePreAuthenticatedUrlTokenOptions {
                app_id: self.options.app_id.clone(),
                authorization_id: authz.id,
                client_id: client.client_id.clone(),
                offline_grant_id: grant.id.clone(),
                scopes,
            })
            .await?;

        let mut resp = TokenResponse::new();
        resp.access_token = Some(token.token);
        resp.token_type = Some(token.token_type);
        resp.issued_token_type = Some(PRE_AUTHENTICATED_URL_TOKEN_TYPE.to_string());
        resp.expires_in = Some(token.expires_in);

        let grant = self
            .offline_grants
            .rotate_device_secret(&grant, ctx.dpop_jkt(), &mut resp)
            .await?;

        let id_token = self.id_tokens.issue_id_token(
            IssueIdTokenOptions::new(client.client_id.clone(), grant.authentication_info())
                .with_sid(grant.sid())
                .with_device_secret_hash(grant.device_secret_hash.clone()),
        )?;
        resp.set_id_token(id_token);

        tracing::debug!(
            offline_grant_id = %grant.id,
            client_id = %client.client_id,
            "pre-authenticated url token issued"
        );

        Ok(resp)
    }

    /// Finds the live offline grant an ID token's `sid` names.
    ///
    /// Returns `Ok(None)` if the session no longer exists.
    async fn resolve_id_token_offline_grant(
        &self,
        claims: &IdTokenClaims,
    ) -> OAuthResult<Option<OfflineGrant>> {
        let Some((session_type, session_id)) = claims.sid.as_deref().and_then(decode_sid) else {
            return Err(OAuthError::invalid_grant(
                "sid in id token (subject_token) is invalid",
            ));
        };

        match session_type {
            SessionType::Idp => {
                if self.idp_sessions.get_idp_session(&session_id).await?.is_some() {
                    return Err(OAuthError::invalid_grant("invalid session type"));
                }
                Ok(None)
            }
            SessionType::OfflineGrant => {
                let now = OffsetDateTime::now_utc();
                Ok(self
                    .offline_grant_store
                    .get_offline_grant(&session_id)
                    .await?
                    .filter(|g| !g.is_expired_at(now)))
            }
        }
    }
}

/// Checks the actor device secret against the ID token's `ds_hash`, the
/// grant's stored hash and the grant's DPoP binding.
///
/// Every check runs; the last failure wins.
pub(crate) fn verify_id_token_device_secret_hash(
    grant: &OfflineGrant,
    claims: &IdTokenClaims,
    device_secret: &str,
    proof_jkt: Option<&str>,
) -> OAuthResult<()> {
    let device_secret_hash = hash_token(device_secret);
    let mut result = Ok(());

    if claims.ds_hash.is_none() {
        result = Err(OAuthError::invalid_grant(
            "expected ds_hash to be present in id token (subject_token)",
        ));
    }
    let ds_hash = claims.ds_hash.as_deref().unwrap_or_default();
    if !constant_time_eq(ds_hash, &device_secret_hash) {
        result = Err(OAuthError::invalid_grant(
            "the hash of device_secret (actor_token) does not match ds_hash in id token (subject_token)",
        ));
    }
    let stored_hash = grant.device_secret_hash.as_deref().unwrap_or_default();
    if !constant_time_eq(stored_hash, &device_secret_hash) {
        result = Err(OAuthError::invalid_grant(
            "the device_secret (actor_token) does not bind to the session",
        ));
    }
    if !grant.match_device_secret_dpop_jkt(proof_jkt) {
        result = Err(invalid_dpop_key_binding());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::offline_grant::tests::sample_grant;

    fn claims(ds_hash: Option<String>) -> IdTokenClaims {
        IdTokenClaims {
            iss: "https://auth.example.com".to_string(),
            sub: "user-1".to_string(),
            aud: "mobile".to_string(),
            iat: 0,
            exp: 0,
            auth_time: 0,
            sid: None,
            nonce: None,
            amr: Vec::new(),
            ds_hash,
            ui_locales: None,
        }
    }

    #[test]
    fn test_all_hashes_match() {
        let mut grant = sample_grant();
        grant.device_secret_hash = Some(hash_token("secret"));

        let result = verify_id_token_device_secret_hash(
            &grant,
            &claims(Some(hash_token("secret"))),
            "secret",
            None,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_ds_hash_mismatch_fails_even_if_grant_matches() {
        let mut grant = sample_grant();
        grant.device_secret_hash = Some(hash_token("secret"));

        let err = verify_id_token_device_secret_hash(
            &grant,
            &claims(Some(hash_token("stale"))),
            "secret",
            None,
        )
        .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
        assert!(err.public_description().contains("ds_hash"));
    }

    #[test]
    fn test_grant_hash_mismatch() {
        let mut grant = sample_grant();
        grant.device_secret_hash = Some(hash_token("rotated"));

        let err = verify_id_token_device_secret_hash(
            &grant,
            &claims(Some(hash_token("secret"))),
            "secret",
            None,
        )
        .unwrap_err();
        assert_eq!(
            err.public_description(),
            "the device_secret (actor_token) does not bind to the session"
        );
    }

    #[test]
    fn test_missing_ds_hash() {
        let mut grant = sample_grant();
        grant.device_secret_hash = Some(hash_token("secret"));

        let err =
            verify_id_token_device_secret_hash(&grant, &claims(None), "secret", None).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[test]
    fn test_dpop_binding_checked_last() {
        let mut grant = sample_grant();
        grant.device_secret_hash = Some(hash_token("secret"));
        grant.device_secret_dpop_jkt = Some("jkt-1".to_string());

        let err = verify_id_token_device_secret_hash(
            &grant,
            &claims(Some(hash_token("stale"))),
            "secret",
            Some("jkt-2"),
        )
        .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_dpop_proof");

        assert!(verify_id_token_device_secret_hash(
            &grant,
            &claims(Some(hash_token("secret"))),
            "secret",
            Some("jkt-1"),
        )
        .is_ok());
    }
}
