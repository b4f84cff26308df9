//! Token minting and refresh-token parsing.
//!
//! [`TokenService`] owns the formats of every opaque credential the token
//! endpoint hands out:
//!
//! - refresh tokens are `"<offline_grant_id>.<random>"`, so the grant can be
//!   found without a secondary index;
//! - device secrets are plain random tokens;
//! - only SHA-256 hashes of either are persisted.

use std::sync::Arc;

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::oauth::dpop::invalid_dpop_key_binding;
use crate::oauth::secret::{generate_token, hash_token};
use crate::oauth::token::TokenResponse;
use crate::services::{AuthorizationService, ClientResolver};
use crate::storage::OfflineGrantStore;
use crate::token::access_token::AccessTokenIssuer;
use crate::types::{
    AccessEvent, AccessGrant, AccessInfo, AuthenticationInfo, Authorization, DeviceInfo,
    DeviceKeyBinding, GrantSessionKind, OAuthClient, OfflineGrant, RefreshTokenEntry,
};

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::minutes(30);

const INVALID_REFRESH_TOKEN: &str = "invalid refresh token";

/// Inputs for a new offline grant.
#[derive(Debug, Clone)]
pub struct IssueOfflineGrantOptions {
    /// Scopes of the first refresh token.
    pub scopes: Vec<String>,
    /// Authorization of the first refresh token.
    pub authorization_id: String,
    /// Authentication the grant is created from.
    pub authentication_info: AuthenticationInfo,
    /// IDP session the grant derives from.
    pub idp_session_id: Option<String>,
    /// Biometric identity used to sign in.
    pub identity_id: Option<String>,
    /// Device description.
    pub device_info: DeviceInfo,
    /// Whether the grant takes part in SSO.
    pub sso_enabled: bool,
    /// App2app device key to bind from the start.
    pub app2app_device_key: Option<Value>,
    /// Whether to mint a device secret alongside the refresh token.
    pub issue_device_secret: bool,
    /// DPoP key thumbprint to bind the refresh token and device secret to.
    pub dpop_jkt: Option<String>,
    /// The access that creates the grant.
    pub access_event: AccessEvent,
}

/// Inputs for adding a refresh token to an existing offline grant.
#[derive(Debug, Clone)]
pub struct IssueRefreshTokenOptions {
    /// Scopes of the new refresh token.
    pub scopes: Vec<String>,
    /// Authorization of the new refresh token.
    pub authorization_id: String,
    /// DPoP key thumbprint to bind the refresh token to.
    pub dpop_jkt: Option<String>,
}

/// Inputs for a new access grant.
#[derive(Debug, Clone)]
pub struct IssueAccessGrantOptions {
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Authorization the grant derives from.
    pub authorization_id: String,
    /// Subject.
    pub user_id: String,
    /// Backing session ID.
    pub session_id: String,
    /// Backing session kind.
    pub session_kind: GrantSessionKind,
    /// Hash of the refresh token issued alongside, if any.
    pub refresh_token_hash: Option<String>,
}

/// Mints refresh tokens, access tokens and device secrets.
pub struct TokenService {
    app_id: String,
    access_token_lifetime: Duration,
    offline_grants: Arc<dyn OfflineGrantStore>,
    authorizations: Arc<dyn AuthorizationService>,
    access_tokens: Arc<dyn AccessTokenIssuer>,
    clients: Arc<dyn ClientResolver>,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        offline_grants: Arc<dyn OfflineGrantStore>,
        authorizations: Arc<dyn AuthorizationService>,
        access_tokens: Arc<dyn AccessTokenIssuer>,
        clients: Arc<dyn ClientResolver>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            access_token_lifetime: DEFAULT_ACCESS_TOKEN_LIFETIME,
            offline_grants,
            authorizations,
            access_tokens,
            clients,
        }
    }

    /// Sets the access token lifetime.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Returns the offline grant store.
    #[must_use]
    pub fn offline_grants(&self) -> &Arc<dyn OfflineGrantStore> {
        &self.offline_grants
    }

    /// Computes when `grant` expires under its initial client's settings.
    ///
    /// A grant whose initial client is gone falls back to the default
    /// refresh-token settings.
    #[must_use]
    pub fn compute_offline_grant_expiry(&self, grant: &OfflineGrant) -> OffsetDateTime {
        let client = self
            .clients
            .resolve_client(&grant.initial_client_id)
            .unwrap_or_default();
        grant.compute_expiry(&client)
    }

    /// Resolves a refresh token to its authorization, offline grant and hash.
    ///
    /// `dpop_jkt` is the thumbprint of the request's DPoP proof. A token bound
    /// to a key is only accepted with a proof from that key.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` "invalid refresh token" if the token is
    /// malformed, the grant is gone or expired, the token is not live on the
    /// grant, or its authorization no longer exists. Returns
    /// `invalid_dpop_proof` if the DPoP binding does not match.
    pub async fn parse_refresh_token(
        &self,
        token: &str,
        dpop_jkt: Option<&str>,
    ) -> OAuthResult<(Authorization, OfflineGrant, String)> {
        let invalid = || OAuthError::invalid_grant(INVALID_REFRESH_TOKEN);

        let (grant_id, secret) = token.split_once('.').ok_or_else(invalid)?;
        if grant_id.is_empty() || secret.is_empty() {
            return Err(invalid());
        }

        let grant = self
            .offline_grants
            .get_offline_grant(grant_id)
            .await?
            .ok_or_else(invalid)?;
        if grant.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(invalid());
        }

        let token_hash = hash_token(token);
        let session = grant.to_session(&token_hash).ok_or_else(invalid)?;
        if !session.match_dpop_jkt(dpop_jkt) {
            return Err(invalid_dpop_key_binding());
        }

        let authz = self
            .authorizations
            .get_by_id(&session.authorization_id)
            .await?
            .ok_or_else(invalid)?;

        Ok((authz, grant, token_hash))
    }

    /// Creates an offline grant and its first refresh token.
    ///
    /// When `resp` is given, the refresh token (and device secret, if one was
    /// requested) is written into it. Returns the grant and the refresh token
    /// hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    pub async fn issue_offline_grant(
        &self,
        client: &OAuthClient,
        opts: IssueOfflineGrantOptions,
        mut resp: Option<&mut TokenResponse>,
    ) -> OAuthResult<(OfflineGrant, String)> {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4().to_string();
        let refresh_token = format!("{id}.{}", generate_token());
        let token_hash = hash_token(&refresh_token);

        let mut device_secret_hash = None;
        let mut device_secret_dpop_jkt = None;
        if opts.issue_device_secret {
            if let Some(resp) = resp.as_deref_mut() {
                device_secret_hash = Some(Self::issue_device_secret(resp));
                device_secret_dpop_jkt = opts.dpop_jkt.clone();
            }
        }

        let info = opts.authentication_info;
        let mut grant = OfflineGrant {
            id,
            app_id: self.app_id.clone(),
            initial_client_id: client.client_id.clone(),
            user_id: info.user_id,
            identity_id: opts.identity_id,
            idp_session_id: opts.idp_session_id,
            amr: info.amr,
            created_at: now,
            authenticated_at: info.authenticated_at,
            refresh_tokens: vec![RefreshTokenEntry {
                token_hash: token_hash.clone(),
                client_id: client.client_id.clone(),
                created_at: now,
                scopes: opts.scopes,
                authorization_id: opts.authorization_id,
                dpop_jkt: opts.dpop_jkt,
            }],
            access_info: AccessInfo {
                initial_access: opts.access_event.clone(),
                last_access: opts.access_event,
            },
            device_info: opts.device_info,
            sso_enabled: opts.sso_enabled,
            device_secret_hash,
            device_secret_dpop_jkt,
            app2app_device_key: opts
                .app2app_device_key
                .map_or(DeviceKeyBinding::Unbound, DeviceKeyBinding::Bound),
            expire_at: now,
        };
        grant.expire_at = grant.compute_expiry(client);

        self.offline_grants.create_offline_grant(&grant).await?;
        tracing::debug!(
            offline_grant_id = %grant.id,
            client_id = %client.client_id,
            "offline grant created"
        );

        if let Some(resp) = resp {
            resp.set_refresh_token(refresh_token);
        }

        Ok((grant, token_hash))
    }

    /// Adds a refresh token for `client` to an existing offline grant and
    /// writes it into `resp`. Returns the updated grant and the token hash.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` if the grant no longer exists, or a storage
    /// error.
    pub async fn issue_refresh_token_for_offline_grant(
        &self,
        offline_grant_id: &str,
        client: &OAuthClient,
        opts: IssueRefreshTokenOptions,
        resp: &mut TokenResponse,
    ) -> OAuthResult<(OfflineGrant, String)> {
        let grant = self
            .offline_grants
            .get_offline_grant(offline_grant_id)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("offline grant not found"))?;

        let refresh_token = format!("{}.{}", grant.id, generate_token());
        let token_hash = hash_token(&refresh_token);
        let entry = RefreshTokenEntry {
            token_hash: token_hash.clone(),
            client_id: client.client_id.clone(),
            created_at: OffsetDateTime::now_utc(),
            scopes: opts.scopes,
            authorization_id: opts.authorization_id,
            dpop_jkt: opts.dpop_jkt,
        };

        let expire_at = self.compute_offline_grant_expiry(&grant);
        let grant = self
            .offline_grants
            .add_offline_grant_refresh_token(&grant.id, entry, expire_at)
            .await?;

        resp.set_refresh_token(refresh_token);
        Ok((grant, token_hash))
    }

    /// Mints an access token for a grant and writes it into `resp`.
    ///
    /// # Errors
    ///
    /// Passes through the access-token issuer's error, including
    /// [`OAuthError::HookDisallowed`].
    pub fn issue_access_grant(
        &self,
        client: &OAuthClient,
        opts: IssueAccessGrantOptions,
        resp: &mut TokenResponse,
    ) -> OAuthResult<()> {
        let now = OffsetDateTime::now_utc();
        let token = generate_token();
        let grant = AccessGrant {
            app_id: self.app_id.clone(),
            authorization_id: opts.authorization_id,
            session_id: opts.session_id,
            session_kind: opts.session_kind,
            created_at: now,
            expire_at: now + self.access_token_lifetime,
            scopes: opts.scopes,
            token_hash: hash_token(&token),
            refresh_token_hash: opts.refresh_token_hash,
        };

        let encoded = self
            .access_tokens
            .encode_access_token(client, &grant, &opts.user_id, &token)?;

        let expires_in = u64::try_from(self.access_token_lifetime.whole_seconds()).unwrap_or(0);
        resp.set_access_token(encoded, expires_in);
        Ok(())
    }

    /// Mints a device secret into `resp` and returns its hash.
    pub fn issue_device_secret(resp: &mut TokenResponse) -> String {
        let secret = generate_token();
        let hash = hash_token(&secret);
        resp.set_device_secret(secret);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::StaticClientResolver;
    use crate::token::access_token::{AccessTokenClaims, JwtAccessTokenIssuer};
    use crate::token::jwt::{JwtService, SigningKeyPair};
    use crate::token::mocks::{MockAuthorizationService, MockOfflineGrantStore};

    struct Fixture {
        service: TokenService,
        store: Arc<MockOfflineGrantStore>,
        authorizations: Arc<MockAuthorizationService>,
        jwt: Arc<JwtService>,
        client: OAuthClient,
    }

    fn fixture() -> Fixture {
        let jwt = Arc::new(JwtService::new(
            SigningKeyPair::generate_ec().unwrap(),
            "https://auth.example.com",
        ));
        let store = Arc::new(MockOfflineGrantStore::default());
        let authorizations = Arc::new(MockAuthorizationService::default());
        let client = OAuthClient::new("client-a");
        let service = TokenService::new(
            "app",
            store.clone(),
            authorizations.clone(),
            Arc::new(JwtAccessTokenIssuer::new(jwt.clone())),
            Arc::new(StaticClientResolver::new(vec![client.clone()], vec![])),
        );
        Fixture {
            service,
            store,
            authorizations,
            jwt,
            client,
        }
    }

    fn offline_options(authz: &Authorization, issue_device_secret: bool) -> IssueOfflineGrantOptions {
        let now = OffsetDateTime::now_utc();
        IssueOfflineGrantOptions {
            scopes: authz.scopes.clone(),
            authorization_id: authz.id.clone(),
            authentication_info: AuthenticationInfo::new(authz.user_id.clone(), now),
            idp_session_id: None,
            identity_id: None,
            device_info: DeviceInfo::new(),
            sso_enabled: false,
            app2app_device_key: None,
            issue_device_secret,
            dpop_jkt: Some("jkt".to_string()),
            access_event: AccessEvent::new(now, None, None),
        }
    }

    #[tokio::test]
    async fn test_issue_offline_grant_and_parse_refresh_token() {
        let f = fixture();
        let authz = f
            .authorizations
            .check_and_grant("client-a", "user-1", &["openid".to_string(), "offline_access".to_string()])
            .await
            .unwrap();

        let mut resp = TokenResponse::new();
        let (grant, token_hash) = f
            .service
            .issue_offline_grant(&f.client, offline_options(&authz, true), Some(&mut resp))
            .await
            .unwrap();

        let refresh_token = resp.refresh_token.clone().unwrap();
        assert!(refresh_token.starts_with(&format!("{}.", grant.id)));
        assert_eq!(token_hash, hash_token(&refresh_token));

        // Device secret bound to the DPoP key; only the hash is stored.
        let device_secret = resp.device_secret.clone().unwrap();
        assert_eq!(grant.device_secret_hash, Some(hash_token(&device_secret)));
        assert_eq!(grant.device_secret_dpop_jkt.as_deref(), Some("jkt"));

        let (parsed_authz, parsed_grant, parsed_hash) =
            f.service.parse_refresh_token(&refresh_token, Some("jkt")).await.unwrap();
        assert_eq!(parsed_authz.id, authz.id);
        assert_eq!(parsed_grant.id, grant.id);
        assert_eq!(parsed_hash, token_hash);
    }

    #[tokio::test]
    async fn test_parse_refresh_token_rejects_unknown_tokens() {
        let f = fixture();
        let authz = f
            .authorizations
            .check_and_grant("client-a", "user-1", &["offline_access".to_string()])
            .await
            .unwrap();
        let mut resp = TokenResponse::new();
        let (grant, _) = f
            .service
            .issue_offline_grant(&f.client, offline_options(&authz, false), Some(&mut resp))
            .await
            .unwrap();
        assert!(resp.device_secret.is_none());

        for token in [
            "no-separator".to_string(),
            format!("{}.", grant.id),
            format!("{}.wrong-secret", grant.id),
            "missing-grant.secret".to_string(),
        ] {
            let err = f.service.parse_refresh_token(&token, Some("jkt")).await.unwrap_err();
            assert_eq!(err.oauth_error_code(), "invalid_grant");
            assert_eq!(err.public_description(), "invalid refresh token");
        }
    }

    #[tokio::test]
    async fn test_parse_refresh_token_checks_dpop_binding() {
        let f = fixture();
        let authz = f
            .authorizations
            .check_and_grant("client-a", "user-1", &["offline_access".to_string()])
            .await
            .unwrap();
        let mut resp = TokenResponse::new();
        f.service
            .issue_offline_grant(&f.client, offline_options(&authz, false), Some(&mut resp))
            .await
            .unwrap();
        let refresh_token = resp.refresh_token.unwrap();

        for proof in [None, Some("other-jkt")] {
            let err = f
                .service
                .parse_refresh_token(&refresh_token, proof)
                .await
                .unwrap_err();
            assert_eq!(err.oauth_error_code(), "invalid_dpop_proof");
        }
        assert!(f.service.parse_refresh_token(&refresh_token, Some("jkt")).await.is_ok());

        // Tokens issued without a proof accept any request.
        let unbound = IssueOfflineGrantOptions {
            dpop_jkt: None,
            ..offline_options(&authz, false)
        };
        let mut resp = TokenResponse::new();
        f.service
            .issue_offline_grant(&f.client, unbound, Some(&mut resp))
            .await
            .unwrap();
        let refresh_token = resp.refresh_token.unwrap();
        assert!(f.service.parse_refresh_token(&refresh_token, None).await.is_ok());
        assert!(f.service.parse_refresh_token(&refresh_token, Some("jkt")).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_grant_rejected() {
        let f = fixture();
        let authz = f
            .authorizations
            .check_and_grant("client-a", "user-1", &["offline_access".to_string()])
            .await
            .unwrap();
        let mut resp = TokenResponse::new();
        let (grant, _) = f
            .service
            .issue_offline_grant(&f.client, offline_options(&authz, false), Some(&mut resp))
            .await
            .unwrap();

        f.store.grants.write().await.get_mut(&grant.id).unwrap().expire_at =
            OffsetDateTime::now_utc() - Duration::seconds(1);

        let err = f
            .service
            .parse_refresh_token(resp.refresh_token.as_deref().unwrap(), Some("jkt"))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_issue_refresh_token_for_existing_grant() {
        let f = fixture();
        let authz = f
            .authorizations
            .check_and_grant("client-a", "user-1", &["offline_access".to_string()])
            .await
            .unwrap();
        let (grant, _) = f
            .service
            .issue_offline_grant(&f.client, offline_options(&authz, false), None)
            .await
            .unwrap();

        let mut resp = TokenResponse::new();
        let (updated, hash) = f
            .service
            .issue_refresh_token_for_offline_grant(
                &grant.id,
                &OAuthClient::new("client-b"),
                IssueRefreshTokenOptions {
                    scopes: vec!["offline_access".to_string()],
                    authorization_id: authz.id.clone(),
                    dpop_jkt: None,
                },
                &mut resp,
            )
            .await
            .unwrap();

        assert_eq!(updated.refresh_tokens.len(), 2);
        let session = updated.to_session(&hash).unwrap();
        assert_eq!(session.client_id, "client-b");
        assert!(resp.refresh_token.unwrap().starts_with(&grant.id));
    }

    #[tokio::test]
    async fn test_issue_access_grant() {
        let f = fixture();
        let mut resp = TokenResponse::new();
        f.service
            .issue_access_grant(
                &f.client,
                IssueAccessGrantOptions {
                    scopes: vec!["openid".to_string()],
                    authorization_id: "authz".to_string(),
                    user_id: "user-1".to_string(),
                    session_id: "grant-1".to_string(),
                    session_kind: GrantSessionKind::Offline,
                    refresh_token_hash: None,
                },
                &mut resp,
            )
            .unwrap();

        assert_eq!(resp.token_type.as_deref(), Some("Bearer"));
        assert_eq!(resp.expires_in, Some(1800));
        let claims = f
            .jwt
            .decode::<AccessTokenClaims>(resp.access_token.as_deref().unwrap())
            .unwrap()
            .claims;
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.sid, "grant-1");
    }
}
