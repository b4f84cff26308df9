//! Pre-authenticated URL tokens.

use async_trait::async_trait;
use authgate_oauth::OAuthResult;
use authgate_oauth::oauth::{generate_token, hash_token};
use authgate_oauth::services::{
    IssuePreAuthenticatedUrlTokenOptions, PreAuthenticatedUrlToken,
    PreAuthenticatedUrlTokenService,
};
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};

/// Default lifetime of pre-authenticated URL tokens.
pub const DEFAULT_PRE_AUTHENTICATED_URL_TOKEN_LIFETIME: Duration = Duration::minutes(5);

/// A stored pre-authenticated URL token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPreAuthenticatedUrlToken {
    pub options: IssuePreAuthenticatedUrlTokenOptions,
    pub expire_at: OffsetDateTime,
}

/// Pre-authenticated URL tokens keyed by token hash.
#[derive(Debug, Default)]
pub struct MemoryPreAuthenticatedUrlTokenService {
    tokens: DashMap<String, StoredPreAuthenticatedUrlToken>,
}

impl MemoryPreAuthenticatedUrlTokenService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an issued token by its plaintext value.
    pub fn get(&self, token: &str) -> Option<StoredPreAuthenticatedUrlToken> {
        self.tokens.get(&hash_token(token)).map(|t| t.clone())
    }
}

#[async_trait]
impl PreAuthenticatedUrlTokenService for MemoryPreAuthenticatedUrlTokenService {
    async fn issue_pre_authenticated_url_token(
        &self,
        options: IssuePreAuthenticatedUrlTokenOptions,
    ) -> OAuthResult<PreAuthenticatedUrlToken> {
        let token = generate_token();
        let lifetime = DEFAULT_PRE_AUTHENTICATED_URL_TOKEN_LIFETIME;
        self.tokens.insert(
            hash_token(&token),
            StoredPreAuthenticatedUrlToken {
                options,
                expire_at: OffsetDateTime::now_utc() + lifetime,
            },
        );
        Ok(PreAuthenticatedUrlToken {
            token,
            token_type: "Bearer".to_string(),
            expires_in: lifetime.whole_seconds().unsigned_abs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_issue_stores_only_the_hash() {
        let service = MemoryPreAuthenticatedUrlTokenService::new();
        let options = IssuePreAuthenticatedUrlTokenOptions {
            app_id: "myapp".to_string(),
            authorization_id: "authz-1".to_string(),
            client_id: "web".to_string(),
            offline_grant_id: "og-1".to_string(),
            scopes: vec!["openid".to_string()],
        };

        let issued = block_on(service.issue_pre_authenticated_url_token(options.clone())).unwrap();
        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 300);

        let stored = service.get(&issued.token).unwrap();
        assert_eq!(stored.options, options);
        assert!(service.tokens.get(&issued.token).is_none());
        assert!(service.get("unknown").is_none());
    }
}
