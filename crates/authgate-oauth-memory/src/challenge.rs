//! One-time challenges.

use async_trait::async_trait;
use authgate_oauth::OAuthResult;
use authgate_oauth::error::OAuthError;
use authgate_oauth::oauth::generate_token;
use authgate_oauth::services::{ChallengeProvider, ChallengePurpose};
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};

/// Default challenge lifetime.
pub const DEFAULT_CHALLENGE_LIFETIME: Duration = Duration::minutes(5);

#[derive(Debug, Clone)]
struct Challenge {
    purpose: ChallengePurpose,
    expire_at: OffsetDateTime,
}

/// Challenges keyed by token. Consuming removes the entry, so each token
/// works once.
#[derive(Debug)]
pub struct MemoryChallengeProvider {
    challenges: DashMap<String, Challenge>,
    lifetime: Duration,
}

impl Default for MemoryChallengeProvider {
    fn default() -> Self {
        Self {
            challenges: DashMap::new(),
            lifetime: DEFAULT_CHALLENGE_LIFETIME,
        }
    }
}

impl MemoryChallengeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a challenge for `purpose` and returns its token.
    pub fn issue(&self, purpose: ChallengePurpose) -> String {
        let token = generate_token();
        self.challenges.insert(
            token.clone(),
            Challenge {
                purpose,
                expire_at: OffsetDateTime::now_utc() + self.lifetime,
            },
        );
        token
    }
}

#[async_trait]
impl ChallengeProvider for MemoryChallengeProvider {
    async fn consume(&self, token: &str) -> OAuthResult<ChallengePurpose> {
        let Some((_, challenge)) = self.challenges.remove(token) else {
            return Err(OAuthError::invalid_request("invalid challenge"));
        };
        if OffsetDateTime::now_utc() > challenge.expire_at {
            return Err(OAuthError::invalid_request("invalid challenge"));
        }
        Ok(challenge.purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_challenge_is_single_use() {
        let provider = MemoryChallengeProvider::new();
        let token = provider.issue(ChallengePurpose::App2appRequest);

        assert_eq!(
            provider.consume(&token).await.unwrap(),
            ChallengePurpose::App2appRequest
        );
        assert!(provider.consume(&token).await.is_err());
        assert!(provider.consume("unknown").await.is_err());
    }
}
