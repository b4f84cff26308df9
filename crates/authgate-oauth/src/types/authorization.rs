//! Durable client/user authorizations.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::scope;

/// Scopes a user has granted to a client.
///
/// Scopes only ever accumulate; granting never removes a scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Authorization {
    /// Authorization ID.
    pub id: String,
    /// Owning application.
    pub app_id: String,
    /// Authorized client.
    pub client_id: String,
    /// Authorizing user.
    pub user_id: String,
    /// When the authorization was first created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When scopes were last added.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Accumulated scopes.
    pub scopes: Vec<String>,
}

impl Authorization {
    /// Returns `true` if every scope in `required` has been granted.
    #[must_use]
    pub fn is_authorized<S: AsRef<str>>(&self, required: &[S]) -> bool {
        scope::contains_all(&self.scopes, required)
    }

    /// Adds any scopes not yet granted, keeping existing order.
    ///
    /// Returns `true` if a scope was added.
    pub fn grant(&mut self, scopes: &[String], now: OffsetDateTime) -> bool {
        let mut changed = false;
        for s in scopes {
            if !scope::contains(&self.scopes, s) {
                self.scopes.push(s.clone());
                changed = true;
            }
        }
        if changed {
            self.updated_at = now;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_only_accumulates() {
        let now = OffsetDateTime::now_utc();
        let mut authz = Authorization {
            id: "a1".to_string(),
            app_id: "app".to_string(),
            client_id: "c1".to_string(),
            user_id: "u1".to_string(),
            created_at: now,
            updated_at: now,
            scopes: vec!["openid".to_string()],
        };

        assert!(authz.grant(&["offline_access".to_string()], now));
        assert!(!authz.grant(&["openid".to_string()], now));
        assert_eq!(authz.scopes, vec!["openid", "offline_access"]);
        assert!(authz.is_authorized(&["openid", "offline_access"]));
        assert!(!authz.is_authorized(&[scope::FULL_ACCESS]));
    }
}
