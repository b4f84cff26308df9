//! Session identifiers, access grants and app-session tokens.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::grant::AuthenticationInfo;
use crate::types::offline_grant::OfflineGrantSession;

// =============================================================================
// Session Type & SID
// =============================================================================

/// Kind of session an ID token's `sid` points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Browser session held by the identity provider.
    Idp,
    /// Refresh-token session.
    OfflineGrant,
}

impl SessionType {
    /// Returns the string form used inside an encoded SID.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idp => "idp",
            Self::OfflineGrant => "offline_grant",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "idp" => Some(Self::Idp),
            "offline_grant" => Some(Self::OfflineGrant),
            _ => None,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encodes a session reference into the `sid` claim form.
#[must_use]
pub fn encode_sid(session_type: SessionType, session_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", session_type.as_str(), session_id))
}

/// Decodes a `sid` claim. Returns `None` for anything malformed.
#[must_use]
pub fn decode_sid(sid: &str) -> Option<(SessionType, String)> {
    let bytes = URL_SAFE_NO_PAD.decode(sid).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let (typ, id) = decoded.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    Some((SessionType::parse(typ)?, id.to_string()))
}

// =============================================================================
// Caller Session
// =============================================================================

/// An identity-provider (browser) session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdpSession {
    /// Session ID.
    pub id: String,

    /// Signed-in user.
    pub user_id: String,

    /// When the user last authenticated.
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,

    /// Authentication method references.
    #[serde(default)]
    pub amr: Vec<String>,
}

impl IdpSession {
    /// Returns the authentication info of this session.
    #[must_use]
    pub fn authentication_info(&self) -> AuthenticationInfo {
        AuthenticationInfo::new(self.user_id.clone(), self.authenticated_at)
            .with_amr(self.amr.clone())
            .with_session(SessionType::Idp, self.id.clone())
    }
}

/// The session the caller of the token endpoint is already signed in with.
#[derive(Debug, Clone)]
pub enum CallerSession {
    /// Browser session.
    Idp(IdpSession),
    /// Refresh-token session, narrowed to one refresh token.
    OfflineGrant(OfflineGrantSession),
}

impl CallerSession {
    /// Returns the signed-in user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Idp(s) => &s.user_id,
            Self::OfflineGrant(s) => &s.offline_grant.user_id,
        }
    }

    /// Returns the encoded SID of this session.
    #[must_use]
    pub fn sid(&self) -> String {
        match self {
            Self::Idp(s) => encode_sid(SessionType::Idp, &s.id),
            Self::OfflineGrant(s) => s.offline_grant.sid(),
        }
    }

    /// Returns the authentication info of this session.
    #[must_use]
    pub fn authentication_info(&self) -> AuthenticationInfo {
        match self {
            Self::Idp(s) => s.authentication_info(),
            Self::OfflineGrant(s) => s.offline_grant.authentication_info(),
        }
    }
}

// =============================================================================
// Access Grant
// =============================================================================

/// Kind of session backing an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSessionKind {
    /// Backed by an IDP session.
    Session,
    /// Backed by an offline grant.
    Offline,
}

/// What an access token is allowed to do, handed to the access-token issuer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessGrant {
    /// Owning application.
    pub app_id: String,
    /// Authorization the grant derives from.
    pub authorization_id: String,
    /// Backing session ID.
    pub session_id: String,
    /// Backing session kind.
    pub session_kind: GrantSessionKind,
    /// When the grant was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the access token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Hash of the opaque access token.
    pub token_hash: String,
    /// Hash of the refresh token this access token was issued alongside.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<String>,
}

// =============================================================================
// App Session Token
// =============================================================================

/// Short-lived token that lets a first-party app open a web session from a
/// refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSessionToken {
    /// Owning application.
    pub app_id: String,
    /// Offline grant the token was minted from.
    pub offline_grant_id: String,
    /// When the token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    /// Hash of the app-session token.
    pub token_hash: String,
    /// Hash of the refresh token it was minted from.
    pub refresh_token_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sid_roundtrip() {
        let sid = encode_sid(SessionType::OfflineGrant, "grant-1");
        assert_eq!(
            decode_sid(&sid),
            Some((SessionType::OfflineGrant, "grant-1".to_string()))
        );

        let sid = encode_sid(SessionType::Idp, "idp-1");
        assert_eq!(decode_sid(&sid), Some((SessionType::Idp, "idp-1".to_string())));
    }

    #[test]
    fn test_decode_sid_rejects_garbage() {
        assert_eq!(decode_sid("!!!"), None);
        assert_eq!(decode_sid(&URL_SAFE_NO_PAD.encode("no-separator")), None);
        assert_eq!(decode_sid(&URL_SAFE_NO_PAD.encode("unknown:abc")), None);
        assert_eq!(decode_sid(&URL_SAFE_NO_PAD.encode("idp:")), None);
    }

    #[test]
    fn test_idp_session_authentication_info() {
        let session = IdpSession {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            authenticated_at: OffsetDateTime::now_utc(),
            amr: vec!["pwd".to_string()],
        };

        let info = session.authentication_info();
        assert_eq!(info.user_id, "u1");
        assert_eq!(info.authenticated_by_session_type, Some(SessionType::Idp));
        assert_eq!(info.authenticated_by_session_id.as_deref(), Some("s1"));
        assert_eq!(info.amr, vec!["pwd"]);
    }
}
