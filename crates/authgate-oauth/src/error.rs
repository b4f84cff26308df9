//! Token endpoint error types.
//!
//! Errors fall into two groups. Protocol errors carry an OAuth 2.0 error code
//! and a description that is returned verbatim to the caller. Everything else
//! (storage failures, signing failures, configuration problems) is logged and
//! surfaced only as a generic `server_error`.

/// Description shown to callers in place of any non-protocol failure.
const HIDDEN_DESCRIPTION: &str = "internal server error";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// The code, refresh token or other grant is invalid, expired or revoked.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// A caller session is required but absent. Reported as `invalid_grant`
    /// with HTTP 401.
    #[error("session required: {0}")]
    SessionRequired(String),

    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    #[error("insufficient_scope: {0}")]
    InsufficientScope(String),

    #[error("access_denied: {0}")]
    AccessDenied(String),

    #[error("invalid_dpop_proof: {0}")]
    InvalidDpopProof(String),

    /// A server error whose description is safe to return to the caller.
    #[error("server_error: {0}")]
    ServerError(String),

    /// A hook refused access-token generation.
    #[error("disallowed by hook: {0}")]
    HookDisallowed(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl OAuthError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient(message.into())
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant(message.into())
    }

    pub fn session_required(message: impl Into<String>) -> Self {
        Self::SessionRequired(message.into())
    }

    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient(message.into())
    }

    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType(grant_type.into())
    }

    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope(message.into())
    }

    pub fn insufficient_scope(message: impl Into<String>) -> Self {
        Self::InsufficientScope(message.into())
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied(message.into())
    }

    pub fn invalid_dpop_proof(message: impl Into<String>) -> Self {
        Self::InvalidDpopProof(message.into())
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError(message.into())
    }

    pub fn hook_disallowed(message: impl Into<String>) -> Self {
        Self::HookDisallowed(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error code and description may reach the caller as-is.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(
            self,
            Self::HookDisallowed(_) | Self::Storage(_) | Self::Configuration(_) | Self::Internal(_)
        )
    }

    /// The `error` member of the response body.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) | Self::SessionRequired(_) => "invalid_grant",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::AccessDenied(_) => "access_denied",
            Self::InvalidDpopProof(_) => "invalid_dpop_proof",
            Self::ServerError(_)
            | Self::HookDisallowed(_)
            | Self::Storage(_)
            | Self::Configuration(_)
            | Self::Internal(_) => "server_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient(_) | Self::SessionRequired(_) => 401,
            Self::ServerError(_) => 500,
            _ if !self.is_protocol_error() => 500,
            _ => 400,
        }
    }

    /// The `error_description` member of the response body. Non-protocol
    /// errors never expose their detail.
    pub fn public_description(&self) -> String {
        match self {
            Self::UnsupportedGrantType(grant_type) => {
                format!("grant type '{grant_type}' is not supported")
            }
            Self::HookDisallowed(_) | Self::Storage(_) | Self::Configuration(_) | Self::Internal(_) => {
                HIDDEN_DESCRIPTION.to_string()
            }
            Self::InvalidRequest(message)
            | Self::InvalidClient(message)
            | Self::InvalidGrant(message)
            | Self::SessionRequired(message)
            | Self::UnauthorizedClient(message)
            | Self::InvalidScope(message)
            | Self::InsufficientScope(message)
            | Self::AccessDenied(message)
            | Self::InvalidDpopProof(message)
            | Self::ServerError(message) => message.clone(),
        }
    }
}

impl From<serde_json::Error> for OAuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_leads_with_code() {
        assert_eq!(
            OAuthError::invalid_grant("invalid authorization code").to_string(),
            "invalid_grant: invalid authorization code"
        );
        assert_eq!(
            OAuthError::unsupported_grant_type("password").to_string(),
            "unsupported_grant_type: password"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(OAuthError::invalid_request("x").http_status(), 400);
        assert_eq!(OAuthError::invalid_grant("x").http_status(), 400);
        assert_eq!(OAuthError::invalid_dpop_proof("x").http_status(), 400);
        assert_eq!(OAuthError::invalid_client("x").http_status(), 401);
        assert_eq!(OAuthError::session_required("x").http_status(), 401);
        assert_eq!(OAuthError::server_error("x").http_status(), 500);
        assert_eq!(OAuthError::storage("x").http_status(), 500);
        assert_eq!(OAuthError::hook_disallowed("x").http_status(), 500);
    }

    #[test]
    fn test_session_required_reports_invalid_grant() {
        let err = OAuthError::session_required("valid session is required");
        assert_eq!(err.oauth_error_code(), "invalid_grant");
        assert!(err.is_protocol_error());
        assert_eq!(err.public_description(), "valid session is required");
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = OAuthError::storage("connection refused to 10.0.0.3");
        assert!(!err.is_protocol_error());
        assert_eq!(err.oauth_error_code(), "server_error");
        assert_eq!(err.public_description(), "internal server error");

        assert!(!OAuthError::hook_disallowed("blocked").is_protocol_error());
        assert!(!OAuthError::configuration("bad ttl").is_protocol_error());
    }

    #[test]
    fn test_protocol_server_error_keeps_message() {
        let err = OAuthError::server_error("cannot find original client for app2app");
        assert!(err.is_protocol_error());
        assert_eq!(
            err.public_description(),
            "cannot find original client for app2app"
        );
    }

    #[test]
    fn test_unsupported_grant_type_description() {
        let err = OAuthError::unsupported_grant_type("password");
        assert_eq!(err.public_description(), "grant type 'password' is not supported");
    }
}
