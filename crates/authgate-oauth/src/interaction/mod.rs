//! Contract with the interaction-graph engine.
//!
//! Anonymous and biometric requests authenticate through the same graph
//! engine as interactive logins. The token endpoint submits an intent and one
//! input, and gets back the resulting graph plus the edges still pending.
//! A graph is complete only when no edge is pending; nothing is committed
//! until [`InteractionGraphService::run`] is called on a complete graph.

use async_trait::async_trait;
use serde_json::Value;

use crate::OAuthResult;
use crate::error::OAuthError;

/// Kind of authentication an [`Intent::Authenticate`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticateKind {
    /// Sign in an existing or new user.
    Login,
}

/// What the graph is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Authenticate a user.
    Authenticate {
        /// Kind of authentication.
        kind: AuthenticateKind,
        /// Do not issue an IDP session cookie.
        suppress_idp_session_cookie: bool,
    },
    /// Attach a new identity to an existing user.
    AddIdentity {
        /// The user receiving the identity.
        user_id: String,
    },
}

impl Intent {
    /// Login intent used by token-endpoint grants; no browser session is
    /// created.
    #[must_use]
    pub fn token_login() -> Self {
        Self::Authenticate {
            kind: AuthenticateKind::Login,
            suppress_idp_session_cookie: true,
        }
    }
}

/// Input submitted to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphInput {
    /// Anonymous request JWT. Signing up without a key is never allowed here.
    AnonymousRequest {
        /// The request JWT.
        jwt: String,
    },
    /// Biometric request JWT.
    BiometricRequest {
        /// The request JWT.
        jwt: String,
    },
}

/// Resulting graph state, opaque apart from what the token endpoint reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    /// Authenticated user, once known.
    pub user_id: Option<String>,
    /// Authentication method references collected along the graph.
    pub amr: Vec<String>,
    /// Identity used or created last.
    pub last_identity_id: Option<String>,
    /// Engine-private state.
    pub state: Value,
}

impl Graph {
    /// Returns the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the graph resolved no user.
    pub fn user_id(&self) -> OAuthResult<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| OAuthError::internal("interaction graph has no user"))
    }

    /// Returns the identity used last.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the graph used no identity.
    pub fn last_identity_id(&self) -> OAuthResult<&str> {
        self.last_identity_id
            .as_deref()
            .ok_or_else(|| OAuthError::internal("interaction graph has no identity"))
    }
}

/// Result of a dry run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphOutcome {
    /// The graph after accepting the input.
    pub graph: Graph,
    /// Edges still waiting for input.
    pub pending_edges: Vec<String>,
}

impl GraphOutcome {
    /// Returns `true` if no edge is pending.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pending_edges.is_empty()
    }
}

/// Errors reported by the graph engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A policy invariant was violated, tagged with its cause.
    #[error("invariant violated ({cause}): {message}")]
    InvariantViolated {
        /// Cause tag, e.g. `AnonymousUserDisallowed`.
        cause: String,
        /// Description.
        message: String,
    },

    /// The submitted credentials were rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Any other API-level error, safe to show to the caller.
    #[error("{reason}: {message}")]
    Api {
        /// Error reason.
        reason: String,
        /// Description.
        message: String,
    },

    /// Unexpected engine failure.
    #[error("interaction graph failure: {0}")]
    Other(String),
}

impl GraphError {
    /// Returns `true` if this is an invariant violation tagged `cause`.
    #[must_use]
    pub fn has_cause(&self, cause: &str) -> bool {
        matches!(self, Self::InvariantViolated { cause: c, .. } if c == cause)
    }

    /// Maps an error from [`InteractionGraphService::run`]: API errors become
    /// `invalid_request`, anything else is internal.
    #[must_use]
    pub fn into_run_error(self) -> OAuthError {
        match self {
            Self::Other(message) => OAuthError::internal(message),
            api_error => OAuthError::invalid_request(api_error.to_string()),
        }
    }
}

/// The interaction-graph engine.
#[async_trait]
pub trait InteractionGraphService: Send + Sync {
    /// Builds a graph for `intent`, feeds it `input`, and returns the result
    /// without committing anything.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the input is rejected.
    async fn dry_run(&self, intent: Intent, input: GraphInput) -> Result<GraphOutcome, GraphError>;

    /// Commits a complete graph.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if committing fails.
    async fn run(&self, graph: &Graph) -> Result<(), GraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_cause() {
        let err = GraphError::InvariantViolated {
            cause: "BiometricDisallowed".to_string(),
            message: "biometric is disallowed".to_string(),
        };
        assert!(err.has_cause("BiometricDisallowed"));
        assert!(!err.has_cause("AnonymousUserDisallowed"));
        assert!(!GraphError::InvalidCredentials.has_cause("BiometricDisallowed"));
    }

    #[test]
    fn test_run_error_mapping() {
        let err = GraphError::Api {
            reason: "UserDisabled".to_string(),
            message: "user is disabled".to_string(),
        }
        .into_run_error();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert_eq!(err.public_description(), "UserDisabled: user is disabled");

        let err = GraphError::Other("db down".to_string()).into_run_error();
        assert!(!err.is_protocol_error());
    }

    #[test]
    fn test_graph_accessors() {
        let graph = Graph::default();
        assert!(graph.user_id().is_err());

        let outcome = GraphOutcome {
            graph: Graph {
                user_id: Some("u1".to_string()),
                ..Graph::default()
            },
            pending_edges: vec![],
        };
        assert!(outcome.is_complete());
        assert_eq!(outcome.graph.user_id().unwrap(), "u1");
    }
}
