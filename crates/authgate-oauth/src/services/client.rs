//! Client lookup.

use std::collections::HashMap;

use crate::types::{ClientCredentials, OAuthClient};

/// Resolves registered clients and their secrets.
pub trait ClientResolver: Send + Sync {
    /// Returns the client with `client_id`, if registered.
    fn resolve_client(&self, client_id: &str) -> Option<OAuthClient>;

    /// Returns the secrets registered for `client_id`, if any.
    fn lookup_credentials(&self, client_id: &str) -> Option<ClientCredentials>;
}

/// Client resolver over a fixed client list, usually loaded from
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticClientResolver {
    clients: HashMap<String, OAuthClient>,
    credentials: HashMap<String, ClientCredentials>,
}

impl StaticClientResolver {
    /// Creates a resolver over the given clients and credentials.
    #[must_use]
    pub fn new(clients: Vec<OAuthClient>, credentials: Vec<ClientCredentials>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
            credentials: credentials
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        }
    }
}

impl ClientResolver for StaticClientResolver {
    fn resolve_client(&self, client_id: &str) -> Option<OAuthClient> {
        self.clients.get(client_id).cloned()
    }

    fn lookup_credentials(&self, client_id: &str) -> Option<ClientCredentials> {
        self.credentials.get(client_id).cloned()
    }
}
