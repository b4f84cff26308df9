//! Token endpoint configuration.
//!
//! Loaded from an optional TOML file layered under environment overrides,
//! e.g. `AUTHGATE__FEATURES__APP2APP_ENABLED=true`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::TokenHandlerOptions;
use crate::services::StaticClientResolver;
use crate::types::{ClientCredentials, OAuthClient};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "AUTHGATE";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenEndpointConfig {
    /// Public base URL; `iss` of issued tokens.
    pub issuer: String,
    /// Owning application.
    pub app_id: String,
    /// Optional grant features.
    pub features: FeatureConfig,
    /// Lifetime of access tokens.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    /// Lifetime of app-session tokens.
    #[serde(with = "humantime_serde")]
    pub app_session_token_lifetime: Duration,
    /// Registered clients.
    pub clients: Vec<OAuthClient>,
    /// Secrets of confidential clients.
    pub client_credentials: Vec<ClientCredentials>,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Default for TokenEndpointConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:3000".to_string(),
            app_id: "default".to_string(),
            features: FeatureConfig::default(),
            access_token_lifetime: Duration::from_secs(30 * 60),
            app_session_token_lifetime: Duration::from_secs(5 * 60),
            clients: Vec::new(),
            client_credentials: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub app2app_enabled: bool,
    pub biometric_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TokenEndpointConfig {
    /// Checks the configuration for values the endpoint cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending key.
    pub fn validate(&self) -> Result<(), String> {
        let issuer = Url::parse(&self.issuer).map_err(|e| format!("issuer is not a URL: {e}"))?;
        if !matches!(issuer.scheme(), "http" | "https") {
            return Err("issuer must be an http(s) URL".into());
        }
        if self.app_id.is_empty() {
            return Err("app_id must not be empty".into());
        }
        if self.access_token_lifetime.is_zero() {
            return Err("access_token_lifetime must be > 0".into());
        }
        if self.app_session_token_lifetime.is_zero() {
            return Err("app_session_token_lifetime must be > 0".into());
        }

        let mut seen = HashSet::new();
        for client in &self.clients {
            if client.client_id.is_empty() {
                return Err("clients: client_id must not be empty".into());
            }
            if !seen.insert(client.client_id.as_str()) {
                return Err(format!("clients: duplicate client_id '{}'", client.client_id));
            }
            if client.refresh_token_lifetime.is_zero() {
                return Err(format!(
                    "clients.{}: refresh_token_lifetime must be > 0",
                    client.client_id
                ));
            }
            if client.refresh_token_idle_timeout_enabled
                && client.refresh_token_idle_timeout > client.refresh_token_lifetime
            {
                return Err(format!(
                    "clients.{}: refresh_token_idle_timeout must not exceed refresh_token_lifetime",
                    client.client_id
                ));
            }
            for uri in &client.redirect_uris {
                Url::parse(uri).map_err(|e| {
                    format!("clients.{}: invalid redirect URI '{uri}': {e}", client.client_id)
                })?;
            }
        }

        for credentials in &self.client_credentials {
            let Some(client) = self
                .clients
                .iter()
                .find(|c| c.client_id == credentials.client_id)
            else {
                return Err(format!(
                    "client_credentials: unknown client '{}'",
                    credentials.client_id
                ));
            };
            if !client.confidential {
                return Err(format!(
                    "client_credentials: client '{}' is not confidential",
                    client.client_id
                ));
            }
            if credentials.secrets.iter().any(String::is_empty) {
                return Err(format!(
                    "client_credentials.{}: secrets must not be empty",
                    client.client_id
                ));
            }
        }

        Ok(())
    }

    /// Builds the token handler options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a lifetime is out of range.
    pub fn handler_options(&self) -> OAuthResult<TokenHandlerOptions> {
        Ok(TokenHandlerOptions {
            app_id: self.app_id.clone(),
            app2app_enabled: self.features.app2app_enabled,
            biometric_enabled: self.features.biometric_enabled,
            access_token_lifetime: to_time_duration(
                "access_token_lifetime",
                self.access_token_lifetime,
            )?,
            app_session_token_lifetime: to_time_duration(
                "app_session_token_lifetime",
                self.app_session_token_lifetime,
            )?,
        })
    }

    /// Builds a client resolver over the configured clients.
    #[must_use]
    pub fn client_resolver(&self) -> StaticClientResolver {
        StaticClientResolver::new(self.clients.clone(), self.client_credentials.clone())
    }
}

fn to_time_duration(key: &str, d: Duration) -> OAuthResult<time::Duration> {
    time::Duration::try_from(d)
        .map_err(|e| OAuthError::configuration(format!("{key} is out of range: {e}")))
}

/// Loads configuration from `path` (if it exists) and `AUTHGATE__*`
/// environment variables, then validates it.
///
/// # Errors
///
/// Returns a configuration error if a source cannot be read, the result
/// cannot be deserialized, or validation fails.
pub fn load_config(path: Option<&Path>) -> OAuthResult<TokenEndpointConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path.filter(|p| p.exists()) {
        builder = builder.add_source(File::from(path));
    }
    // e.g. AUTHGATE__ACCESS_TOKEN_LIFETIME=15m
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__"),
    );

    let cfg: TokenEndpointConfig = builder
        .build()
        .map_err(|e| OAuthError::configuration(format!("failed to build config: {e}")))?
        .try_deserialize()
        .map_err(|e| OAuthError::configuration(format!("failed to deserialize config: {e}")))?;

    cfg.validate().map_err(OAuthError::configuration)?;
    Ok(cfg)
}
