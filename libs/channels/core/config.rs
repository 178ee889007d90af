//! File-based configuration.
//!
//! Connection settings come from YAML; the app secret only ever comes from the
//! environment (or a `.env` file) and is never read from YAML.

use crate::core::options::{AuthMethod, ClientOptions, Host};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the app secret for inline signing
pub const APP_SECRET_ENV: &str = "CHANNELS_APP_SECRET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Client configuration as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub app_key: String,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub auth_endpoint: Option<String>,
    #[serde(default)]
    pub activity_timeout_secs: Option<u64>,
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,
    #[serde(default)]
    pub max_reconnect_attempts: Option<usize>,
    #[serde(default = "default_max_reconnect_gap_secs")]
    pub max_reconnect_gap_secs: u64,
    /// Channels the listener subscribes to on startup
    #[serde(default)]
    pub channels: Vec<String>,

    /// App secret from .env (not in YAML)
    #[serde(skip)]
    pub app_secret: Option<String>,
}

fn default_use_tls() -> bool {
    true
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_pong_timeout_secs() -> u64 {
    30
}

fn default_max_reconnect_gap_secs() -> u64 {
    120
}

impl ClientConfig {
    /// Load configuration from YAML file and .env
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: ClientConfig = serde_yaml::from_str(&yaml_content)?;

        // Don't fail if .env doesn't exist
        dotenv::dotenv().ok();

        config.app_secret = std::env::var(APP_SECRET_ENV).ok().filter(|s| !s.is_empty());

        config.validate()?;

        Ok(config)
    }

    /// Like [`ClientConfig::load`] but the app secret is mandatory
    pub fn load_with_secret(config_path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load(config_path)?;
        if config.app_secret.is_none() {
            return Err(ConfigError::EnvVarMissing(APP_SECRET_ENV.to_string()));
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.app_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "app_key must not be empty".to_string(),
            ));
        }

        if self.cluster.is_some() && self.host.is_some() {
            return Err(ConfigError::ValidationError(
                "set either cluster or host, not both".to_string(),
            ));
        }

        if self.pong_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pong_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.activity_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "activity_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(endpoint) = &self.auth_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::ValidationError(
                    "auth_endpoint must be an http(s) URL".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Build client options
    ///
    /// An auth endpoint wins over the app secret; with neither, authenticated
    /// channels cannot be subscribed.
    pub fn client_options(&self) -> ClientOptions {
        let host = match (&self.cluster, &self.host) {
            (Some(cluster), _) => Host::Cluster(cluster.clone()),
            (None, Some(host)) => Host::Host(host.clone()),
            (None, None) => Host::default(),
        };

        let auth_method = match (&self.auth_endpoint, &self.app_secret) {
            (Some(endpoint), _) => AuthMethod::Endpoint(endpoint.clone()),
            (None, Some(secret)) => AuthMethod::InlineSecret(secret.clone()),
            (None, None) => AuthMethod::None,
        };

        ClientOptions {
            auth_method,
            auto_reconnect: self.auto_reconnect,
            host,
            port: self.port,
            path: self.path.clone(),
            use_tls: self.use_tls,
            activity_timeout: self.activity_timeout_secs.map(Duration::from_secs),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
            max_reconnect_gap: Duration::from_secs(self.max_reconnect_gap_secs),
            monitor_reachability: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> ClientConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let config = config("app_key: abc123\n");
        assert!(config.use_tls);
        assert!(config.auto_reconnect);
        assert_eq!(config.pong_timeout_secs, 30);
        assert_eq!(config.max_reconnect_gap_secs, 120);
        assert!(config.channels.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        assert!(config("app_key: ''\n").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_cluster_and_host() {
        let config = config("app_key: k\ncluster: eu\nhost: localhost\n");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        assert!(config("app_key: k\nauth_endpoint: ftp://x\n")
            .validate()
            .is_err());
    }

    #[test]
    fn test_client_options_auth_precedence() {
        let mut config = config("app_key: k\nauth_endpoint: https://example.com/auth\n");
        config.app_secret = Some("secret".to_string());
        assert!(matches!(
            config.client_options().auth_method,
            AuthMethod::Endpoint(ref url) if url == "https://example.com/auth"
        ));

        config.auth_endpoint = None;
        assert!(matches!(
            config.client_options().auth_method,
            AuthMethod::InlineSecret(_)
        ));

        config.app_secret = None;
        assert!(matches!(config.client_options().auth_method, AuthMethod::None));
    }

    #[test]
    fn test_client_options_host_and_timeouts() {
        let config = config(
            "app_key: k\ncluster: ap1\nactivity_timeout_secs: 20\npong_timeout_secs: 5\nmax_reconnect_attempts: 3\n",
        );
        let options = config.client_options();
        assert_eq!(options.host, Host::Cluster("ap1".to_string()));
        assert_eq!(options.activity_timeout, Some(Duration::from_secs(20)));
        assert_eq!(options.pong_timeout, Duration::from_secs(5));
        assert_eq!(options.max_reconnect_attempts, Some(3));
    }
}
