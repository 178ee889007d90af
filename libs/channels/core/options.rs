use crate::core::protocol::{CLIENT_NAME, LIBRARY_VERSION, PROTOCOL_VERSION};
use crate::traits::authorizer::{AuthRequestBuilder, Authorizer};
use crate::traits::error::{ChannelsError, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default Channels host when no cluster is given
pub const DEFAULT_HOST: &str = "ws.pusherapp.com";

/// How subscriptions to authenticated channels obtain credentials
#[derive(Clone, Default)]
pub enum AuthMethod {
    /// POST `socket_id` and `channel_name` to this URL
    Endpoint(String),
    /// Host builds the HTTP request
    RequestBuilder(Arc<dyn AuthRequestBuilder>),
    /// Host produces the credentials directly
    Authorizer(Arc<dyn Authorizer>),
    /// Sign locally with the app secret (development only)
    InlineSecret(String),
    #[default]
    None,
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Endpoint(url) => f.debug_tuple("Endpoint").field(url).finish(),
            AuthMethod::RequestBuilder(_) => f.write_str("RequestBuilder(..)"),
            AuthMethod::Authorizer(_) => f.write_str("Authorizer(..)"),
            AuthMethod::InlineSecret(_) => f.write_str("InlineSecret(<redacted>)"),
            AuthMethod::None => f.write_str("None"),
        }
    }
}

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Host(String),
    /// Cluster name such as `eu`, resolved to `ws-<cluster>.pusher.com`
    Cluster(String),
}

impl Host {
    pub fn hostname(&self) -> String {
        match self {
            Host::Host(host) => host.clone(),
            Host::Cluster(cluster) => format!("ws-{}.pusher.com", cluster),
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Host::Host(DEFAULT_HOST.to_string())
    }
}

/// Connection and reconnection settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub auth_method: AuthMethod,
    /// Reconnect after unexpected drops; ignored for protocol close codes 4000-4999
    pub auto_reconnect: bool,
    pub host: Host,
    /// Defaults to 443 with TLS and 80 without
    pub port: Option<u16>,
    /// Path prefix inserted before `/app/<key>`
    pub path: Option<String>,
    pub use_tls: bool,
    /// Overrides the server-provided activity timeout
    pub activity_timeout: Option<Duration>,
    /// How long to wait for a pong after an activity ping
    pub pong_timeout: Duration,
    /// Stop reconnecting after this many attempts (None = unlimited)
    pub max_reconnect_attempts: Option<usize>,
    /// Upper bound of the quadratic reconnect delay
    pub max_reconnect_gap: Duration,
    /// Honour [`set_network_reachable`](crate::core::client::ChannelsClient::set_network_reachable)
    pub monitor_reachability: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auth_method: AuthMethod::None,
            auto_reconnect: true,
            host: Host::default(),
            port: None,
            path: None,
            use_tls: true,
            activity_timeout: None,
            pong_timeout: Duration::from_secs(30),
            max_reconnect_attempts: None,
            max_reconnect_gap: Duration::from_secs(120),
            monitor_reachability: true,
        }
    }
}

impl ClientOptions {
    /// Effective port
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.use_tls { 443 } else { 80 })
    }

    /// Full WebSocket URL for an app key
    pub fn socket_url(&self, key: &str) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        let path = match self.path.as_deref().map(|p| p.trim_end_matches('/')) {
            Some("") | None => String::new(),
            Some(p) if p.starts_with('/') => p.to_string(),
            Some(p) => format!("/{}", p),
        };

        format!(
            "{}://{}:{}{}/app/{}?client={}&version={}&protocol={}",
            scheme,
            self.host.hostname(),
            self.port(),
            path,
            key,
            CLIENT_NAME,
            LIBRARY_VERSION,
            PROTOCOL_VERSION
        )
    }

    /// Reject option combinations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.hostname().is_empty() {
            return Err(ChannelsError::Configuration("host must not be empty".to_string()));
        }

        if self.pong_timeout.is_zero() {
            return Err(ChannelsError::Configuration(
                "pong_timeout must be greater than 0".to_string(),
            ));
        }

        if self.activity_timeout.map_or(false, |t| t.is_zero()) {
            return Err(ChannelsError::Configuration(
                "activity_timeout must be greater than 0".to_string(),
            ));
        }

        if let AuthMethod::Endpoint(url) = &self.auth_method {
            if url.is_empty() {
                return Err(ChannelsError::Configuration(
                    "auth endpoint must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let options = ClientOptions::default();
        assert_eq!(
            options.socket_url("app-key"),
            format!(
                "wss://ws.pusherapp.com:443/app/app-key?client=channels-rust&version={}&protocol=7",
                LIBRARY_VERSION
            )
        );
    }

    #[test]
    fn test_cluster_url() {
        let options = ClientOptions {
            host: Host::Cluster("eu".to_string()),
            ..Default::default()
        };
        assert!(options
            .socket_url("k")
            .starts_with("wss://ws-eu.pusher.com:443/app/k?"));
    }

    #[test]
    fn test_plain_url_with_port_and_path() {
        let options = ClientOptions {
            host: Host::Host("localhost".to_string()),
            port: Some(6001),
            path: Some("socket/".to_string()),
            use_tls: false,
            ..Default::default()
        };
        assert!(options
            .socket_url("k")
            .starts_with("ws://localhost:6001/socket/app/k?"));
    }

    #[test]
    fn test_default_ports() {
        let mut options = ClientOptions::default();
        assert_eq!(options.port(), 443);
        options.use_tls = false;
        assert_eq!(options.port(), 80);
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let options = ClientOptions {
            pong_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = ClientOptions {
            activity_timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        assert!(ClientOptions::default().validate().is_ok());
    }

    #[test]
    fn test_inline_secret_is_redacted() {
        let method = AuthMethod::InlineSecret("top-secret".to_string());
        assert!(!format!("{:?}", method).contains("top-secret"));
    }
}
