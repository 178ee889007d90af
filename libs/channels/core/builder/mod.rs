pub mod states;

use crate::core::client::ChannelsClient;
use crate::core::engine::{ConnectionEngine, EngineParts};
use crate::core::options::{AuthMethod, ClientOptions, Host};
use crate::socket::WebSocketTransport;
use crate::traits::authorizer::{AuthRequestBuilder, Authorizer, UserDataFetcher};
use crate::traits::crypto::{Crypto, RustCrypto};
use crate::traits::delegate::{ChannelsDelegate, NoDelegate};
use crate::traits::error::{ChannelsError, Result};
use crate::traits::http::{HttpClient, ReqwestHttpClient};
use crate::traits::reconnect::ReconnectionStrategy;
use crate::traits::transport::Transport;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`ChannelsClient`]
///
/// The app key is required; `build()` only exists once [`ClientBuilder::key`]
/// has been called. Every collaborator has a default: the bundled WebSocket
/// transport, reqwest for auth requests and RustCrypto for signing and
/// decryption.
pub struct ClientBuilder<K>
where
    K: KeyState,
{
    _state: TypeState<K>,
    key: Option<String>,
    options: ClientOptions,
    transport: Option<Arc<dyn Transport>>,
    http: Option<Arc<dyn HttpClient>>,
    crypto: Option<Arc<dyn Crypto>>,
    user_data: Option<Arc<dyn UserDataFetcher>>,
    delegate: Option<Arc<dyn ChannelsDelegate>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ClientBuilder<NoKey> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            key: None,
            options: ClientOptions::default(),
            transport: None,
            http: None,
            crypto: None,
            user_data: None,
            delegate: None,
            reconnect_strategy: None,
        }
    }

    pub fn key(self, key: impl Into<String>) -> ClientBuilder<HasKey> {
        ClientBuilder {
            _state: TypeState::new(),
            key: Some(key.into()),
            options: self.options,
            transport: self.transport,
            http: self.http,
            crypto: self.crypto,
            user_data: self.user_data,
            delegate: self.delegate,
            reconnect_strategy: self.reconnect_strategy,
        }
    }
}

impl Default for ClientBuilder<NoKey> {
    fn default() -> Self {
        Self::new()
    }
}

// Optional configuration methods
impl<K> ClientBuilder<K>
where
    K: KeyState,
{
    /// Replace all options at once
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.options.host = Host::Cluster(cluster.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = Host::Host(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.options.port = Some(port);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options.path = Some(path.into());
        self
    }

    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.options.use_tls = use_tls;
        self
    }

    pub fn auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.options.auto_reconnect = auto_reconnect;
        self
    }

    /// POST `socket_id` and `channel_name` to this URL for credentials
    pub fn auth_endpoint(mut self, url: impl Into<String>) -> Self {
        self.options.auth_method = AuthMethod::Endpoint(url.into());
        self
    }

    pub fn auth_request_builder(mut self, builder: impl AuthRequestBuilder + 'static) -> Self {
        self.options.auth_method = AuthMethod::RequestBuilder(Arc::new(builder));
        self
    }

    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.options.auth_method = AuthMethod::Authorizer(Arc::new(authorizer));
        self
    }

    /// Sign subscriptions locally with the app secret
    ///
    /// Never ship the secret in a client distributed to end users.
    pub fn inline_secret(mut self, secret: impl Into<String>) -> Self {
        self.options.auth_method = AuthMethod::InlineSecret(secret.into());
        self
    }

    /// Override the server-provided activity timeout
    pub fn activity_timeout(mut self, timeout: Duration) -> Self {
        self.options.activity_timeout = Some(timeout);
        self
    }

    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.options.pong_timeout = timeout;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: usize) -> Self {
        self.options.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn max_reconnect_gap(mut self, gap: Duration) -> Self {
        self.options.max_reconnect_gap = gap;
        self
    }

    pub fn monitor_reachability(mut self, enabled: bool) -> Self {
        self.options.monitor_reachability = enabled;
        self
    }

    /// Use a custom transport
    ///
    /// The host then feeds the transport's events to
    /// [`ChannelsClient::handle_transport_event`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn crypto(mut self, crypto: Arc<dyn Crypto>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Presence `channel_data` source for inline-secret auth
    pub fn user_data(mut self, fetcher: impl UserDataFetcher + 'static) -> Self {
        self.user_data = Some(Arc::new(fetcher));
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn ChannelsDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Replace the quadratic backoff used after unexpected drops
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }
}

// Build method - only available once the key is set
impl ClientBuilder<HasKey> {
    /// Build the client
    ///
    /// Must be called from within a tokio runtime; timers, auth requests and
    /// the bundled transport run on it.
    pub fn build(self) -> Result<ChannelsClient> {
        let key = self
            .key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ChannelsError::Configuration("app key must not be empty".to_string()))?;
        self.options.validate()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChannelsError::NoRuntime(e.to_string()))?;

        let (transport, events) = match self.transport {
            Some(transport) => (transport, None),
            None => {
                let (event_tx, event_rx) = crossbeam_channel::unbounded();
                let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::new(
                    self.options.socket_url(&key),
                    event_tx,
                    runtime.clone(),
                ));
                (transport, Some(event_rx))
            }
        };

        let engine = ConnectionEngine::new(EngineParts {
            key,
            options: self.options,
            runtime,
            transport,
            http: self
                .http
                .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new())),
            crypto: self.crypto.unwrap_or_else(|| Arc::new(RustCrypto)),
            user_data: self.user_data,
            delegate: self.delegate.unwrap_or_else(|| Arc::new(NoDelegate)),
            strategy: self.reconnect_strategy,
        });

        ChannelsClient::new(engine, events)
    }
}
