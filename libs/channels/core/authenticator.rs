//! Subscription credentials under the configured [`AuthMethod`].
//!
//! Credentials that can be computed on the spot (explicit auth, inline secret)
//! come back as [`Authorization::Ready`]; endpoint, request-builder and
//! authorizer lookups come back as [`Authorization::Pending`] and are resolved
//! on the runtime with [`Authenticator::resolve`].

use crate::core::channel::Channel;
use crate::core::event::PusherAuth;
use crate::core::options::AuthMethod;
use crate::core::protocol::keys;
use crate::traits::authorizer::UserDataFetcher;
use crate::traits::crypto::Crypto;
use crate::traits::error::{AuthError, AuthErrorKind};
use crate::traits::http::{HttpClient, HttpRequest};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Outcome of starting an authorization
#[derive(Debug)]
pub enum Authorization {
    /// Credentials are known; `None` for channels that need none
    Ready(Option<PusherAuth>),
    /// Credentials must be fetched asynchronously
    Pending(PendingAuth),
    /// The subscribe attempt was not initiated and nothing will be reported
    Rejected(String),
    /// The attempt failed and the failure must be reported
    Failed(AuthError),
}

/// An auth lookup waiting to run
#[derive(Debug, Clone)]
pub enum PendingAuth {
    Http(HttpRequest),
    Delegated,
}

/// Computes or fetches subscription credentials
#[derive(Clone)]
pub struct Authenticator {
    key: String,
    method: AuthMethod,
    http: Arc<dyn HttpClient>,
    crypto: Arc<dyn Crypto>,
    user_data: Option<Arc<dyn UserDataFetcher>>,
}

impl Authenticator {
    pub fn new(
        key: impl Into<String>,
        method: AuthMethod,
        http: Arc<dyn HttpClient>,
        crypto: Arc<dyn Crypto>,
        user_data: Option<Arc<dyn UserDataFetcher>>,
    ) -> Self {
        Self {
            key: key.into(),
            method,
            http,
            crypto,
            user_data,
        }
    }

    /// Start authorizing a subscription
    ///
    /// # Arguments
    /// * `channel` - Channel being subscribed
    /// * `socket_id` - Current socket id, if connected
    /// * `explicit` - Credentials supplied by the caller, bypassing the auth method
    pub fn authorize(
        &self,
        channel: &Channel,
        socket_id: Option<&str>,
        explicit: Option<PusherAuth>,
    ) -> Authorization {
        if !channel.kind().requires_auth() {
            return Authorization::Ready(None);
        }

        if let Some(auth) = explicit {
            if channel.kind().is_presence() && auth.channel_data.is_none() {
                return Authorization::Rejected(format!(
                    "presence channel {} subscription attempted without channel data",
                    channel.name()
                ));
            }
            return Authorization::Ready(Some(auth));
        }

        let Some(socket_id) = socket_id else {
            return Authorization::Failed(AuthError::new(
                AuthErrorKind::NotConnected,
                "socket id not found, the client may not be connected",
            ));
        };

        self.prepare(channel.name(), channel.kind().is_presence(), socket_id)
    }

    fn prepare(&self, channel_name: &str, is_presence: bool, socket_id: &str) -> Authorization {
        match &self.method {
            AuthMethod::None => Authorization::Failed(AuthError::new(
                AuthErrorKind::NoMethod,
                "authentication method required for private, presence and encrypted channels but none provided",
            )),
            AuthMethod::Endpoint(url) => Authorization::Pending(PendingAuth::Http(
                endpoint_request(url, socket_id, channel_name),
            )),
            AuthMethod::RequestBuilder(builder) => match builder.request_for(socket_id, channel_name) {
                Some(request) => Authorization::Pending(PendingAuth::Http(request)),
                None => Authorization::Failed(AuthError::new(
                    AuthErrorKind::CouldNotBuildRequest,
                    "authentication request could not be built",
                )),
            },
            AuthMethod::Authorizer(_) => Authorization::Pending(PendingAuth::Delegated),
            AuthMethod::InlineSecret(secret) => {
                match self.inline_auth(secret, socket_id, channel_name, is_presence) {
                    Ok(auth) => Authorization::Ready(Some(auth)),
                    Err(e) => Authorization::Failed(e),
                }
            }
        }
    }

    /// Run a pending lookup
    pub async fn resolve(
        &self,
        pending: PendingAuth,
        socket_id: &str,
        channel_name: &str,
    ) -> Result<PusherAuth, AuthError> {
        match pending {
            PendingAuth::Http(request) => self.send_auth_request(request).await,
            PendingAuth::Delegated => {
                let AuthMethod::Authorizer(authorizer) = &self.method else {
                    return Err(AuthError::new(
                        AuthErrorKind::NoMethod,
                        "no authorizer configured",
                    ));
                };
                authorizer
                    .fetch_auth_value(socket_id, channel_name)
                    .await
                    .ok_or_else(|| {
                        debug!("Authorizer returned no auth for {}", channel_name);
                        AuthError::new(
                            AuthErrorKind::InvalidAuthResponse,
                            "authorizer returned no auth value",
                        )
                    })
            }
        }
    }

    /// Fetch credentials for a channel regardless of how they are obtained
    ///
    /// Used to refresh the decryption key of an encrypted channel.
    pub async fn fetch_auth(
        &self,
        socket_id: &str,
        channel_name: &str,
        is_presence: bool,
    ) -> Result<PusherAuth, AuthError> {
        match self.prepare(channel_name, is_presence, socket_id) {
            Authorization::Ready(Some(auth)) => Ok(auth),
            Authorization::Ready(None) => Err(AuthError::new(
                AuthErrorKind::InvalidAuthResponse,
                "no credentials produced",
            )),
            Authorization::Pending(pending) => self.resolve(pending, socket_id, channel_name).await,
            Authorization::Rejected(reason) => {
                Err(AuthError::new(AuthErrorKind::InvalidAuthResponse, reason))
            }
            Authorization::Failed(e) => Err(e),
        }
    }

    async fn send_auth_request(&self, request: HttpRequest) -> Result<PusherAuth, AuthError> {
        debug!("Requesting auth from {}", request.url);

        let response = self.http.execute(request).await.map_err(|e| {
            AuthError::new(AuthErrorKind::RequestFailure, format!("auth request failed: {}", e))
        })?;

        if response.status != 200 && response.status != 201 {
            return Err(AuthError::new(
                AuthErrorKind::InvalidAuthResponse,
                format!("auth endpoint responded with status {}", response.status),
            )
            .with_response(Some(response.status), Some(response.body)));
        }

        serde_json::from_str::<PusherAuth>(&response.body).map_err(|e| {
            AuthError::new(
                AuthErrorKind::InvalidAuthResponse,
                format!("unable to parse auth response: {}", e),
            )
            .with_response(Some(response.status), Some(response.body.clone()))
        })
    }

    fn inline_auth(
        &self,
        secret: &str,
        socket_id: &str,
        channel_name: &str,
        is_presence: bool,
    ) -> Result<PusherAuth, AuthError> {
        let channel_data = is_presence.then(|| self.user_data_json(socket_id));

        let message = match &channel_data {
            Some(data) => format!("{}:{}:{}", socket_id, channel_name, data),
            None => format!("{}:{}", socket_id, channel_name),
        };

        let signature = self
            .crypto
            .hmac_sha256(secret.as_bytes(), message.as_bytes())
            .map_err(|e| AuthError::new(AuthErrorKind::InvalidAuthResponse, e.to_string()))?;

        let auth = PusherAuth::new(format!("{}:{}", self.key, hex::encode(signature)));
        Ok(match channel_data {
            Some(data) => auth.with_channel_data(data),
            None => auth,
        })
    }

    /// Presence `channel_data`: the configured user data, or the socket id as user id
    fn user_data_json(&self, socket_id: &str) -> String {
        let mut object = Map::new();
        match &self.user_data {
            Some(fetcher) => {
                let user = fetcher.fetch_user_data();
                object.insert(keys::USER_ID.to_string(), Value::String(user.user_id));
                if let Some(info) = user.user_info {
                    object.insert(keys::USER_INFO.to_string(), info);
                }
            }
            None => {
                object.insert(keys::USER_ID.to_string(), Value::String(socket_id.to_string()));
            }
        }
        Value::Object(object).to_string()
    }
}

/// Form-encoded auth endpoint request
pub fn endpoint_request(url: &str, socket_id: &str, channel_name: &str) -> HttpRequest {
    let body = format!(
        "socket_id={}&channel_name={}",
        urlencoding::encode(socket_id),
        urlencoding::encode(channel_name)
    );
    HttpRequest::post_form(url, body)
}
