use crate::core::event::PusherAuth;
use crate::traits::http::HttpRequest;
use async_trait::async_trait;
use serde_json::Value;

/// Host-supplied source of subscription credentials
///
/// Returning `None` fails the subscription with an invalid-auth-response error.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn fetch_auth_value(&self, socket_id: &str, channel_name: &str) -> Option<PusherAuth>;
}

/// Builds the HTTP request sent to an auth endpoint
///
/// Closures of the form `Fn(&str, &str) -> Option<HttpRequest>` implement this trait.
pub trait AuthRequestBuilder: Send + Sync {
    /// # Arguments
    /// * `socket_id` - Socket id of the current connection
    /// * `channel_name` - Channel being authorized
    ///
    /// # Returns
    /// * `None` if the request cannot be built
    fn request_for(&self, socket_id: &str, channel_name: &str) -> Option<HttpRequest>;
}

impl<F> AuthRequestBuilder for F
where
    F: Fn(&str, &str) -> Option<HttpRequest> + Send + Sync,
{
    fn request_for(&self, socket_id: &str, channel_name: &str) -> Option<HttpRequest> {
        self(socket_id, channel_name)
    }
}

/// Presence identity used when signing presence subscriptions with an inline secret
#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    pub user_id: String,
    pub user_info: Option<Value>,
}

impl UserData {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_info: None,
        }
    }

    pub fn with_info(mut self, user_info: Value) -> Self {
        self.user_info = Some(user_info);
        self
    }
}

/// Supplies the local member's presence identity
pub trait UserDataFetcher: Send + Sync {
    fn fetch_user_data(&self) -> UserData;
}

impl<F> UserDataFetcher for F
where
    F: Fn() -> UserData + Send + Sync,
{
    fn fetch_user_data(&self) -> UserData {
        self()
    }
}
