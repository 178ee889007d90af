//! Structured events and the auth/error payloads that travel with them.

use crate::core::protocol::keys;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded protocol event
///
/// Immutable once built. `data` is always a string: object payloads are kept in
/// their serialized form and encrypted payloads are replaced by their plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_name: String,
    channel_name: Option<String>,
    data: Option<String>,
    user_id: Option<String>,
    raw: Map<String, Value>,
}

impl Event {
    pub(crate) fn new(
        event_name: String,
        channel_name: Option<String>,
        data: Option<String>,
        user_id: Option<String>,
        raw: Map<String, Value>,
    ) -> Self {
        Self {
            event_name,
            channel_name,
            data,
            user_id,
            raw,
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.channel_name.as_deref()
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Id of the member that triggered a client event on a presence channel
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The frame as received, before decryption
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Look up a top-level property of the raw frame
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Parse `data` as JSON
    ///
    /// # Returns
    /// * `None` if there is no data or it is not valid JSON
    pub fn data_json(&self) -> Option<Value> {
        self.data
            .as_deref()
            .and_then(|data| serde_json::from_str(data).ok())
    }

    /// Copy of this event under a different name
    ///
    /// The raw frame's `event` field is renamed as well.
    pub fn with_event_name(&self, event_name: &str) -> Event {
        let mut raw = self.raw.clone();
        raw.insert(keys::EVENT.to_string(), Value::String(event_name.to_string()));

        Event {
            event_name: event_name.to_string(),
            channel_name: self.channel_name.clone(),
            data: self.data.clone(),
            user_id: self.user_id.clone(),
            raw,
        }
    }
}

/// Subscription credentials
///
/// `channel_data` is required for presence channels. `shared_secret` is the
/// base64 decryption key handed out for `private-encrypted-` channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PusherAuth {
    pub auth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

impl PusherAuth {
    pub fn new(auth: impl Into<String>) -> Self {
        Self {
            auth: auth.into(),
            channel_data: None,
            shared_secret: None,
        }
    }

    pub fn with_channel_data(mut self, channel_data: impl Into<String>) -> Self {
        self.channel_data = Some(channel_data.into());
        self
    }

    pub fn with_shared_secret(mut self, shared_secret: impl Into<String>) -> Self {
        self.shared_secret = Some(shared_secret.into());
        self
    }
}

/// A `pusher:error` frame sent by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    pub code: Option<i64>,
    pub message: String,
    pub raw: Map<String, Value>,
}

impl ProtocolError {
    /// Build from a raw `pusher:error` frame
    ///
    /// `data` may be an object or a string holding one; `message` is required.
    pub fn from_payload(payload: &Map<String, Value>) -> Option<Self> {
        let data = match payload.get(keys::DATA)? {
            Value::String(text) => serde_json::from_str::<Value>(text).ok()?,
            other => other.clone(),
        };

        let message = data.get(keys::MESSAGE)?.as_str()?.to_string();
        let code = data.get(keys::CODE).and_then(Value::as_i64);

        Some(Self {
            code,
            message,
            raw: payload.clone(),
        })
    }
}
