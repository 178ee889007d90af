//! Wire protocol constants and outbound frame encoding.

use crate::traits::error::Result;
use serde::Serialize;
use serde_json::Value;

/// Channels protocol revision spoken by this client
pub const PROTOCOL_VERSION: u8 = 7;

/// Client name reported in the connection URL
pub const CLIENT_NAME: &str = "channels-rust";

/// Library version reported in the connection URL
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod events {
    pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
    pub const ERROR: &str = "pusher:error";
    pub const SUBSCRIBE: &str = "pusher:subscribe";
    pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
    pub const SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher:subscription_succeeded";
    pub const PING: &str = "pusher:ping";
    pub const PONG: &str = "pusher:pong";

    pub const INTERNAL_SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
    pub const MEMBER_ADDED: &str = "pusher_internal:member_added";
    pub const MEMBER_REMOVED: &str = "pusher_internal:member_removed";
    pub const SUBSCRIPTION_COUNT: &str = "pusher_internal:subscription_count";
}

pub mod keys {
    pub const EVENT: &str = "event";
    pub const CHANNEL: &str = "channel";
    pub const DATA: &str = "data";
    pub const USER_ID: &str = "user_id";
    pub const USER_INFO: &str = "user_info";
    pub const SOCKET_ID: &str = "socket_id";
    pub const ACTIVITY_TIMEOUT: &str = "activity_timeout";
    pub const PRESENCE: &str = "presence";
    pub const HASH: &str = "hash";
    pub const MESSAGE: &str = "message";
    pub const CODE: &str = "code";
    pub const SUBSCRIPTION_COUNT: &str = "subscription_count";
}

pub mod prefixes {
    pub const PUSHER: &str = "pusher:";
    pub const PUSHER_INTERNAL: &str = "pusher_internal:";
    pub const CLIENT_EVENT: &str = "client-";
    pub const PRESENCE: &str = "presence-";
    pub const PRIVATE_ENCRYPTED: &str = "private-encrypted-";
    pub const PRIVATE: &str = "private-";
}

/// `pusher:` and `pusher_internal:` events, which are never encrypted
pub fn is_system_event(event_name: &str) -> bool {
    event_name.starts_with(prefixes::PUSHER) || event_name.starts_with(prefixes::PUSHER_INTERNAL)
}

/// Prefix `client-` unless already present
pub fn client_event_name(event_name: &str) -> String {
    if event_name.starts_with(prefixes::CLIENT_EVENT) {
        event_name.to_string()
    } else {
        format!("{}{}", prefixes::CLIENT_EVENT, event_name)
    }
}

#[derive(Debug, Serialize)]
struct Frame<'a, D: Serialize> {
    event: &'a str,
    data: D,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SubscribeData<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_data: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UnsubscribeData<'a> {
    channel: &'a str,
}

#[derive(Debug, Serialize)]
struct Empty {}

/// `pusher:subscribe` frame
pub fn subscribe_frame(
    channel: &str,
    auth: Option<&str>,
    channel_data: Option<&str>,
) -> Result<String> {
    let frame = Frame {
        event: events::SUBSCRIBE,
        data: SubscribeData {
            channel,
            auth,
            channel_data,
        },
        channel: None,
    };
    Ok(serde_json::to_string(&frame)?)
}

/// `pusher:unsubscribe` frame
pub fn unsubscribe_frame(channel: &str) -> Result<String> {
    let frame = Frame {
        event: events::UNSUBSCRIBE,
        data: UnsubscribeData { channel },
        channel: None,
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Client event frame; `event_name` must already carry the `client-` prefix
pub fn client_event_frame(event_name: &str, data: &Value, channel: &str) -> Result<String> {
    let frame = Frame {
        event: event_name,
        data,
        channel: Some(channel),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// `pusher:ping` or `pusher:pong` frame with an empty data object
pub fn control_frame(event_name: &str) -> Result<String> {
    let frame = Frame {
        event: event_name,
        data: Empty {},
        channel: None,
    };
    Ok(serde_json::to_string(&frame)?)
}
