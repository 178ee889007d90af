use crate::core::connection_state::ConnectionState;
use crate::core::event::ProtocolError;
use crate::traits::error::AuthError;

/// Host application hooks
///
/// Every method has an empty default so implementors only override what they need.
/// Methods are always invoked with no client lock held, so it is safe to call
/// back into the client from inside them.
pub trait ChannelsDelegate: Send + Sync {
    /// Every connection state transition, exactly once
    fn changed_connection_state(&self, _old: ConnectionState, _new: ConnectionState) {}

    /// The server acknowledged a subscription
    fn subscribed_to_channel(&self, _name: &str) {}

    /// A subscription could not be authorized
    ///
    /// # Arguments
    /// * `name` - Channel name
    /// * `status` - HTTP status of the auth response, if a request was made
    /// * `body` - Raw body of the auth response, if any
    /// * `error` - Structured failure reason
    fn failed_to_subscribe_to_channel(
        &self,
        _name: &str,
        _status: Option<u16>,
        _body: Option<&str>,
        _error: &AuthError,
    ) {
    }

    /// The server sent `pusher:error`
    fn received_error(&self, _error: &ProtocolError) {}

    /// An encrypted event could not be decrypted even after reloading the key
    fn failed_to_decrypt_event(&self, _event_name: &str, _channel_name: &str, _data: Option<&str>) {}

    fn debug_log(&self, _message: &str) {}
}

/// Delegate that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelegate;

impl ChannelsDelegate for NoDelegate {}
