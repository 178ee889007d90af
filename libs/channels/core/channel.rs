use crate::core::event::{Event, PusherAuth};
use crate::core::handlers::HandlerTable;
use crate::core::presence::PresenceRoster;
use crate::core::protocol::{client_event_frame, client_event_name, prefixes};
use crate::traits::transport::Transport;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Channel kind, derived purely from the channel name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Normal,
    Private,
    Presence,
    PrivateEncrypted,
}

impl ChannelKind {
    pub fn from_name(name: &str) -> Self {
        if name.starts_with(prefixes::PRESENCE) {
            ChannelKind::Presence
        } else if name.starts_with(prefixes::PRIVATE_ENCRYPTED) {
            ChannelKind::PrivateEncrypted
        } else if name.starts_with(prefixes::PRIVATE) {
            ChannelKind::Private
        } else {
            ChannelKind::Normal
        }
    }

    #[inline]
    pub fn requires_auth(&self) -> bool {
        !matches!(self, ChannelKind::Normal)
    }

    #[inline]
    pub fn can_send_client_events(&self) -> bool {
        matches!(self, ChannelKind::Private | ChannelKind::Presence)
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        matches!(self, ChannelKind::PrivateEncrypted)
    }

    #[inline]
    pub fn is_presence(&self) -> bool {
        matches!(self, ChannelKind::Presence)
    }
}

/// Callback invoked with the latest subscription count
pub type CountCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Client event triggered before the subscription was acknowledged
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingClientEvent {
    pub name: String,
    pub data: Value,
}

#[derive(Default)]
struct ChannelState {
    subscribed: bool,
    /// A subscribe attempt is in flight on the current connection
    authorizing: bool,
    handlers: HandlerTable,
    auth: Option<PusherAuth>,
    unsent: Vec<PendingClientEvent>,
    subscription_count: Option<u64>,
    on_count_changed: Option<CountCallback>,
}

/// A subscribed or pending channel
///
/// Obtained from [`ChannelsClient::subscribe`](crate::core::client::ChannelsClient::subscribe).
/// Presence channels also carry a [`PresenceRoster`].
pub struct Channel {
    name: String,
    kind: ChannelKind,
    transport: Arc<dyn Transport>,
    state: Mutex<ChannelState>,
    presence: Option<PresenceRoster>,
}

impl Channel {
    pub(crate) fn new(name: &str, auth: Option<PusherAuth>, transport: Arc<dyn Transport>) -> Self {
        let kind = ChannelKind::from_name(name);
        Self {
            name: name.to_string(),
            kind,
            transport,
            state: Mutex::new(ChannelState {
                auth,
                ..Default::default()
            }),
            presence: kind.is_presence().then(PresenceRoster::new),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// True once the server has acknowledged the subscription
    pub fn is_subscribed(&self) -> bool {
        self.state.lock().subscribed
    }

    /// Membership of a presence channel; `None` for other kinds
    pub fn presence(&self) -> Option<&PresenceRoster> {
        self.presence.as_ref()
    }

    /// Bind a callback to an event name on this channel
    ///
    /// # Returns
    /// * Callback id for [`Channel::unbind`]
    pub fn bind(&self, event_name: &str, callback: impl Fn(&Event) + Send + Sync + 'static) -> String {
        self.state.lock().handlers.bind(event_name, Arc::new(callback))
    }

    pub fn unbind(&self, event_name: &str, callback_id: &str) -> bool {
        self.state.lock().handlers.unbind(event_name, callback_id)
    }

    pub fn unbind_all(&self) {
        self.state.lock().handlers.unbind_all();
    }

    pub fn unbind_all_for(&self, event_name: &str) {
        self.state.lock().handlers.unbind_event(event_name);
    }

    /// Trigger a client event
    ///
    /// Sent immediately when subscribed, otherwise buffered until the
    /// subscription is acknowledged. Only private and presence channels accept
    /// client events; on other kinds this logs a warning and does nothing.
    /// The `client-` prefix is added when missing.
    pub fn trigger(&self, event_name: &str, data: Value) {
        if !self.kind.can_send_client_events() {
            warn!(
                "Client events are only supported on private and presence channels, not sending {} on {}",
                event_name, self.name
            );
            return;
        }

        let pending = PendingClientEvent {
            name: client_event_name(event_name),
            data,
        };

        {
            let mut state = self.state.lock();
            if !state.subscribed {
                debug!("Buffering {} until {} is subscribed", pending.name, self.name);
                state.unsent.push(pending);
                return;
            }
        }

        self.send_client_event(&pending);
    }

    /// Number of client events waiting for the subscription
    pub fn pending_client_events(&self) -> usize {
        self.state.lock().unsent.len()
    }

    /// Latest count reported by the server, if the app has counts enabled
    pub fn subscription_count(&self) -> Option<u64> {
        self.state.lock().subscription_count
    }

    pub fn on_subscription_count_changed(&self, callback: impl Fn(u64) + Send + Sync + 'static) {
        self.state.lock().on_count_changed = Some(Arc::new(callback));
    }

    pub(crate) fn set_count_callback(&self, callback: CountCallback) {
        self.state.lock().on_count_changed = Some(callback);
    }

    pub(crate) fn auth(&self) -> Option<PusherAuth> {
        self.state.lock().auth.clone()
    }

    /// Claim the subscribe attempt for this connection
    ///
    /// # Returns
    /// * `false` if the channel is already subscribed or being authorized
    pub(crate) fn begin_authorization(&self) -> bool {
        let mut state = self.state.lock();
        if state.subscribed || state.authorizing {
            return false;
        }
        state.authorizing = true;
        true
    }

    pub(crate) fn end_authorization(&self) {
        self.state.lock().authorizing = false;
    }

    pub(crate) fn set_unsubscribed(&self) {
        let mut state = self.state.lock();
        state.subscribed = false;
        state.authorizing = false;
    }

    /// Mark the channel subscribed and drop the one-shot auth
    ///
    /// # Returns
    /// * Buffered client events in send order, last triggered first
    pub(crate) fn mark_subscribed(&self) -> Vec<PendingClientEvent> {
        let mut state = self.state.lock();
        state.subscribed = true;
        state.authorizing = false;
        state.auth = None;

        let mut unsent = std::mem::take(&mut state.unsent);
        unsent.reverse();
        unsent
    }

    pub(crate) fn update_subscription_count(&self, count: u64) {
        let callback = {
            let mut state = self.state.lock();
            state.subscription_count = Some(count);
            state.on_count_changed.clone()
        };
        if let Some(callback) = callback {
            callback(count);
        }
    }

    pub(crate) fn send_client_event(&self, pending: &PendingClientEvent) {
        match client_event_frame(&pending.name, &pending.data, &self.name) {
            Ok(frame) => self.transport.send(frame),
            Err(e) => error!("Failed to encode client event {}: {}", pending.name, e),
        }
    }

    /// Run the channel callbacks bound to the event's name
    pub(crate) fn handle_event(&self, event: &Event) {
        let callbacks = self.state.lock().handlers.callbacks_for(event.event_name());
        for callback in callbacks {
            callback(event);
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
