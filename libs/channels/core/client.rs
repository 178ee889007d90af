use crate::core::channel::Channel;
use crate::core::connection_state::ConnectionState;
use crate::core::engine::{ConnectionEngine, SubscribeOptions};
use crate::core::event::Event;
use crate::core::key_provider::KeyProvider;
use crate::core::options::ClientOptions;
use crate::traits::delegate::ChannelsDelegate;
use crate::traits::error::{ChannelsError, Result};
use crate::traits::transport::TransportEvent;
use crossbeam_channel::Receiver;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Client for the Channels pub/sub service
///
/// Created with [`crate::builder()`]. One client owns one logical connection;
/// channels obtained from it stay valid across reconnects and are resubscribed
/// automatically.
///
/// Events are delivered on background threads: frames without a channel on
/// the transport pump, channel frames on the decode worker. Callbacks may call
/// back into the client.
pub struct ChannelsClient {
    engine: Arc<ConnectionEngine>,
}

impl ChannelsClient {
    /// Wrap an engine, pumping `events` into it when the bundled transport is used
    pub(crate) fn new(
        engine: Arc<ConnectionEngine>,
        events: Option<Receiver<TransportEvent>>,
    ) -> Result<Self> {
        if let Some(events) = events {
            spawn_pump(Arc::downgrade(&engine), events)?;
        }
        Ok(Self { engine })
    }

    /// Open the connection
    ///
    /// Progress is reported through the delegate's state changes. Channels
    /// subscribed before connecting are subscribed once the connection is up.
    pub fn connect(&self) {
        self.engine.connect();
    }

    /// Close the connection and stop reconnecting
    pub fn disconnect(&self) {
        self.engine.disconnect();
    }

    /// Subscribe to a channel
    ///
    /// Returns the existing channel if already subscribed or subscribing.
    pub fn subscribe(&self, channel_name: &str) -> Arc<Channel> {
        self.engine.subscribe(channel_name, SubscribeOptions::default())
    }

    /// Subscribe with explicit auth or presence/count callbacks
    pub fn subscribe_with(&self, channel_name: &str, options: SubscribeOptions) -> Arc<Channel> {
        self.engine.subscribe(channel_name, options)
    }

    pub fn unsubscribe(&self, channel_name: &str) {
        self.engine.unsubscribe(channel_name);
    }

    pub fn unsubscribe_all(&self) {
        self.engine.unsubscribe_all();
    }

    /// Bind a callback to every event on every channel
    ///
    /// # Returns
    /// * Callback id for [`ChannelsClient::unbind`]
    pub fn bind(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> String {
        self.engine.bind(callback)
    }

    pub fn unbind(&self, callback_id: &str) -> bool {
        self.engine.unbind(callback_id)
    }

    pub fn unbind_all(&self) {
        self.engine.unbind_all();
    }

    /// Look up a channel by name
    pub fn channel(&self, channel_name: &str) -> Option<Arc<Channel>> {
        self.engine.channel(channel_name)
    }

    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.engine.channels()
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.engine.connection_state()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn socket_id(&self) -> Option<String> {
        self.engine.socket_id()
    }

    /// Reconnect attempts since the last established connection
    pub fn reconnect_attempts(&self) -> usize {
        self.engine.reconnect_attempts()
    }

    /// Decryption keys of encrypted channels
    ///
    /// Hosts may set keys directly instead of relying on the auth response.
    pub fn key_provider(&self) -> Arc<KeyProvider> {
        self.engine.key_provider()
    }

    pub fn key(&self) -> &str {
        self.engine.key()
    }

    pub fn options(&self) -> &ClientOptions {
        self.engine.options()
    }

    pub fn set_delegate(&self, delegate: Arc<dyn ChannelsDelegate>) {
        self.engine.set_delegate(delegate);
    }

    /// Report network reachability changes from the host platform
    pub fn set_network_reachable(&self, reachable: bool) {
        self.engine.set_network_reachable(reachable);
    }

    /// Feed an event from a custom transport
    pub fn handle_transport_event(&self, event: TransportEvent) {
        self.engine.handle_transport_event(event);
    }
}

impl std::fmt::Debug for ChannelsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelsClient")
            .field("engine", &self.engine)
            .finish()
    }
}

/// Dedicated thread moving transport events into the engine
///
/// Exits when the transport is dropped or the engine is gone.
fn spawn_pump(engine: Weak<ConnectionEngine>, events: Receiver<TransportEvent>) -> Result<()> {
    std::thread::Builder::new()
        .name("channels-transport".to_string())
        .spawn(move || {
            while let Ok(event) = events.recv() {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.handle_transport_event(event);
            }
            debug!("Transport event pump exiting");
        })
        .map_err(|e| ChannelsError::Configuration(format!("failed to spawn transport pump: {}", e)))?;
    Ok(())
}
