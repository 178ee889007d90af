//! Connection state machine.
//!
//! The engine owns the transport, the channel registry and the decode queue.
//! Every state change happens under one lock; transport commands and
//! delegate notifications produced along the way are collected as effects and
//! carried out after the lock is released, in the order they were produced.

use crate::core::authenticator::{Authenticator, Authorization, PendingAuth};
use crate::core::channel::{Channel, CountCallback};
use crate::core::codec::{data_string, EventCodec};
use crate::core::connection_state::ConnectionState;
use crate::core::event::{Event, ProtocolError, PusherAuth};
use crate::core::event_queue::{EventQueue, EventQueueDelegate};
use crate::core::handlers::GlobalHandlers;
use crate::core::key_provider::KeyProvider;
use crate::core::options::ClientOptions;
use crate::core::presence::{MemberCallback, PresenceMember};
use crate::core::protocol::{
    control_frame, events, keys, subscribe_frame, unsubscribe_frame,
};
use crate::core::registry::ChannelRegistry;
use crate::core::timers::{TimerKind, Timers};
use crate::traits::authorizer::UserDataFetcher;
use crate::traits::crypto::Crypto;
use crate::traits::delegate::ChannelsDelegate;
use crate::traits::error::{AuthError, AuthErrorKind, Result};
use crate::traits::http::HttpClient;
use crate::traits::reconnect::{
    is_protocol_close_code, CloseCodeAction, QuadraticBackoff, ReconnectionStrategy,
};
use crate::traits::transport::{Transport, TransportEvent, NORMAL_CLOSURE};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Activity timeout used until the server announces one
const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Extras for a single subscribe call
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    pub auth: Option<PusherAuth>,
    pub on_member_added: Option<MemberCallback>,
    pub on_member_removed: Option<MemberCallback>,
    pub on_subscription_count: Option<CountCallback>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use these credentials instead of the configured auth method
    pub fn with_auth(mut self, auth: PusherAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn on_member_added(
        mut self,
        callback: impl Fn(&PresenceMember) + Send + Sync + 'static,
    ) -> Self {
        self.on_member_added = Some(Arc::new(callback));
        self
    }

    pub fn on_member_removed(
        mut self,
        callback: impl Fn(&PresenceMember) + Send + Sync + 'static,
    ) -> Self {
        self.on_member_removed = Some(Arc::new(callback));
        self
    }

    pub fn on_subscription_count(mut self, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_subscription_count = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("auth", &self.auth)
            .field("on_member_added", &self.on_member_added.is_some())
            .field("on_member_removed", &self.on_member_removed.is_some())
            .field("on_subscription_count", &self.on_subscription_count.is_some())
            .finish()
    }
}

/// Work deferred until the state lock is released
enum Effect {
    Connect,
    Disconnect(u16),
    Send(String),
    Ping,
    StateChanged(ConnectionState, ConnectionState),
    Log(String),
    /// Run the auth method for a channel claimed under the lock
    Authorize {
        channel: Arc<Channel>,
        socket_id: Option<String>,
    },
    SubscribeFailed { channel: String, error: AuthError },
    ServerError(ProtocolError),
}

struct EngineState {
    connection_state: ConnectionState,
    socket_id: Option<String>,
    /// Transport reported the socket open
    socket_connected: bool,
    /// `pusher:connection_established` received on this socket
    established: bool,
    intentional_disconnect: bool,
    reconnect_attempts: usize,
    server_activity_timeout: Option<Duration>,
    monitoring_reachability: bool,
    network_reachable: bool,
    timers: Timers,
    strategy: Box<dyn ReconnectionStrategy>,
}

/// Everything the engine is assembled from
pub(crate) struct EngineParts {
    pub key: String,
    pub options: ClientOptions,
    pub runtime: Handle,
    pub transport: Arc<dyn Transport>,
    pub http: Arc<dyn HttpClient>,
    pub crypto: Arc<dyn Crypto>,
    pub user_data: Option<Arc<dyn UserDataFetcher>>,
    pub delegate: Arc<dyn ChannelsDelegate>,
    pub strategy: Option<Box<dyn ReconnectionStrategy>>,
}

/// Drives one logical connection to the Channels service
pub struct ConnectionEngine {
    weak_self: Weak<ConnectionEngine>,
    key: String,
    options: ClientOptions,
    runtime: Handle,
    transport: Arc<dyn Transport>,
    registry: ChannelRegistry,
    keys: Arc<KeyProvider>,
    authenticator: Authenticator,
    queue: EventQueue,
    global: GlobalHandlers,
    delegate: RwLock<Arc<dyn ChannelsDelegate>>,
    state: Mutex<EngineState>,
}

impl ConnectionEngine {
    pub(crate) fn new(parts: EngineParts) -> Arc<Self> {
        let EngineParts {
            key,
            options,
            runtime,
            transport,
            http,
            crypto,
            user_data,
            delegate,
            strategy,
        } = parts;

        let strategy: Box<dyn ReconnectionStrategy> = match strategy {
            Some(strategy) => strategy,
            None => Box::new(QuadraticBackoff::new(options.max_reconnect_gap)),
        };
        let keys = Arc::new(KeyProvider::new());
        let registry = ChannelRegistry::new(Arc::clone(&transport));
        let authenticator = Authenticator::new(
            key.clone(),
            options.auth_method.clone(),
            http,
            Arc::clone(&crypto),
            user_data,
        );

        Arc::new_cyclic(|weak: &Weak<ConnectionEngine>| {
            let queue_delegate: Weak<dyn EventQueueDelegate> = weak.clone();
            let queue = EventQueue::new(EventCodec::new(crypto), Arc::clone(&keys), queue_delegate);

            Self {
                weak_self: weak.clone(),
                key,
                options,
                runtime,
                transport,
                registry,
                keys,
                authenticator,
                queue,
                global: GlobalHandlers::new(),
                delegate: RwLock::new(delegate),
                state: Mutex::new(EngineState {
                    connection_state: ConnectionState::Disconnected,
                    socket_id: None,
                    socket_connected: false,
                    established: false,
                    intentional_disconnect: false,
                    reconnect_attempts: 0,
                    server_activity_timeout: None,
                    monitoring_reachability: false,
                    network_reachable: true,
                    timers: Timers::default(),
                    strategy,
                }),
            }
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection_state
    }

    /// Socket id assigned by the server for the current connection
    pub fn socket_id(&self) -> Option<String> {
        self.state.lock().socket_id.clone()
    }

    /// Reconnect attempts scheduled since the last established connection
    pub fn reconnect_attempts(&self) -> usize {
        self.state.lock().reconnect_attempts
    }

    pub fn key_provider(&self) -> Arc<KeyProvider> {
        Arc::clone(&self.keys)
    }

    pub fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.registry.find(name)
    }

    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.registry.all()
    }

    pub fn set_delegate(&self, delegate: Arc<dyn ChannelsDelegate>) {
        *self.delegate.write() = delegate;
    }

    fn delegate(&self) -> Arc<dyn ChannelsDelegate> {
        Arc::clone(&self.delegate.read())
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Open the connection; a no-op unless disconnected or reconnecting
    pub fn connect(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            self.begin_connect(&mut state, &mut effects);
        }
        self.apply(effects);
    }

    fn begin_connect(&self, state: &mut EngineState, effects: &mut Vec<Effect>) {
        match state.connection_state {
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Disconnecting => {
                debug!("Connect ignored, already {}", state.connection_state);
                return;
            }
        }

        state.intentional_disconnect = false;
        state.monitoring_reachability = self.options.monitor_reachability;
        state.timers.cancel(TimerKind::Reconnect);
        set_state(state, ConnectionState::Connecting, effects);
        effects.push(Effect::Connect);
    }

    /// Close the connection and stop reconnecting
    ///
    /// An open or opening socket goes through `Disconnecting` until the
    /// transport reports the close; a pending reconnect is cancelled straight
    /// to `Disconnected`.
    pub fn disconnect(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            match state.connection_state {
                ConnectionState::Connected | ConnectionState::Connecting => {
                    state.intentional_disconnect = true;
                    state.monitoring_reachability = false;
                    state.timers.cancel_all();
                    set_state(&mut state, ConnectionState::Disconnecting, &mut effects);
                    effects.push(Effect::Disconnect(NORMAL_CLOSURE));
                }
                ConnectionState::Reconnecting => {
                    state.intentional_disconnect = true;
                    state.monitoring_reachability = false;
                    state.timers.cancel_all();
                    set_state(&mut state, ConnectionState::Disconnected, &mut effects);
                }
                ConnectionState::Disconnecting | ConnectionState::Disconnected => {
                    debug!("Disconnect ignored, already {}", state.connection_state);
                }
            }
        }
        self.apply(effects);
    }

    /// Feed a transport event into the state machine
    pub fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_socket_opened(),
            TransportEvent::Closed { code, reason } => self.on_connection_lost(code, reason),
            TransportEvent::Error(message) => {
                error!("Transport error: {}", message);
                self.on_connection_lost(None, Some(message));
            }
            TransportEvent::Text(text) => self.on_text(&text),
            TransportEvent::Pong => {
                debug!("Pong received");
                let mut state = self.state.lock();
                self.restart_activity_timer(&mut state);
            }
            TransportEvent::ReconnectSuggested(true) => self.drop_connection("reconnect suggested"),
            TransportEvent::ReconnectSuggested(false) => {}
        }
    }

    /// Report network reachability changes
    ///
    /// Ignored unless reachability monitoring is enabled and the client has
    /// been asked to connect. Losing the network drops the socket; regaining
    /// it reconnects right away if a reconnect is pending.
    pub fn set_network_reachable(&self, reachable: bool) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.monitoring_reachability || state.network_reachable == reachable {
                return;
            }
            state.network_reachable = reachable;

            if reachable {
                note(&mut effects, "Network reachable".to_string());
                if state.connection_state == ConnectionState::Reconnecting {
                    self.begin_connect(&mut state, &mut effects);
                }
            } else {
                note(&mut effects, "Network unreachable".to_string());
                if matches!(
                    state.connection_state,
                    ConnectionState::Connected | ConnectionState::Connecting
                ) {
                    effects.push(Effect::Disconnect(NORMAL_CLOSURE));
                }
            }
        }
        self.apply(effects);
    }

    fn drop_connection(&self, reason: &str) {
        let mut effects = Vec::new();
        {
            let state = self.state.lock();
            if !matches!(
                state.connection_state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                return;
            }
            note(&mut effects, format!("Dropping connection: {}", reason));
            effects.push(Effect::Disconnect(NORMAL_CLOSURE));
        }
        self.apply(effects);
    }

    fn on_socket_opened(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if state.connection_state != ConnectionState::Connecting {
                debug!("Ignoring socket open while {}", state.connection_state);
                return;
            }
            info!("Socket opened");
            state.socket_connected = true;
            self.restart_activity_timer(&mut state);
            self.try_enter_connected(&mut state, &mut effects);
        }
        self.apply(effects);
    }

    fn on_connection_established(&self, event: &Event) {
        let Some(data) = event.data_json() else {
            warn!("connection_established without data");
            return;
        };
        let Some(socket_id) = data.get(keys::SOCKET_ID).and_then(Value::as_str) else {
            warn!("connection_established without socket id");
            return;
        };

        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if state.connection_state != ConnectionState::Connecting {
                debug!("Ignoring connection_established while {}", state.connection_state);
                return;
            }

            state.socket_id = Some(socket_id.to_string());
            state.established = true;
            state.reconnect_attempts = 0;
            state.timers.cancel(TimerKind::Reconnect);

            if let Some(secs) = data
                .get(keys::ACTIVITY_TIMEOUT)
                .and_then(Value::as_f64)
                .filter(|secs| *secs > 0.0)
            {
                state.server_activity_timeout = Some(Duration::from_secs_f64(secs));
            }

            note(
                &mut effects,
                format!("Socket established with socket ID: {}", socket_id),
            );
            self.try_enter_connected(&mut state, &mut effects);
        }
        self.apply(effects);
    }

    /// Enter `Connected` once the socket is open and the server has greeted us,
    /// then subscribe every channel that is not subscribed yet
    fn try_enter_connected(&self, state: &mut EngineState, effects: &mut Vec<Effect>) {
        if !(state.socket_connected && state.established)
            || state.intentional_disconnect
            || state.connection_state == ConnectionState::Connected
        {
            return;
        }

        set_state(state, ConnectionState::Connected, effects);
        self.restart_activity_timer(state);

        let socket_id = state.socket_id.clone();
        for channel in self.registry.all() {
            queue_authorization(&channel, socket_id.as_deref(), effects);
        }
    }

    /// The closed path, shared by closes, errors and lost pongs
    fn on_connection_lost(&self, code: Option<u16>, reason: Option<String>) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if matches!(
                state.connection_state,
                ConnectionState::Disconnected | ConnectionState::Reconnecting
            ) {
                debug!("Ignoring close, connection already reset");
                return;
            }

            self.reset_connection(&mut state, &mut effects);

            info!(
                "Connection closed (code: {:?}, reason: {})",
                code,
                reason.as_deref().unwrap_or("none")
            );

            if state.intentional_disconnect {
                debug!("Disconnect was requested, not reconnecting");
            } else if !is_protocol_close_code(code) && !self.options.auto_reconnect {
                note(&mut effects, "Auto reconnect disabled".to_string());
            } else {
                self.attempt_reconnect(&mut state, code, &mut effects);
            }
        }
        self.apply(effects);
    }

    fn reset_connection(&self, state: &mut EngineState, effects: &mut Vec<Effect>) {
        for channel in self.registry.all() {
            channel.set_unsubscribed();
        }
        state.socket_connected = false;
        state.established = false;
        state.socket_id = None;
        state.timers.cancel(TimerKind::Activity);
        state.timers.cancel(TimerKind::PongTimeout);
        set_state(state, ConnectionState::Disconnected, effects);
    }

    fn attempt_reconnect(&self, state: &mut EngineState, code: Option<u16>, effects: &mut Vec<Effect>) {
        if state.connection_state == ConnectionState::Connected {
            return;
        }

        if let Some(max) = self.options.max_reconnect_attempts {
            if state.reconnect_attempts >= max {
                note(
                    effects,
                    format!("Max reconnect attempts ({}) reached, giving up", max),
                );
                return;
            }
        }

        let delay = match CloseCodeAction::for_code(code) {
            CloseCodeAction::DoNotReconnect => {
                note(
                    effects,
                    format!("Close code {:?} does not allow reconnecting", code),
                );
                return;
            }
            CloseCodeAction::ReconnectImmediately => Duration::ZERO,
            CloseCodeAction::ReconnectAfterBackoff => state.strategy.delay_for(state.reconnect_attempts),
        };

        set_state(state, ConnectionState::Reconnecting, effects);
        note(
            effects,
            format!(
                "Reconnecting in {:?} (attempt {})",
                delay,
                state.reconnect_attempts + 1
            ),
        );
        self.start_timer(state, TimerKind::Reconnect, delay);
        state.reconnect_attempts += 1;
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn start_timer(&self, state: &mut EngineState, kind: TimerKind, delay: Duration) {
        let weak = self.weak_self.clone();
        state.timers.start(&self.runtime, kind, delay, move |kind, generation| {
            if let Some(engine) = weak.upgrade() {
                engine.on_timer(kind, generation);
            }
        });
    }

    /// Restart the inactivity timer; any received frame or pong counts as activity
    fn restart_activity_timer(&self, state: &mut EngineState) {
        state.timers.cancel(TimerKind::PongTimeout);
        if !state.socket_connected {
            state.timers.cancel(TimerKind::Activity);
            return;
        }

        let timeout = self
            .options
            .activity_timeout
            .or(state.server_activity_timeout)
            .unwrap_or(DEFAULT_ACTIVITY_TIMEOUT);
        self.start_timer(state, TimerKind::Activity, timeout);
    }

    fn on_timer(&self, kind: TimerKind, generation: u64) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.timers.complete(kind, generation) {
                return;
            }

            match kind {
                TimerKind::Reconnect => {
                    if state.connection_state == ConnectionState::Reconnecting {
                        self.begin_connect(&mut state, &mut effects);
                    }
                }
                TimerKind::Activity => {
                    if state.socket_connected {
                        debug!("No activity, sending ping");
                        effects.push(Effect::Ping);
                        self.start_timer(&mut state, TimerKind::PongTimeout, self.options.pong_timeout);
                    }
                }
                TimerKind::PongTimeout => {
                    warn!("No pong within {:?}, closing connection", self.options.pong_timeout);
                    note(&mut effects, "Pong timeout".to_string());
                    state.timers.cancel(TimerKind::Activity);
                    effects.push(Effect::Disconnect(NORMAL_CLOSURE));
                }
            }
        }
        self.apply(effects);
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Get or create a channel and subscribe it if connected
    pub fn subscribe(&self, name: &str, options: SubscribeOptions) -> Arc<Channel> {
        let SubscribeOptions {
            auth,
            on_member_added,
            on_member_removed,
            on_subscription_count,
        } = options;

        let existed = self.registry.find(name).is_some();
        let channel = self.registry.add(name, auth);

        if let Some(roster) = channel.presence() {
            roster.set_callbacks(on_member_added, on_member_removed);
        }
        if let Some(callback) = on_subscription_count {
            channel.set_count_callback(callback);
        }

        if existed {
            debug!("Already subscribed or subscribing to {}", name);
            return channel;
        }

        let mut effects = Vec::new();
        {
            let state = self.state.lock();
            if state.connection_state == ConnectionState::Connected {
                queue_authorization(&channel, state.socket_id.as_deref(), &mut effects);
            }
        }
        self.apply(effects);
        channel
    }

    /// Leave a channel
    ///
    /// Sends `pusher:unsubscribe` if the server had acknowledged the
    /// subscription. The channel is forgotten either way.
    pub fn unsubscribe(&self, name: &str) {
        let Some(channel) = self.registry.remove(name) else {
            debug!("Unsubscribe from unknown channel {}", name);
            return;
        };

        let mut effects = Vec::new();
        if channel.is_subscribed() && self.connection_state() == ConnectionState::Connected {
            push_frame(&mut effects, unsubscribe_frame(name));
        }
        channel.set_unsubscribed();
        self.keys.clear(name);

        self.apply(effects);
    }

    pub fn unsubscribe_all(&self) {
        for channel in self.registry.all() {
            self.unsubscribe(channel.name());
        }
    }

    /// Start the subscribe attempt claimed by [`queue_authorization`]
    ///
    /// Request builders and user-data fetchers run here, so the state lock
    /// must not be held.
    fn authorize_channel(&self, channel: &Arc<Channel>, socket_id: Option<&str>) {
        let mut effects = Vec::new();
        match self.authenticator.authorize(channel, socket_id, channel.auth()) {
            Authorization::Ready(auth) => {
                let state = self.state.lock();
                if self.is_current(&state, channel, socket_id) {
                    self.complete_authorization(channel, auth, &mut effects);
                } else {
                    debug!("Dropping credentials for {} from a previous connection", channel.name());
                }
            }
            Authorization::Pending(pending) => match socket_id {
                Some(socket_id) => self.spawn_authorization(channel.name(), socket_id, pending),
                None => effects.push(Effect::SubscribeFailed {
                    channel: channel.name().to_string(),
                    error: AuthError::new(AuthErrorKind::NotConnected, "socket id not found"),
                }),
            },
            Authorization::Rejected(reason) => {
                channel.end_authorization();
                warn!("{}", reason);
                effects.push(Effect::Log(reason));
            }
            Authorization::Failed(error) => effects.push(Effect::SubscribeFailed {
                channel: channel.name().to_string(),
                error,
            }),
        }
        self.apply(effects);
    }

    /// Still connected on the socket the attempt started on, and the channel
    /// has not been unsubscribed (or replaced) since
    fn is_current(&self, state: &EngineState, channel: &Arc<Channel>, socket_id: Option<&str>) -> bool {
        state.connection_state == ConnectionState::Connected
            && state.socket_id.as_deref() == socket_id
            && self
                .registry
                .find(channel.name())
                .map_or(false, |current| Arc::ptr_eq(&current, channel))
    }

    fn spawn_authorization(&self, channel_name: &str, socket_id: &str, pending: PendingAuth) {
        let weak = self.weak_self.clone();
        let authenticator = self.authenticator.clone();
        let channel_name = channel_name.to_string();
        let socket_id = socket_id.to_string();

        self.runtime.spawn(async move {
            let result = authenticator.resolve(pending, &socket_id, &channel_name).await;
            if let Some(engine) = weak.upgrade() {
                engine.finish_authorization(&channel_name, &socket_id, result);
            }
        });
    }

    fn finish_authorization(
        &self,
        channel_name: &str,
        socket_id: &str,
        result: std::result::Result<PusherAuth, AuthError>,
    ) {
        let mut effects = Vec::new();
        {
            let state = self.state.lock();
            let Some(channel) = self.registry.find(channel_name) else {
                debug!("{} was unsubscribed while authorizing", channel_name);
                return;
            };
            if state.connection_state != ConnectionState::Connected
                || state.socket_id.as_deref() != Some(socket_id)
            {
                debug!("Discarding auth for {} from a previous connection", channel_name);
                return;
            }

            match result {
                Ok(auth) => self.complete_authorization(&channel, Some(auth), &mut effects),
                Err(error) => effects.push(Effect::SubscribeFailed {
                    channel: channel_name.to_string(),
                    error,
                }),
            }
        }
        self.apply(effects);
    }

    /// Send `pusher:subscribe` with the credentials in hand
    fn complete_authorization(&self, channel: &Channel, auth: Option<PusherAuth>, effects: &mut Vec<Effect>) {
        let Some(auth) = auth else {
            push_frame(effects, subscribe_frame(channel.name(), None, None));
            return;
        };

        if let Some(secret) = &auth.shared_secret {
            self.keys.set(channel.name(), secret.clone());
        }

        if let Some(roster) = channel.presence() {
            match &auth.channel_data {
                Some(channel_data) => roster.set_my_id_from_channel_data(channel_data),
                None => {
                    effects.push(Effect::SubscribeFailed {
                        channel: channel.name().to_string(),
                        error: AuthError::new(
                            AuthErrorKind::InvalidAuthResponse,
                            "presence channel auth is missing channel_data",
                        ),
                    });
                    return;
                }
            }
        }

        push_frame(
            effects,
            subscribe_frame(channel.name(), Some(&auth.auth), auth.channel_data.as_deref()),
        );
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Bind a callback that receives every event
    pub fn bind(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> String {
        self.global.bind(Arc::new(callback))
    }

    pub fn unbind(&self, callback_id: &str) -> bool {
        self.global.unbind(callback_id)
    }

    pub fn unbind_all(&self) {
        self.global.unbind_all();
    }

    fn on_text(&self, text: &str) {
        let payload = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(payload)) => payload,
            _ => {
                debug!("Unable to parse incoming frame: {}", text);
                return;
            }
        };

        {
            let mut state = self.state.lock();
            self.restart_activity_timer(&mut state);
        }

        let mut effects = Vec::new();
        match payload.get(keys::EVENT).and_then(Value::as_str) {
            Some(events::PING) => {
                debug!("Ping received, sending pong");
                push_frame(&mut effects, control_frame(events::PONG));
            }
            Some(events::PONG) => debug!("Pong received"),
            Some(events::ERROR) => match ProtocolError::from_payload(&payload) {
                Some(protocol_error) => {
                    warn!(
                        "Server error {:?}: {}",
                        protocol_error.code, protocol_error.message
                    );
                    effects.push(Effect::ServerError(protocol_error));
                }
                None => debug!("Unable to parse pusher:error frame: {}", text),
            },
            _ => {
                let channel_name = payload
                    .get(keys::CHANNEL)
                    .and_then(Value::as_str)
                    .map(str::to_string);

                if let Some(name) = &channel_name {
                    if self.registry.find(name).is_none() {
                        debug!("Dropping event for unknown channel {}", name);
                        return;
                    }
                }
                self.queue.report(payload, channel_name);
            }
        }
        self.apply(effects);
    }

    /// Route a decoded event to internal handling and callbacks
    fn dispatch(&self, event: Event) {
        match event.event_name() {
            events::CONNECTION_ESTABLISHED => self.on_connection_established(&event),
            events::INTERNAL_SUBSCRIPTION_SUCCEEDED => self.on_subscription_succeeded(&event),
            events::MEMBER_ADDED => {
                if let (Some(channel), Some(data)) = (self.presence_channel(&event), event.data_json()) {
                    if let Some(roster) = channel.presence() {
                        roster.add_member(&data);
                    }
                }
            }
            events::MEMBER_REMOVED => {
                if let (Some(channel), Some(data)) = (self.presence_channel(&event), event.data_json()) {
                    if let Some(roster) = channel.presence() {
                        roster.remove_member(&data);
                    }
                }
            }
            events::SUBSCRIPTION_COUNT => {
                let channel = event.channel_name().and_then(|name| self.registry.find(name));
                let count = event
                    .data_json()
                    .and_then(|data| data.get(keys::SUBSCRIPTION_COUNT).and_then(Value::as_u64));
                match (channel, count) {
                    (Some(channel), Some(count)) => channel.update_subscription_count(count),
                    _ => debug!("Ignoring malformed subscription_count event"),
                }
            }
            _ => {
                self.global.handle(&event);
                if let Some(channel) = event.channel_name().and_then(|name| self.registry.find(name)) {
                    channel.handle_event(&event);
                }
            }
        }
    }

    fn presence_channel(&self, event: &Event) -> Option<Arc<Channel>> {
        event
            .channel_name()
            .and_then(|name| self.registry.find(name))
            .filter(|channel| channel.presence().is_some())
    }

    fn on_subscription_succeeded(&self, event: &Event) {
        let Some(channel) = event.channel_name().and_then(|name| self.registry.find(name)) else {
            return;
        };

        let unsent = channel.mark_subscribed();

        if let Some(roster) = channel.presence() {
            match event.data_json() {
                Some(data) => roster.add_existing_members(&data),
                None => debug!("Presence subscription for {} carried no data", channel.name()),
            }
        }

        let public = event.with_event_name(events::SUBSCRIPTION_SUCCEEDED);
        self.global.handle(&public);
        channel.handle_event(&public);

        info!("Subscribed to {}", channel.name());
        self.delegate().subscribed_to_channel(channel.name());

        for pending in &unsent {
            channel.send_client_event(pending);
        }
    }

    fn report_subscribe_failure(&self, channel_name: &str, error: AuthError) {
        warn!("Failed to subscribe to {}: {}", channel_name, error);
        if let Some(channel) = self.registry.find(channel_name) {
            channel.end_authorization();
        }

        let data = error.body.clone().unwrap_or_else(|| error.to_string());
        let mut raw = Map::new();
        raw.insert(
            keys::EVENT.to_string(),
            Value::String(events::SUBSCRIPTION_ERROR.to_string()),
        );
        raw.insert(
            keys::CHANNEL.to_string(),
            Value::String(channel_name.to_string()),
        );
        raw.insert(keys::DATA.to_string(), Value::String(data.clone()));

        let event = Event::new(
            events::SUBSCRIPTION_ERROR.to_string(),
            Some(channel_name.to_string()),
            Some(data),
            None,
            raw,
        );
        self.global.handle(&event);
        if let Some(channel) = self.registry.find(channel_name) {
            channel.handle_event(&event);
        }

        self.delegate().failed_to_subscribe_to_channel(
            channel_name,
            error.status,
            error.body.as_deref(),
            &error,
        );
    }

    fn apply(&self, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }

        let delegate = self.delegate();
        for effect in effects {
            match effect {
                Effect::Connect => self.transport.connect(),
                Effect::Disconnect(code) => self.transport.disconnect(code),
                Effect::Send(text) => self.transport.send(text),
                Effect::Ping => self.transport.send_ping(),
                Effect::StateChanged(old, new) => delegate.changed_connection_state(old, new),
                Effect::Log(message) => delegate.debug_log(&message),
                Effect::Authorize { channel, socket_id } => {
                    self.authorize_channel(&channel, socket_id.as_deref())
                }
                Effect::SubscribeFailed { channel, error } => {
                    self.report_subscribe_failure(&channel, error)
                }
                Effect::ServerError(protocol_error) => delegate.received_error(&protocol_error),
            }
        }
    }
}

impl EventQueueDelegate for ConnectionEngine {
    fn did_receive_event(&self, event: Event) {
        self.dispatch(event);
    }

    fn did_receive_invalid_event(&self, payload: &Map<String, Value>) {
        let message = format!("Unable to handle incoming event {:?}", payload);
        debug!("{}", message);
        self.delegate().debug_log(&message);
    }

    fn did_fail_to_decrypt_event(&self, payload: &Map<String, Value>) {
        let event_name = payload
            .get(keys::EVENT)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let channel_name = payload
            .get(keys::CHANNEL)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let data = payload.get(keys::DATA).and_then(data_string);

        warn!("Skipping {} on {}: unable to decrypt", event_name, channel_name);
        self.delegate()
            .failed_to_decrypt_event(event_name, channel_name, data.as_deref());
    }

    fn reload_decryption_key_sync(&self, channel_name: &str) {
        let Some(socket_id) = self.socket_id() else {
            self.keys.clear(channel_name);
            return;
        };

        if Handle::try_current().is_ok() {
            warn!("Cannot reload the key for {} from inside the runtime", channel_name);
            return;
        }

        let result = self.runtime.block_on(
            self.authenticator
                .fetch_auth(&socket_id, channel_name, false),
        );

        match result {
            Ok(PusherAuth {
                shared_secret: Some(secret),
                ..
            }) => self.keys.set(channel_name, secret),
            Ok(_) => {
                warn!("Auth for {} carried no shared secret", channel_name);
                self.keys.clear(channel_name);
            }
            Err(e) => {
                warn!("Failed to reload the key for {}: {}", channel_name, e);
                self.keys.clear(channel_name);
            }
        }
    }
}

impl fmt::Debug for ConnectionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEngine")
            .field("key", &self.key)
            .field("state", &self.connection_state())
            .field("channels", &self.registry.len())
            .finish()
    }
}

fn set_state(state: &mut EngineState, new: ConnectionState, effects: &mut Vec<Effect>) {
    let old = state.connection_state;
    if old == new {
        return;
    }
    state.connection_state = new;
    info!("Connection state: {} -> {}", old, new);
    effects.push(Effect::StateChanged(old, new));
}

/// Claim a channel's subscribe attempt; call with the state lock held so a
/// channel is authorized at most once per connection
fn queue_authorization(channel: &Arc<Channel>, socket_id: Option<&str>, effects: &mut Vec<Effect>) {
    if channel.begin_authorization() {
        effects.push(Effect::Authorize {
            channel: Arc::clone(channel),
            socket_id: socket_id.map(str::to_string),
        });
    }
}

fn note(effects: &mut Vec<Effect>, message: String) {
    debug!("{}", message);
    effects.push(Effect::Log(message));
}

fn push_frame(effects: &mut Vec<Effect>, frame: Result<String>) {
    match frame {
        Ok(text) => effects.push(Effect::Send(text)),
        Err(e) => error!("Failed to encode frame: {}", e),
    }
}
