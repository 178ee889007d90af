//! Common test utilities for channels integration tests
//!
//! This module provides a recording transport and delegate for driving the
//! client by hand, and a small Channels-speaking WebSocket server.

#![allow(dead_code)]

use channels::{
    AuthError, ChannelsClient, ChannelsDelegate, ClientBuilder, ConnectionState, ProtocolError,
    Transport, TransportEvent,
};
use channels::core::states::HasKey;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const SOCKET_ID: &str = "123.456";

/// Transport that records every call and never reports anything by itself
#[derive(Default)]
pub struct MockTransport {
    pub connects: Mutex<usize>,
    pub disconnects: Mutex<Vec<u16>>,
    pub sent: Mutex<Vec<String>>,
    pub pings: Mutex<usize>,
}

impl MockTransport {
    pub fn connect_count(&self) -> usize {
        *self.connects.lock()
    }

    pub fn ping_count(&self) -> usize {
        *self.pings.lock()
    }

    pub fn sent_frames(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Sent frames with the given event name
    pub fn sent_events(&self, event_name: &str) -> Vec<Value> {
        self.sent_frames()
            .into_iter()
            .filter(|frame| frame["event"] == event_name)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

impl Transport for MockTransport {
    fn connect(&self) {
        *self.connects.lock() += 1;
    }

    fn disconnect(&self, code: u16) {
        self.disconnects.lock().push(code);
    }

    fn send(&self, text: String) {
        self.sent.lock().push(text);
    }

    fn send_ping(&self) {
        *self.pings.lock() += 1;
    }
}

/// Delegate that records every notification
#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<(ConnectionState, ConnectionState)>>,
    pub subscribed: Mutex<Vec<String>>,
    pub failed: Mutex<Vec<(String, Option<u16>, Option<String>, AuthError)>>,
    pub errors: Mutex<Vec<ProtocolError>>,
    pub decrypt_failures: Mutex<Vec<(String, String)>>,
    pub logs: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    pub fn new_states(&self) -> Vec<ConnectionState> {
        self.states.lock().iter().map(|(_, new)| *new).collect()
    }
}

impl ChannelsDelegate for RecordingDelegate {
    fn changed_connection_state(&self, old: ConnectionState, new: ConnectionState) {
        self.states.lock().push((old, new));
    }

    fn subscribed_to_channel(&self, name: &str) {
        self.subscribed.lock().push(name.to_string());
    }

    fn failed_to_subscribe_to_channel(
        &self,
        name: &str,
        status: Option<u16>,
        body: Option<&str>,
        error: &AuthError,
    ) {
        self.failed.lock().push((
            name.to_string(),
            status,
            body.map(str::to_string),
            error.clone(),
        ));
    }

    fn received_error(&self, error: &ProtocolError) {
        self.errors.lock().push(error.clone());
    }

    fn failed_to_decrypt_event(&self, event_name: &str, channel_name: &str, _data: Option<&str>) {
        self.decrypt_failures
            .lock()
            .push((event_name.to_string(), channel_name.to_string()));
    }

    fn debug_log(&self, message: &str) {
        self.logs.lock().push(message.to_string());
    }
}

/// Late-bound handle to the client under test, for hooks that call back into it
#[derive(Clone, Default)]
pub struct ClientSlot(Arc<Mutex<Weak<ChannelsClient>>>);

impl ClientSlot {
    pub fn get(&self) -> Option<Arc<ChannelsClient>> {
        self.0.lock().upgrade()
    }
}

/// Run `f` on a plain thread and report whether it finished within `limit`
pub fn finishes_within(limit: Duration, f: impl FnOnce() + Send + 'static) -> bool {
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        f();
        let _ = done_tx.send(());
    });
    done_rx.recv_timeout(limit).is_ok()
}

/// Client wired to a mock transport and a recording delegate
pub struct Harness {
    pub client: Arc<ChannelsClient>,
    pub transport: Arc<MockTransport>,
    pub delegate: Arc<RecordingDelegate>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// Build with extra builder configuration; must run inside a tokio runtime
    pub fn with(configure: impl FnOnce(ClientBuilder<HasKey>) -> ClientBuilder<HasKey>) -> Self {
        Self::with_slot(|builder, _| configure(builder))
    }

    /// Build with hooks that can reach the finished client through a [`ClientSlot`]
    pub fn with_slot(
        configure: impl FnOnce(ClientBuilder<HasKey>, ClientSlot) -> ClientBuilder<HasKey>,
    ) -> Self {
        let transport = Arc::new(MockTransport::default());
        let delegate = Arc::new(RecordingDelegate::default());
        let slot = ClientSlot::default();

        let builder = channels::builder()
            .key("app-key")
            .transport(transport.clone())
            .delegate(delegate.clone());
        let client = Arc::new(configure(builder, slot.clone()).build().unwrap());
        *slot.0.lock() = Arc::downgrade(&client);

        Self {
            client,
            transport,
            delegate,
        }
    }

    /// Connect and complete the handshake
    pub fn connect(&self) {
        self.client.connect();
        self.open();
    }

    /// Report the socket open and the server greeting
    pub fn open(&self) {
        self.client.handle_transport_event(TransportEvent::Opened);
        self.server_sends(json!({
            "event": "pusher:connection_established",
            "data": json!({"socket_id": SOCKET_ID, "activity_timeout": 120}).to_string(),
        }));
    }

    pub fn server_sends(&self, frame: Value) {
        self.client
            .handle_transport_event(TransportEvent::Text(frame.to_string()));
    }

    pub fn close(&self, code: Option<u16>) {
        self.client.handle_transport_event(TransportEvent::Closed { code, reason: None });
    }

    /// Acknowledge a subscription the way the server does
    pub fn subscription_succeeded(&self, channel: &str, data: Value) {
        self.server_sends(json!({
            "event": "pusher_internal:subscription_succeeded",
            "channel": channel,
            "data": data.to_string(),
        }));
    }
}

/// Poll until `condition` holds
///
/// Yields to the runtime between polls so spawned tasks make progress, and
/// sleeps briefly so the decode worker thread can run.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..2000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// A minimal Channels server
///
/// Greets each connection with `pusher:connection_established`, acknowledges
/// subscriptions, answers `pusher:ping` and records every frame it receives.
/// Frames can be pushed to all open connections.
pub struct MockWsServer {
    pub addr: SocketAddr,
    pub received: Arc<Mutex<Vec<Value>>>,
    connections: Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new mock server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(Vec::new()));

        let shutdown_clone = shutdown.clone();
        let received_clone = received.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            let mut next_id = 0u32;
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                next_id += 1;
                                let (tx, rx) = mpsc::unbounded_channel();
                                connections_clone.lock().push(tx);
                                let received = received_clone.clone();
                                let shutdown = shutdown_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, next_id, rx, received, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            received,
            connections,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        id: u32,
        mut outbound: mpsc::UnboundedReceiver<Message>,
        received: Arc<Mutex<Vec<Value>>>,
        shutdown: Arc<Notify>,
    ) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        let greeting = json!({
            "event": "pusher:connection_established",
            "data": json!({"socket_id": format!("{}.{}", id, id), "activity_timeout": 120}).to_string(),
        });
        if write.send(Message::Text(greeting.to_string())).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            received.lock().push(frame.clone());

                            let reply = match frame["event"].as_str() {
                                Some("pusher:subscribe") => Some(json!({
                                    "event": "pusher_internal:subscription_succeeded",
                                    "channel": frame["data"]["channel"],
                                    "data": "{}",
                                })),
                                Some("pusher:ping") => Some(json!({"event": "pusher:pong", "data": {}})),
                                _ => None,
                            };
                            if let Some(reply) = reply {
                                if write.send(Message::Text(reply.to_string())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if write.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                out = outbound.recv() => {
                    match out {
                        Some(message) => {
                            let closing = message.is_close();
                            if write.send(message).await.is_err() || closing {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Push a frame to every open connection
    pub fn broadcast(&self, frame: Value) {
        self.connections
            .lock()
            .retain(|tx| tx.send(Message::Text(frame.to_string())).is_ok());
    }

    /// Close every open connection with a close frame
    pub fn close_all(&self, code: u16) {
        use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};

        for tx in self.connections.lock().drain(..) {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            })));
        }
    }

    /// Frames received with the given event name
    pub fn received_events(&self, event_name: &str) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter(|frame| frame["event"] == event_name)
            .cloned()
            .collect()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
