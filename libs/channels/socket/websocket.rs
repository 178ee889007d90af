use crate::traits::transport::{Transport, TransportEvent, NORMAL_CLOSURE};
use crossbeam_channel::Sender;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Commands for the task that owns one connection
#[derive(Debug)]
enum SocketCommand {
    Send(String),
    Ping,
    Close(u16),
}

/// Reports events of one connection unless a newer connection superseded it
#[derive(Clone)]
struct EventEmitter {
    generation: u64,
    current: Arc<AtomicU64>,
    events: Sender<TransportEvent>,
}

impl EventEmitter {
    fn emit(&self, event: TransportEvent) {
        if self.current.load(Ordering::Acquire) != self.generation {
            debug!("Dropping {:?} from a superseded connection", event);
            return;
        }
        let _ = self.events.send(event);
    }
}

/// [`Transport`] over tokio-tungstenite
///
/// Each connection runs in its own tokio task that selects over inbound
/// frames and an outbound command channel. Events go out on a crossbeam
/// channel, pumped into the client by
/// [`ChannelsClient`](crate::core::client::ChannelsClient).
pub struct WebSocketTransport {
    url: String,
    runtime: Handle,
    events: Sender<TransportEvent>,
    generation: Arc<AtomicU64>,
    commands: Mutex<Option<mpsc::UnboundedSender<SocketCommand>>>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, events: Sender<TransportEvent>, runtime: Handle) -> Self {
        Self {
            url: url.into(),
            runtime,
            events,
            generation: Arc::new(AtomicU64::new(0)),
            commands: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn command(&self, command: SocketCommand) {
        match self.commands.lock().as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(command) {
                    debug!("Connection task gone, dropping {:?}", e.0);
                }
            }
            None => debug!("Not connected, dropping {:?}", command),
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(previous) = self.commands.lock().replace(tx) {
            let _ = previous.send(SocketCommand::Close(NORMAL_CLOSURE));
        }

        let emitter = EventEmitter {
            generation,
            current: Arc::clone(&self.generation),
            events: self.events.clone(),
        };
        self.runtime
            .spawn(run_connection(self.url.clone(), rx, emitter));
    }

    fn disconnect(&self, code: u16) {
        // Later events of the closing connection are suppressed.
        self.generation.fetch_add(1, Ordering::AcqRel);

        if let Some(tx) = self.commands.lock().take() {
            let _ = tx.send(SocketCommand::Close(code));
        }

        let _ = self.events.send(TransportEvent::Closed {
            code: Some(code),
            reason: None,
        });
    }

    fn send(&self, text: String) {
        self.command(SocketCommand::Send(text));
    }

    fn send_ping(&self) {
        self.command(SocketCommand::Ping);
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(tx) = self.commands.get_mut().take() {
            let _ = tx.send(SocketCommand::Close(NORMAL_CLOSURE));
        }
    }
}

/// Own one connection from handshake to close
async fn run_connection(
    url: String,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    emitter: EventEmitter,
) {
    let request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid socket URL {}: {}", url, e);
            emitter.emit(TransportEvent::Error(e.to_string()));
            return;
        }
    };

    let connecting = connect_async(request);
    tokio::pin!(connecting);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok((ws_stream, _)) => break ws_stream,
                Err(e) => {
                    error!("Failed to connect: {}", e);
                    emitter.emit(TransportEvent::Error(e.to_string()));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(SocketCommand::Close(_)) | None => {
                    debug!("Connection attempt cancelled");
                    return;
                }
                Some(other) => debug!("Dropping {:?} while connecting", other),
            },
        }
    };

    info!("Connected to {}", url);
    emitter.emit(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => emitter.emit(TransportEvent::Text(text)),
                Some(Ok(Message::Pong(_))) => emitter.emit(TransportEvent::Pong),
                Some(Ok(Message::Ping(_))) => debug!("Ping from server"),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), Some(frame.reason.to_string())),
                        None => (None, None),
                    };
                    info!("Server closed the connection (code: {:?})", code);
                    emitter.emit(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Frame(_))) => {
                    debug!("Ignoring non-text frame");
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    emitter.emit(TransportEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    warn!("WebSocket stream closed");
                    emitter.emit(TransportEvent::Closed {
                        code: None,
                        reason: Some("stream ended".to_string()),
                    });
                    return;
                }
            },

            command = commands.recv() => match command {
                Some(SocketCommand::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        error!("Failed to send frame: {}", e);
                        emitter.emit(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
                Some(SocketCommand::Ping) => {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        error!("Failed to send ping: {}", e);
                        emitter.emit(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
                Some(SocketCommand::Close(code)) => {
                    debug!("Closing connection with code {}", code);
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    let _ = write.close().await;
                    return;
                }
                None => {
                    let _ = write.close().await;
                    return;
                }
            },
        }
    }
}
