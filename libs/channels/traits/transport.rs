/// Close code sent when the client disconnects on purpose
pub const NORMAL_CLOSURE: u16 = 1000;

/// Events a transport reports back to the client
///
/// Transports deliver these through
/// [`ChannelsClient::handle_transport_event`](crate::core::client::ChannelsClient::handle_transport_event)
/// (the bundled WebSocket transport does so from its pump thread).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open
    Opened,
    /// The socket closed; `code` is absent when no close frame was received
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// A text frame arrived
    Text(String),
    /// A pong arrived in response to [`Transport::send_ping`]
    Pong,
    /// The socket failed
    Error(String),
    /// The network layer suggests dropping the current connection and reconnecting
    ReconnectSuggested(bool),
}

/// Raw WebSocket transport used by the connection engine
///
/// Implementations must not block and must not call back into the client from
/// inside these methods; results are reported asynchronously as
/// [`TransportEvent`]s. Every connection ends with exactly one `Closed` or
/// `Error` event, and events of a connection replaced by a later
/// [`Transport::connect`] are not reported.
pub trait Transport: Send + Sync {
    /// Open a connection, replacing any previous one
    fn connect(&self);

    /// Close the current connection with the given close code
    ///
    /// Reports `Closed` with the same code.
    fn disconnect(&self, code: u16);

    /// Send a text frame
    fn send(&self, text: String);

    /// Send a protocol-level ping
    fn send_ping(&self);
}
