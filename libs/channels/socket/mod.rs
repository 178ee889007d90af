//! Bundled network transport.

pub mod websocket;

pub use websocket::WebSocketTransport;
