//! # Channels
//!
//! Client for the Channels publish/subscribe service (Pusher protocol 7)
//! over WebSocket.
//!
//! ## Features
//!
//! - **Automatic reconnection**: Quadratic backoff with protocol close-code handling
//! - **Type-state builder**: Compile-time guarantee that the app key is set
//! - **Ordered delivery**: Channel events decoded on one dedicated worker thread
//! - **Authenticated channels**: Auth endpoint, custom request, custom authorizer or inline secret
//! - **Presence and encryption**: Member tracking and end-to-end encrypted channels
//!
//! ## Example
//!
//! ```rust,ignore
//! use channels::{ChannelsDelegate, ConnectionState};
//!
//! #[tokio::main]
//! async fn main() -> channels::Result<()> {
//!     let client = channels::builder()
//!         .key("app-key")
//!         .cluster("eu")
//!         .build()?;
//!
//!     let channel = client.subscribe("my-channel");
//!     channel.bind("my-event", |event| {
//!         println!("Event: {:?}", event.data());
//!     });
//!
//!     client.connect();
//!     tokio::signal::ctrl_c().await.ok();
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod socket;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use core::{
    builder, ChannelKind, Channel, ChannelsClient, ClientBuilder, ClientConfig, ClientOptions,
    AuthMethod, ConnectionState, Event, Host, KeyProvider, PresenceMember, PresenceRoster,
    ProtocolError, PusherAuth, SubscribeOptions,
};
pub use socket::WebSocketTransport;

/// Type alias for Result with ChannelsError
pub type Result<T> = std::result::Result<T, traits::ChannelsError>;
