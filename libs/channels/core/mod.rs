//! Connection engine, channels and the client facade.

pub mod authenticator;
pub mod builder;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection_state;
pub mod engine;
pub mod event;
pub mod event_queue;
pub mod handlers;
pub mod key_provider;
pub mod options;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod timers;

// Re-export main types
pub use builder::{states, ClientBuilder};
pub use channel::{Channel, ChannelKind};
pub use client::ChannelsClient;
pub use config::ClientConfig;
pub use connection_state::ConnectionState;
pub use engine::SubscribeOptions;
pub use event::{Event, ProtocolError, PusherAuth};
pub use key_provider::KeyProvider;
pub use options::{AuthMethod, ClientOptions, Host};
pub use presence::{PresenceMember, PresenceRoster};

/// Create a new client builder
///
/// This is a convenience function for starting the builder pattern.
///
/// # Example
/// ```ignore
/// let client = channels::builder()
///     .key("app-key")
///     .cluster("eu")
///     .auth_endpoint("https://example.com/pusher/auth")
///     .build()?;
///
/// let channel = client.subscribe("private-orders");
/// channel.bind("order-created", |event| println!("{:?}", event.data()));
/// client.connect();
/// ```
pub fn builder() -> ClientBuilder<builder::states::NoKey> {
    ClientBuilder::new()
}
