//! # Channels Traits
//!
//! Collaborator seams of the channels client. The connection engine only talks
//! to these traits; each one ships with a default implementation.
//!
//! - **Transport**: Raw WebSocket connection (default: tokio-tungstenite)
//! - **Crypto**: HMAC-SHA256 and secret-box open (default: RustCrypto)
//! - **HttpClient**: Auth endpoint requests (default: reqwest)
//! - **Authorizer / AuthRequestBuilder / UserDataFetcher**: Host-supplied auth hooks
//! - **ChannelsDelegate**: Host notifications
//! - **ReconnectionStrategy**: Delay between reconnection attempts

pub mod authorizer;
pub mod crypto;
pub mod delegate;
pub mod error;
pub mod http;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use authorizer::{AuthRequestBuilder, Authorizer, UserData, UserDataFetcher};
pub use crypto::{Crypto, RustCrypto};
pub use delegate::{ChannelsDelegate, NoDelegate};
pub use error::{AuthError, AuthErrorKind, ChannelsError, CryptoError, EventError, Result};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use reconnect::{
    is_protocol_close_code, CloseCodeAction, QuadraticBackoff, ReconnectionStrategy,
};
pub use transport::{Transport, TransportEvent, NORMAL_CLOSURE};
