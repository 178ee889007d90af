use std::fmt;
use thiserror::Error;

/// Main error type for the channels client
#[derive(Error, Debug)]
pub enum ChannelsError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client was built outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Frame serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for channels operations
pub type Result<T> = std::result::Result<T, ChannelsError>;

/// Reason an authorization attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// No socket id is known yet
    NotConnected,
    /// The channel needs auth but no auth method is configured
    NoMethod,
    /// The request builder declined to produce a request
    CouldNotBuildRequest,
    /// The auth source answered with something unusable
    InvalidAuthResponse,
    /// The HTTP request itself failed
    RequestFailure,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::NotConnected => "not_connected",
            AuthErrorKind::NoMethod => "no_method",
            AuthErrorKind::CouldNotBuildRequest => "could_not_build_request",
            AuthErrorKind::InvalidAuthResponse => "invalid_auth_response",
            AuthErrorKind::RequestFailure => "request_failure",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization failure, delivered to the delegate and never returned to the caller
/// of `subscribe`.
///
/// `status` and `body` carry the raw auth endpoint response when there was one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Attach the HTTP response that caused this error
    pub fn with_response(mut self, status: Option<u16>, body: Option<String>) -> Self {
        self.status = status;
        self.body = body;
        self
    }
}

/// Failure to turn a raw frame into an [`Event`](crate::core::event::Event)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    #[error("invalid event format")]
    InvalidFormat,

    #[error("invalid decryption key")]
    InvalidDecryptionKey,

    #[error("invalid encrypted data")]
    InvalidEncryptedData,
}

/// Errors raised by [`Crypto`](crate::traits::crypto::Crypto) implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid nonce length: expected {expected} bytes, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("invalid HMAC key: {0}")]
    InvalidMacKey(String),

    #[error("secret box could not be opened")]
    DecryptionFailed,
}
