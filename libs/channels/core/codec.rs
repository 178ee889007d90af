//! Raw frame to [`Event`] decoding, including end-to-end decryption.

use crate::core::channel::ChannelKind;
use crate::core::event::Event;
use crate::core::protocol::{is_system_event, keys};
use crate::traits::crypto::Crypto;
use crate::traits::error::{CryptoError, EventError};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Envelope carried in `data` on encrypted channels
#[derive(Debug, Deserialize)]
struct EncryptedData {
    nonce: String,
    ciphertext: String,
}

/// Turns parsed frames into events, opening encrypted payloads on the way
#[derive(Clone)]
pub struct EventCodec {
    crypto: Arc<dyn Crypto>,
}

impl EventCodec {
    pub fn new(crypto: Arc<dyn Crypto>) -> Self {
        Self { crypto }
    }

    /// Decode a frame
    ///
    /// Non-system events on `private-encrypted-` channels are decrypted with
    /// `decryption_key` (base64).
    ///
    /// # Returns
    /// * `Err(InvalidFormat)` - no `event` field
    /// * `Err(InvalidDecryptionKey)` - no key, a malformed key, or the box would not open
    /// * `Err(InvalidEncryptedData)` - `data` is not a `{nonce, ciphertext}` envelope
    pub fn decode(
        &self,
        payload: &Map<String, Value>,
        decryption_key: Option<&str>,
    ) -> Result<Event, EventError> {
        let event_name = payload
            .get(keys::EVENT)
            .and_then(Value::as_str)
            .ok_or(EventError::InvalidFormat)?;

        let channel_name = payload
            .get(keys::CHANNEL)
            .and_then(Value::as_str)
            .map(str::to_string);

        let user_id = payload.get(keys::USER_ID).and_then(id_string);
        let data = payload.get(keys::DATA).and_then(data_string);

        let needs_decryption = channel_name
            .as_deref()
            .map_or(false, |name| ChannelKind::from_name(name).is_encrypted())
            && !is_system_event(event_name);

        let data = if needs_decryption {
            self.decrypt(data, decryption_key)?
        } else {
            data
        };

        Ok(Event::new(
            event_name.to_string(),
            channel_name,
            data,
            user_id,
            payload.clone(),
        ))
    }

    fn decrypt(
        &self,
        data: Option<String>,
        decryption_key: Option<&str>,
    ) -> Result<Option<String>, EventError> {
        let Some(data) = data else {
            return Ok(None);
        };
        let key = decryption_key.ok_or(EventError::InvalidDecryptionKey)?;

        let envelope: EncryptedData =
            serde_json::from_str(&data).map_err(|_| EventError::InvalidEncryptedData)?;
        let nonce = STANDARD
            .decode(&envelope.nonce)
            .map_err(|_| EventError::InvalidEncryptedData)?;
        let ciphertext = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|_| EventError::InvalidEncryptedData)?;
        let key = STANDARD
            .decode(key)
            .map_err(|_| EventError::InvalidDecryptionKey)?;

        let plaintext = self
            .crypto
            .secret_box_open(&ciphertext, &key, &nonce)
            .map_err(|e| match e {
                CryptoError::InvalidNonceLength { .. } => EventError::InvalidEncryptedData,
                _ => EventError::InvalidDecryptionKey,
            })?;

        // A box that opens to garbage was sealed with another key
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|_| EventError::InvalidDecryptionKey)
    }
}

/// String form of an id that may arrive as a JSON string or number
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn data_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
