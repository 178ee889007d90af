use parking_lot::RwLock;
use std::collections::HashMap;

/// Decryption keys for `private-encrypted-` channels, keyed by channel name
///
/// Read by the decode worker while the host or the auth flow writes.
#[derive(Debug, Default)]
pub struct KeyProvider {
    keys: RwLock<HashMap<String, String>>,
}

impl KeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base64 key for a channel
    pub fn key_for(&self, channel_name: &str) -> Option<String> {
        self.keys.read().get(channel_name).cloned()
    }

    pub fn set(&self, channel_name: &str, key: impl Into<String>) {
        self.keys.write().insert(channel_name.to_string(), key.into());
    }

    pub fn clear(&self, channel_name: &str) {
        self.keys.write().remove(channel_name);
    }
}
