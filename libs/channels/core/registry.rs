use crate::core::channel::Channel;
use crate::core::event::PusherAuth;
use crate::traits::transport::Transport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Channels known to the client, keyed by name
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    transport: Arc<dyn Transport>,
}

impl ChannelRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            transport,
        }
    }

    /// Get or create a channel
    ///
    /// An existing channel is returned unchanged; `auth` only applies to a new one.
    pub fn add(&self, name: &str, auth: Option<PusherAuth>) -> Arc<Channel> {
        let mut channels = self.channels.lock();
        if let Some(existing) = channels.get(name) {
            return Arc::clone(existing);
        }

        let channel = Arc::new(Channel::new(name, auth, Arc::clone(&self.transport)));
        channels.insert(name.to_string(), Arc::clone(&channel));
        channel
    }

    pub fn find(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.lock().get(name).cloned()
    }

    /// Forget a channel; sends nothing
    pub fn remove(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.lock().remove(name)
    }

    pub fn all(&self) -> Vec<Arc<Channel>> {
        self.channels.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
