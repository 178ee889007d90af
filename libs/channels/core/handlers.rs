//! Callback tables keyed by generated ids.

use crate::core::event::Event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Callback invoked with a delivered event
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

fn new_callback_id() -> String {
    Uuid::new_v4().to_string()
}

/// Per-event-name ordered callbacks of a channel
#[derive(Default)]
pub struct HandlerTable {
    by_event: HashMap<String, Vec<(String, EventCallback)>>,
}

impl HandlerTable {
    /// Register a callback and return its id
    pub fn bind(&mut self, event_name: &str, callback: EventCallback) -> String {
        let id = new_callback_id();
        self.by_event
            .entry(event_name.to_string())
            .or_default()
            .push((id.clone(), callback));
        id
    }

    /// Remove one callback; returns false if the id was unknown
    pub fn unbind(&mut self, event_name: &str, callback_id: &str) -> bool {
        let Some(callbacks) = self.by_event.get_mut(event_name) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(id, _)| id != callback_id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            self.by_event.remove(event_name);
        }
        removed
    }

    pub fn unbind_all(&mut self) {
        self.by_event.clear();
    }

    pub fn unbind_event(&mut self, event_name: &str) {
        self.by_event.remove(event_name);
    }

    /// Snapshot of the callbacks for an event, so they can run without the lock
    pub fn callbacks_for(&self, event_name: &str) -> Vec<EventCallback> {
        self.by_event
            .get(event_name)
            .map(|callbacks| callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, event_name: &str) -> usize {
        self.by_event.get(event_name).map_or(0, Vec::len)
    }
}

/// Callbacks that receive every event regardless of channel
#[derive(Default)]
pub struct GlobalHandlers {
    callbacks: Mutex<Vec<(String, EventCallback)>>,
}

impl GlobalHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, callback: EventCallback) -> String {
        let id = new_callback_id();
        self.callbacks.lock().push((id.clone(), callback));
        id
    }

    pub fn unbind(&self, callback_id: &str) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(id, _)| id != callback_id);
        callbacks.len() != before
    }

    pub fn unbind_all(&self) {
        self.callbacks.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn handle(&self, event: &Event) {
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }
}
