//! One-shot timers owned by the connection engine.
//!
//! Each timer runs as a tokio task. Starting a timer replaces and aborts the
//! previous one of the same kind, and every start gets a fresh generation
//! number: a task that fires after being replaced or cancelled presents a
//! stale generation and is ignored.

use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Reconnect,
    Activity,
    PongTimeout,
}

struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct Timers {
    slots: HashMap<TimerKind, TimerSlot>,
    next_generation: u64,
}

impl Timers {
    /// Start (or restart) a timer
    ///
    /// `on_fire` receives the kind and generation; pass them to
    /// [`Timers::complete`] to find out whether the firing is still current.
    pub fn start<F>(&mut self, runtime: &Handle, kind: TimerKind, delay: Duration, on_fire: F)
    where
        F: FnOnce(TimerKind, u64) + Send + 'static,
    {
        self.cancel(kind);

        self.next_generation += 1;
        let generation = self.next_generation;

        let handle = runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            on_fire(kind, generation);
        });

        self.slots.insert(kind, TimerSlot { generation, handle });
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(slot) = self.slots.remove(&kind) {
            slot.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Consume a firing
    ///
    /// # Returns
    /// * `true` if `generation` is the live timer of this kind (the slot is cleared)
    /// * `false` if the timer was cancelled or replaced since it was started
    pub fn complete(&mut self, kind: TimerKind, generation: u64) -> bool {
        match self.slots.get(&kind) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(&kind);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
