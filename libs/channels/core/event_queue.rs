//! Serial decode pipeline.
//!
//! Channel frames are decoded on one dedicated worker thread so that events of
//! a channel are delivered in arrival order. A frame that fails with a missing
//! or wrong decryption key triggers one synchronous key reload and one retry.

use crate::core::codec::EventCodec;
use crate::core::event::Event;
use crate::core::key_provider::KeyProvider;
use crate::traits::error::EventError;
use crossbeam_channel::{unbounded, Sender};
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// Receives the results of the decode pipeline
///
/// Called from the worker thread for channel frames and from the reporting
/// thread for frames without a channel.
pub trait EventQueueDelegate: Send + Sync {
    fn did_receive_event(&self, event: Event);

    fn did_receive_invalid_event(&self, payload: &Map<String, Value>);

    fn did_fail_to_decrypt_event(&self, payload: &Map<String, Value>);

    /// Refresh the key for `channel_name` before returning
    fn reload_decryption_key_sync(&self, channel_name: &str);
}

/// Result of running one frame through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Decoded(Event),
    Invalid,
    Undecryptable,
}

struct Job {
    payload: Map<String, Value>,
    channel_name: String,
}

struct Pipeline {
    codec: EventCodec,
    keys: Arc<KeyProvider>,
    delegate: Weak<dyn EventQueueDelegate>,
}

impl Pipeline {
    fn process(&self, payload: &Map<String, Value>, channel_name: Option<&str>) -> DecodeOutcome {
        let key = channel_name.and_then(|name| self.keys.key_for(name));

        match self.codec.decode(payload, key.as_deref()) {
            Ok(event) => DecodeOutcome::Decoded(event),
            Err(EventError::InvalidFormat) => DecodeOutcome::Invalid,
            Err(EventError::InvalidEncryptedData) => DecodeOutcome::Undecryptable,
            Err(EventError::InvalidDecryptionKey) => {
                let Some(channel_name) = channel_name else {
                    return DecodeOutcome::Undecryptable;
                };
                let Some(delegate) = self.delegate.upgrade() else {
                    return DecodeOutcome::Undecryptable;
                };

                debug!("Reloading decryption key for {}", channel_name);
                delegate.reload_decryption_key_sync(channel_name);

                let key = self.keys.key_for(channel_name);
                match self.codec.decode(payload, key.as_deref()) {
                    Ok(event) => DecodeOutcome::Decoded(event),
                    Err(EventError::InvalidFormat) => DecodeOutcome::Invalid,
                    Err(_) => DecodeOutcome::Undecryptable,
                }
            }
        }
    }

    fn run(&self, payload: Map<String, Value>, channel_name: Option<&str>) {
        let outcome = self.process(&payload, channel_name);
        let Some(delegate) = self.delegate.upgrade() else {
            return;
        };

        match outcome {
            DecodeOutcome::Decoded(event) => delegate.did_receive_event(event),
            DecodeOutcome::Invalid => delegate.did_receive_invalid_event(&payload),
            DecodeOutcome::Undecryptable => delegate.did_fail_to_decrypt_event(&payload),
        }
    }
}

/// Ordered decode queue with a dedicated worker thread
pub struct EventQueue {
    pipeline: Arc<Pipeline>,
    job_tx: Sender<Job>,
}

impl EventQueue {
    /// Create the queue and spawn its worker
    ///
    /// The worker exits once the queue is dropped.
    pub fn new(
        codec: EventCodec,
        keys: Arc<KeyProvider>,
        delegate: Weak<dyn EventQueueDelegate>,
    ) -> Self {
        let pipeline = Arc::new(Pipeline {
            codec,
            keys,
            delegate,
        });
        let (job_tx, job_rx) = unbounded::<Job>();

        let worker = Arc::clone(&pipeline);
        let spawned = std::thread::Builder::new()
            .name("channels-event-queue".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    worker.run(job.payload, Some(&job.channel_name));
                }
                debug!("Event queue closed, worker exiting");
            });

        if let Err(e) = spawned {
            error!("Failed to spawn event queue worker: {}", e);
        }

        Self { pipeline, job_tx }
    }

    /// Queue a frame for decoding
    ///
    /// Frames without a channel are decoded synchronously on the calling thread.
    pub fn report(&self, payload: Map<String, Value>, channel_name: Option<String>) {
        match channel_name {
            None => self.pipeline.run(payload, None),
            Some(channel_name) => {
                let job = Job {
                    payload,
                    channel_name,
                };
                if let Err(e) = self.job_tx.send(job) {
                    // The worker failed to start; fall back to decoding inline.
                    let job = e.into_inner();
                    self.pipeline.run(job.payload, Some(&job.channel_name));
                }
            }
        }
    }

    /// Run one frame through the pipeline on the calling thread without notifying
    pub fn process(
        &self,
        payload: &Map<String, Value>,
        channel_name: Option<&str>,
    ) -> DecodeOutcome {
        self.pipeline.process(payload, channel_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::crypto::RustCrypto;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use crossbeam_channel::Receiver;
    use crypto_secretbox::aead::{Aead, KeyInit};
    use crypto_secretbox::{Nonce, XSalsa20Poly1305};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    const CHANNEL: &str = "private-encrypted-test";

    #[derive(Debug, PartialEq)]
    enum Delivered {
        Event(Event),
        Invalid,
        Undecryptable,
    }

    struct TestDelegate {
        keys: Arc<KeyProvider>,
        reload_key: Mutex<Option<String>>,
        reloads: Mutex<usize>,
        tx: Sender<Delivered>,
    }

    impl EventQueueDelegate for TestDelegate {
        fn did_receive_event(&self, event: Event) {
            let _ = self.tx.send(Delivered::Event(event));
        }

        fn did_receive_invalid_event(&self, _payload: &Map<String, Value>) {
            let _ = self.tx.send(Delivered::Invalid);
        }

        fn did_fail_to_decrypt_event(&self, _payload: &Map<String, Value>) {
            let _ = self.tx.send(Delivered::Undecryptable);
        }

        fn reload_decryption_key_sync(&self, channel_name: &str) {
            *self.reloads.lock() += 1;
            match self.reload_key.lock().clone() {
                Some(key) => self.keys.set(channel_name, key),
                None => self.keys.clear(channel_name),
            }
        }
    }

    fn setup(reload_key: Option<String>) -> (EventQueue, Arc<TestDelegate>, Arc<KeyProvider>, Receiver<Delivered>) {
        let keys = Arc::new(KeyProvider::new());
        let (tx, rx) = unbounded();
        let delegate = Arc::new(TestDelegate {
            keys: Arc::clone(&keys),
            reload_key: Mutex::new(reload_key),
            reloads: Mutex::new(0),
            tx,
        });
        let weak: Weak<dyn EventQueueDelegate> = Arc::downgrade(&delegate) as Weak<TestDelegate>;
        let queue = EventQueue::new(EventCodec::new(Arc::new(RustCrypto)), Arc::clone(&keys), weak);
        (queue, delegate, keys, rx)
    }

    fn encrypted_payload(plaintext: &str, key: &[u8; 32]) -> Map<String, Value> {
        let nonce = [1u8; 24];
        let cipher = XSalsa20Poly1305::new_from_slice(key).unwrap();
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .unwrap();
        let data = json!({
            "nonce": STANDARD.encode(nonce),
            "ciphertext": STANDARD.encode(sealed),
        })
        .to_string();
        json!({"event": "my-event", "channel": CHANNEL, "data": data})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn recv(rx: &Receiver<Delivered>) -> Delivered {
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_decodes_with_existing_key() {
        let key = [4u8; 32];
        let (queue, delegate, keys, rx) = setup(None);
        keys.set(CHANNEL, STANDARD.encode(key));

        queue.report(encrypted_payload("hi", &key), Some(CHANNEL.to_string()));

        match recv(&rx) {
            Delivered::Event(event) => assert_eq!(event.data(), Some("hi")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*delegate.reloads.lock(), 0);
    }

    #[test]
    fn test_reloads_key_then_decodes() {
        let key = [4u8; 32];
        let (queue, delegate, _keys, rx) = setup(Some(STANDARD.encode(key)));

        queue.report(encrypted_payload("hi", &key), Some(CHANNEL.to_string()));

        match recv(&rx) {
            Delivered::Event(event) => assert_eq!(event.data(), Some("hi")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*delegate.reloads.lock(), 1);
    }

    #[test]
    fn test_wrong_key_reloads_once_then_drops() {
        let key = [4u8; 32];
        let (queue, delegate, keys, rx) = setup(Some(STANDARD.encode([5u8; 32])));
        keys.set(CHANNEL, STANDARD.encode([6u8; 32]));

        queue.report(encrypted_payload("hi", &key), Some(CHANNEL.to_string()));

        assert_eq!(recv(&rx), Delivered::Undecryptable);
        assert_eq!(*delegate.reloads.lock(), 1);
    }

    #[test]
    fn test_malformed_envelope_does_not_reload() {
        let (queue, delegate, keys, rx) = setup(None);
        keys.set(CHANNEL, STANDARD.encode([6u8; 32]));
        let payload = json!({"event": "my-event", "channel": CHANNEL, "data": "garbage"})
            .as_object()
            .cloned()
            .unwrap();

        queue.report(payload, Some(CHANNEL.to_string()));

        assert_eq!(recv(&rx), Delivered::Undecryptable);
        assert_eq!(*delegate.reloads.lock(), 0);
    }

    #[test]
    fn test_frame_without_channel_is_synchronous() {
        let (queue, _delegate, _keys, rx) = setup(None);
        let payload = json!({"event": "pusher:connection_established", "data": "{}"})
            .as_object()
            .cloned()
            .unwrap();

        queue.report(payload, None);

        match rx.try_recv().unwrap() {
            Delivered::Event(event) => {
                assert_eq!(event.event_name(), "pusher:connection_established")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_frame_reported() {
        let (queue, _delegate, _keys, rx) = setup(None);
        let payload = json!({"channel": "c"}).as_object().cloned().unwrap();

        queue.report(payload, None);

        assert_eq!(rx.try_recv().unwrap(), Delivered::Invalid);
    }

    #[test]
    fn test_channel_order_preserved() {
        let (queue, _delegate, _keys, rx) = setup(None);
        for i in 0..50 {
            let payload = json!({"event": "tick", "channel": "ticks", "data": i.to_string()})
                .as_object()
                .cloned()
                .unwrap();
            queue.report(payload, Some("ticks".to_string()));
        }

        for i in 0..50 {
            match recv(&rx) {
                Delivered::Event(event) => assert_eq!(event.data(), Some(i.to_string().as_str())),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
