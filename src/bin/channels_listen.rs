//! Channels listener
//!
//! Connects with the settings in `config/channels.yaml` (or
//! `CHANNELS_CONFIG_PATH`), subscribes to the configured channels and logs
//! every event until Ctrl+C.

use anyhow::{Context, Result};
use channels_client::bin_common::{
    load_config_from_env, BinaryRunner, ConfigType, RunConfig, SessionSummary,
};
use channels_client::channels::{
    AuthError, ChannelsClient, ChannelsDelegate, ClientConfig, ConnectionState, Event,
    ProtocolError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Logs client notifications
struct LoggingDelegate {
    state_changes: Arc<AtomicU64>,
}

impl ChannelsDelegate for LoggingDelegate {
    fn changed_connection_state(&self, old: ConnectionState, new: ConnectionState) {
        self.state_changes.fetch_add(1, Ordering::Relaxed);
        info!("Connection: {} -> {}", old, new);
    }

    fn subscribed_to_channel(&self, name: &str) {
        info!("Subscribed to {}", name);
    }

    fn failed_to_subscribe_to_channel(
        &self,
        name: &str,
        status: Option<u16>,
        _body: Option<&str>,
        error: &AuthError,
    ) {
        warn!("Subscription to {} failed (status {:?}): {}", name, status, error);
    }

    fn received_error(&self, error: &ProtocolError) {
        warn!("Server error {:?}: {}", error.code, error.message);
    }
}

struct Listener {
    run_config: RunConfig,
    client: ChannelsClient,
    channels: Vec<String>,
    endpoint: String,
    events_seen: Arc<AtomicU64>,
    state_changes: Arc<AtomicU64>,
}

impl Listener {
    fn new(config: &ClientConfig) -> Result<Self> {
        let options = config.client_options();
        let endpoint = options.socket_url(&config.app_key);
        let state_changes = Arc::new(AtomicU64::new(0));

        let client = channels_client::channels::builder()
            .key(config.app_key.clone())
            .options(options)
            .delegate(Arc::new(LoggingDelegate {
                state_changes: Arc::clone(&state_changes),
            }))
            .build()
            .context("Failed to build channels client")?;

        let events_seen = Arc::new(AtomicU64::new(0));
        {
            let events_seen = Arc::clone(&events_seen);
            client.bind(move |event: &Event| {
                events_seen.fetch_add(1, Ordering::Relaxed);
                info!(
                    "[{}] {}: {}",
                    event.channel_name().unwrap_or("-"),
                    event.event_name(),
                    event.data().unwrap_or("")
                );
            });
        }

        Ok(Self {
            run_config: RunConfig::new("Channels Listener").with_heartbeat(60),
            client,
            channels: config.channels.clone(),
            endpoint,
            events_seen,
            state_changes,
        })
    }
}

impl BinaryRunner for Listener {
    async fn run(&mut self) -> Result<SessionSummary> {
        for name in &self.channels {
            self.client.subscribe(name);
        }
        self.client.connect();

        let mut heartbeat = tokio::time::interval(self.run_config.heartbeat());
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl+C: {}", e);
                    }
                    break;
                }
                _ = heartbeat.tick() => {
                    info!(
                        "Heartbeat: {} ({} events so far)",
                        self.client.connection_state(),
                        self.events_seen.load(Ordering::Relaxed)
                    );
                }
            }
        }

        info!("Shutting down...");
        let channels = self
            .client
            .channels()
            .iter()
            .filter(|channel| channel.is_subscribed())
            .map(|channel| channel.name().to_string())
            .collect();
        self.client.disconnect();
        tokio::time::sleep(Duration::from_millis(250)).await;

        Ok(SessionSummary {
            events: self.events_seen.load(Ordering::Relaxed),
            channels,
            state_changes: self.state_changes.load(Ordering::Relaxed),
        })
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = channels_client::bin_common::parse_args();
    let config_type = match args.first() {
        Some(path) => ConfigType::Custom(path.clone()),
        None => ConfigType::Listener,
    };
    let config_path = load_config_from_env(config_type);
    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut listener = Listener::new(&config)?;
    listener.execute().await
}
