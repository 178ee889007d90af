//! Runner for long-lived Channels binaries
//!
//! A runner connects, listens until Ctrl+C and reports what its session saw.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// How a listener binary runs
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name used in the start and stop log lines
    pub name: String,
    /// Interval of the connection status log line
    pub heartbeat_interval_secs: u64,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heartbeat_interval_secs: 60,
        }
    }

    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// What a session saw between connecting and shutting down
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub events: u64,
    pub channels: Vec<String>,
    pub state_changes: u64,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events on {} channel(s), {} connection state changes",
            self.events,
            self.channels.len(),
            self.state_changes
        )?;
        if !self.channels.is_empty() {
            write!(f, " [{}]", self.channels.join(", "))?;
        }
        Ok(())
    }
}

/// A binary that holds one Channels connection open until shutdown
pub trait BinaryRunner {
    /// Listen until shutdown is requested
    async fn run(&mut self) -> anyhow::Result<SessionSummary>;

    fn config(&self) -> &RunConfig;

    /// Socket URL (or host) the runner connects to, for the start line
    fn endpoint(&self) -> String;

    async fn execute(&mut self) -> anyhow::Result<()> {
        let started = Instant::now();
        info!(
            "{} connecting to {} (Ctrl+C to stop)",
            self.config().name,
            self.endpoint()
        );

        let summary = self.run().await?;

        info!(
            "{} stopped after {:?}: {}",
            self.config().name,
            started.elapsed(),
            summary
        );
        Ok(())
    }
}
