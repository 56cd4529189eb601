use std::{
    path::Path,
    sync::{Arc, LazyLock},
    time::SystemTime,
};

use anyhow::Context;
use hermod_common::{Message, Signal, internal, logging};
use hermod_courier::{CourierConfig, Couriers};
use hermod_queue::{Queue, QueueConfig, RetryScheduler, describe};
use hermod_spool::{BackingStore, SpoolConfig};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Everything the daemon is configured with, as read from
/// `hermod.config.ron`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hermod {
    #[serde(default)]
    spool: SpoolConfig,

    #[serde(default)]
    queue: QueueConfig,

    #[serde(alias = "courier", default)]
    couriers: CourierConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(16);
    sender
});

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    };

    Ok(())
}

/// Wait for SIGINT or SIGTERM, then tell everyone listening to stop.
///
/// The broadcast goes out even if the signal handlers could not be
/// installed, so nothing is left running.
async fn shutdown() -> anyhow::Result<()> {
    let waited = wait_for_signal().await;

    if SHUTDOWN_BROADCAST.send(Signal::Shutdown).is_err() {
        debug!("Nobody was listening for shutdown");
    }

    waited
}

impl Hermod {
    /// Parse a configuration file
    ///
    /// # Errors
    /// If the file cannot be read or is not valid configuration
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    #[must_use]
    pub const fn queue(&self) -> &QueueConfig {
        &self.queue
    }

    #[must_use]
    pub const fn spool(&self) -> &SpoolConfig {
        &self.spool
    }

    /// Recover the spool and run the retry scheduler until shutdown.
    ///
    /// In-flight deliveries are not waited for. Whatever they had not
    /// recorded yet is attempted again on the next start.
    ///
    /// # Errors
    /// If the spool or the couriers cannot be set up, or recovery cannot
    /// list the spool
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let queue = self.build_queue()?;
        let summary = queue.load().await?;
        debug!(?summary, "Recovery complete");

        internal!(level = INFO, "Hermod running with {} queued item(s)", queue.len());

        let scheduler = RetryScheduler::from_config(queue.clone());
        let (_, stopped) = tokio::join!(
            scheduler.serve(SHUTDOWN_BROADCAST.subscribe()),
            shutdown()
        );

        internal!(
            level = INFO,
            "Shutting down with {} item(s) still queued",
            queue.len()
        );

        stopped
    }

    /// Build the queue this configuration describes, without loading it
    fn build_queue(self) -> anyhow::Result<Queue> {
        let store = self
            .spool
            .into_backing_store()
            .context("Failed to initialise the spool")?;
        let couriers =
            Couriers::from_config(self.couriers).context("Failed to set up the couriers")?;

        Ok(Queue::new(self.queue, store, couriers))
    }

    /// Describe every record in the configured spool, leaving the spool
    /// exactly as it was
    ///
    /// # Errors
    /// If the spool cannot be opened or listed
    pub async fn list(self) -> anyhow::Result<String> {
        let store: Arc<dyn BackingStore> = self
            .spool
            .open_read_only()
            .context("Failed to open the spool")?;

        let mut messages: Vec<Message> = Vec::new();
        for id in store.list().await? {
            match store.read(&id).await {
                Ok(message) => messages.push(message),
                Err(e) => warn!(%id, error = %e, "Skipping unreadable record"),
            }
        }

        Ok(describe(&messages, SystemTime::now()))
    }
}
