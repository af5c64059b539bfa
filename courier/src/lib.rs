//! Top-level wiring for the courier dispatch pipeline: configuration,
//! component construction, and the long-running supervision loop.

pub mod config;

use std::sync::Arc;

use anyhow::Context as _;
use courier_common::{Signal, internal};
use courier_content::ContentProcessor;
use courier_dispatch::Orchestrator;
use courier_queue::{AccountStore, MemoryAccountStore, MemoryQueueStore, QueueStore};
use courier_vault::Vault;
use tokio::sync::broadcast;

pub use config::CourierConfig;

/// The assembled application.
#[derive(Debug)]
pub struct Courier {
    config: CourierConfig,
}

impl Courier {
    #[must_use]
    pub const fn new(config: CourierConfig) -> Self {
        Self { config }
    }

    /// Build every component, recover the queue, spawn workers for eligible
    /// accounts, and supervise until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error on unrecoverable startup failure (bad master key,
    /// store initialization); the binary maps that to a non-zero exit so the
    /// process supervisor sees it.
    pub async fn run(self) -> anyhow::Result<()> {
        let master_key = self
            .config
            .vault
            .master_key()
            .context("master key unavailable")?;
        let vault = Arc::new(Vault::new(master_key));

        // Single-process deployment: in-memory stores. A relational backend
        // implements the same two traits and swaps in here.
        let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
        let queue: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());

        let processor = ContentProcessor::new(
            self.config.tracking.base_url.clone(),
            self.config.tracking.options,
        );

        let orchestrator = Orchestrator::new(
            accounts,
            queue,
            vault,
            processor,
            self.config.transport,
            self.config.dispatch.worker_config(),
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        spawn_signal_listener(shutdown_tx);

        internal!(level = INFO, "courier dispatch pipeline starting");
        orchestrator
            .serve(shutdown_rx, self.config.dispatch.housekeep_interval())
            .await
            .context("orchestrator terminated abnormally")?;

        internal!(level = INFO, "courier dispatch pipeline stopped");
        Ok(())
    }
}

/// Translate SIGINT/SIGTERM into a broadcast shutdown signal.
fn spawn_signal_listener(shutdown: broadcast::Sender<Signal>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        internal!(level = INFO, "shutdown signal received");
        let _ = shutdown.send(Signal::Shutdown);
    });
}
