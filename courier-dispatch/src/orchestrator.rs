//! Worker supervision: start/stop/restart, health, and aggregate metrics.

use std::sync::Arc;
use std::time::Duration;

use courier_common::account::{AccountId, AccountStatus};
use courier_common::{Signal, internal};
use courier_content::ContentProcessor;
use courier_queue::{AccountStore, QueueStore};
use courier_transport::{TransportTimeouts, build_transport};
use courier_vault::Vault;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    AggregateMetrics, DispatchError, DispatchWorker, ProcessStatus, RateGovernor, WorkerConfig,
    WorkerShared,
};

/// Result of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The worker was already running; reported as such, not an error.
    AlreadyRunning,
}

/// Result of a `stop` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// No worker was running for the account; a no-op.
    NotRunning,
}

/// Snapshot of one worker for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub account_id: AccountId,
    pub process_status: ProcessStatus,
    pub sent: u64,
    pub failed: u64,
    pub bounced: u64,
    pub last_error: Option<String>,
}

struct WorkerHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
    shared: Arc<WorkerShared>,
}

/// Owns the live set of dispatch workers, keyed by account id. The registry
/// is an explicit in-memory map with `start`/`stop` as the only mutators —
/// no hidden process-global state.
pub struct Orchestrator {
    accounts: Arc<dyn AccountStore>,
    queue: Arc<dyn QueueStore>,
    vault: Arc<Vault>,
    governor: RateGovernor,
    processor: ContentProcessor,
    timeouts: TransportTimeouts,
    worker_config: WorkerConfig,
    workers: DashMap<AccountId, WorkerHandle>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        queue: Arc<dyn QueueStore>,
        vault: Arc<Vault>,
        processor: ContentProcessor,
        timeouts: TransportTimeouts,
        worker_config: WorkerConfig,
    ) -> Self {
        let governor = RateGovernor::new(accounts.clone());
        Self {
            accounts,
            queue,
            vault,
            governor,
            processor,
            timeouts,
            worker_config,
            workers: DashMap::new(),
        }
    }

    #[must_use]
    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Re-surface messages stranded in `processing` by a previous run. Must
    /// complete before any worker spawns.
    pub async fn recover_stale(&self) -> Result<usize, DispatchError> {
        let recovered = self.queue.recover_stale().await?;
        if recovered > 0 {
            warn!(count = recovered, "recovered stale processing messages back to pending");
        }
        Ok(recovered)
    }

    /// Start a worker for an account. Starting an already-running worker is
    /// a reported no-op.
    pub async fn start(&self, id: &AccountId) -> Result<StartOutcome, DispatchError> {
        if let Some(handle) = self.workers.get(id) {
            if !handle.join.is_finished() {
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        let account = self
            .accounts
            .get(id)
            .await?
            .ok_or_else(|| DispatchError::AccountNotFound(id.clone()))?;

        if !account.status.is_sendable() {
            return Err(DispatchError::NotSendable(id.clone()));
        }

        // Failures from here on are this account's alone; nothing touches
        // the other workers.
        let credential = self.vault.reveal(&account)?;
        let transport = build_transport(&account.address, credential, self.timeouts)?;

        let shared = Arc::new(WorkerShared::new(id.clone()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker = DispatchWorker::new(
            id.clone(),
            self.accounts.clone(),
            self.queue.clone(),
            self.governor.clone(),
            self.processor.clone(),
            transport,
            self.worker_config,
            shared.clone(),
        );

        let join = tokio::spawn(worker.run(stop_rx));

        self.workers.insert(
            id.clone(),
            WorkerHandle {
                stop: stop_tx,
                join,
                shared,
            },
        );

        internal!(level = INFO, "started dispatch worker for {id}");
        Ok(StartOutcome::Started)
    }

    /// Stop a worker, waiting for any in-flight send to finish. Stopping a
    /// non-running worker is a no-op.
    pub async fn stop(&self, id: &AccountId) -> StopOutcome {
        let Some((_, handle)) = self.workers.remove(id) else {
            return StopOutcome::NotRunning;
        };

        let _ = handle.stop.send(true);
        if let Err(e) = handle.join.await {
            error!(account = %id, error = %e, "worker task join failed");
        }

        internal!(level = INFO, "stopped dispatch worker for {id}");
        StopOutcome::Stopped
    }

    pub async fn restart(&self, id: &AccountId) -> Result<StartOutcome, DispatchError> {
        self.stop(id).await;
        self.start(id).await
    }

    /// Start workers for every account currently in a sendable status.
    /// Returns the ids actually started.
    pub async fn spawn_eligible(&self) -> Result<Vec<AccountId>, DispatchError> {
        let mut started = Vec::new();

        for account in self.accounts.list().await? {
            if !account.status.is_sendable() {
                continue;
            }
            match self.start(&account.id).await {
                Ok(StartOutcome::Started) => started.push(account.id),
                Ok(StartOutcome::AlreadyRunning) => {}
                Err(e) => {
                    // One bad account must not keep the rest from starting.
                    error!(account = %account.id, error = %e, "failed to start worker");
                }
            }
        }

        Ok(started)
    }

    /// Snapshot of every known worker.
    #[must_use]
    pub fn status(&self) -> Vec<WorkerStatus> {
        let mut statuses: Vec<WorkerStatus> = self
            .workers
            .iter()
            .map(|entry| {
                let shared = &entry.value().shared;
                WorkerStatus {
                    account_id: shared.account_id.clone(),
                    process_status: shared.status(),
                    sent: shared.counters.sent(),
                    failed: shared.counters.failed(),
                    bounced: shared.counters.bounced(),
                    last_error: shared.last_error(),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        statuses
    }

    /// Aggregate metrics, derived by summing per-worker counters — the send
    /// path never writes anywhere else.
    #[must_use]
    pub fn metrics(&self) -> AggregateMetrics {
        let mut metrics = AggregateMetrics::default();

        for entry in self.workers.iter() {
            let shared = &entry.value().shared;
            metrics.workers += 1;
            if matches!(
                shared.status(),
                ProcessStatus::Running | ProcessStatus::Idle
            ) {
                metrics.running += 1;
            }
            metrics.sent += shared.counters.sent();
            metrics.failed += shared.counters.failed();
            metrics.bounced += shared.counters.bounced();
            metrics.add_window_count(shared.counters.sends_in_window());
        }

        metrics
    }

    /// Housekeeping tick: reactivate limit-paused accounts whose window has
    /// rolled over, then start workers for anything newly eligible.
    pub async fn housekeep(&self) -> Result<(), DispatchError> {
        for account in self.accounts.list().await? {
            if account.status == AccountStatus::PausedLimitReached {
                match self.governor.reactivate_if_reset(&account.id).await {
                    Ok(true) => {
                        info!(account = %account.id, "daily window rolled over, account reactivated");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(account = %account.id, error = %e, "reactivation check failed");
                    }
                }
            }
        }

        self.spawn_eligible().await?;

        // Drop handles for workers that exited on their own so `status()`
        // reflects reality and restarts are possible.
        self.workers
            .retain(|_, handle| !handle.join.is_finished() || handle.shared.status() == ProcessStatus::Error);

        Ok(())
    }

    /// Stop every worker, in-flight sends included.
    pub async fn shutdown(&self) {
        let ids: Vec<AccountId> = self.workers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.stop(&id).await;
        }
        internal!(level = INFO, "all dispatch workers stopped");
    }

    /// Supervision loop: housekeeping on an interval until shutdown.
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
        housekeep_interval: Duration,
    ) -> Result<(), DispatchError> {
        self.recover_stale().await?;
        self.spawn_eligible().await?;

        let mut timer = tokio::time::interval(housekeep_interval);
        timer.tick().await; // immediate first tick is redundant with spawn_eligible

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.housekeep().await {
                        error!(error = %e, "housekeeping pass failed");
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(level = INFO, "orchestrator received shutdown signal");
                            self.shutdown().await;
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "shutdown channel closed unexpectedly");
                            self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
