//! The dispatch worker: one per active sender account.
//!
//! Loop shape: claim (atomic) -> governor check -> content process ->
//! transport send -> record outcome, with the inter-send delay between
//! messages and a longer pause between batches. Cancellation is cooperative:
//! the stop flag is checked between claims, never mid-send, so an in-flight
//! message always reaches a recorded outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_common::account::{AccountId, SenderAccount};
use courier_common::error::ErrorKind;
use courier_common::message::QueuedMessage;
use courier_content::ContentProcessor;
use courier_queue::{AccountStore, QueueStore};
use courier_transport::{OutboundEmail, Transport};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{DispatchError, RateGovernor, SendDecision, WorkerCounters};

/// Externally visible state of a worker's processing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Idle,
    Error,
    Stopping,
    NotRunning,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Idle => "idle",
            Self::Error => "error",
            Self::Stopping => "stopping",
            Self::NotRunning => "not_running",
        };
        write!(f, "{s}")
    }
}

/// Worker state shared with the orchestrator: status, counters, last error.
#[derive(Debug)]
pub struct WorkerShared {
    pub account_id: AccountId,
    status: Mutex<ProcessStatus>,
    pub counters: WorkerCounters,
    last_error: Mutex<Option<String>>,
}

impl WorkerShared {
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            status: Mutex::new(ProcessStatus::NotRunning),
            counters: WorkerCounters::new(),
            last_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn status(&self) -> ProcessStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: ProcessStatus) {
        *self.status.lock() = status;
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn set_last_error(&self, error: impl Into<String>) {
        *self.last_error.lock() = Some(error.into());
    }
}

/// Worker tuning shared across accounts; per-account batch size and send
/// delay come from the account record itself.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Pause when the queue is empty or between batches.
    pub idle_sleep: Duration,
    /// How often the worker polls its transport for bounce notices.
    pub bounce_poll_interval: Duration,
    /// Attempts (including the first) before a retryable failure becomes
    /// terminal.
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_secs(15),
            bounce_poll_interval: Duration::from_secs(300),
            max_attempts: 3,
        }
    }
}

/// What one batch pass concluded.
enum BatchOutcome {
    /// Number of messages that reached an outcome this pass.
    Processed(u32),
    /// The account left the sendable set; the worker should exit.
    AccountStopped,
    /// The transport rejected the account's credentials.
    AuthFailed(String),
}

/// One logical unit of execution per sender account.
pub struct DispatchWorker {
    account_id: AccountId,
    accounts: Arc<dyn AccountStore>,
    queue: Arc<dyn QueueStore>,
    governor: RateGovernor,
    processor: ContentProcessor,
    transport: Box<dyn Transport>,
    config: WorkerConfig,
    shared: Arc<WorkerShared>,
}

impl std::fmt::Debug for DispatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("account_id", &self.account_id)
            .finish()
    }
}

impl DispatchWorker {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: AccountId,
        accounts: Arc<dyn AccountStore>,
        queue: Arc<dyn QueueStore>,
        governor: RateGovernor,
        processor: ContentProcessor,
        transport: Box<dyn Transport>,
        config: WorkerConfig,
        shared: Arc<WorkerShared>,
    ) -> Self {
        Self {
            account_id,
            accounts,
            queue,
            governor,
            processor,
            transport,
            config,
            shared,
        }
    }

    /// Run until stopped or until the account leaves the sendable set.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(account = %self.account_id, "dispatch worker starting");

        if let Err(e) = self.transport.authenticate().await {
            error!(account = %self.account_id, error = %e, "authentication failed, worker will not claim");
            self.shared.set_last_error(e.to_string());
            self.shared.set_status(ProcessStatus::Error);
            return;
        }

        self.shared.set_status(ProcessStatus::Running);
        let mut last_bounce_poll = Instant::now();

        loop {
            if *stop.borrow() {
                self.shared.set_status(ProcessStatus::Stopping);
                break;
            }

            let outcome = self.run_batch(&stop).await;

            if last_bounce_poll.elapsed() >= self.config.bounce_poll_interval {
                self.poll_bounces().await;
                last_bounce_poll = Instant::now();
            }

            match outcome {
                Ok(BatchOutcome::AccountStopped) => {
                    info!(account = %self.account_id, "account no longer sendable, worker exiting");
                    break;
                }
                Ok(BatchOutcome::AuthFailed(reason)) => {
                    error!(account = %self.account_id, error = %reason, "credentials rejected mid-flight, worker stopping");
                    self.shared.set_last_error(reason);
                    self.shared.set_status(ProcessStatus::Error);
                    return;
                }
                Ok(BatchOutcome::Processed(0)) => {
                    self.shared.set_status(ProcessStatus::Idle);
                    if self.sleep_or_stop(&mut stop, self.config.idle_sleep).await {
                        self.shared.set_status(ProcessStatus::Stopping);
                        break;
                    }
                    self.shared.set_status(ProcessStatus::Running);
                }
                Ok(BatchOutcome::Processed(_)) => {
                    // Yield between batches.
                    if self.sleep_or_stop(&mut stop, self.config.idle_sleep).await {
                        self.shared.set_status(ProcessStatus::Stopping);
                        break;
                    }
                }
                Err(e) => {
                    warn!(account = %self.account_id, error = %e, "batch pass failed");
                    self.shared.set_last_error(e.to_string());
                    if self.sleep_or_stop(&mut stop, self.config.idle_sleep).await {
                        break;
                    }
                }
            }
        }

        self.shared.set_status(ProcessStatus::NotRunning);
        info!(account = %self.account_id, "dispatch worker stopped");
    }

    /// Sleep for `duration`, waking early on a stop signal. Returns whether a
    /// stop was requested.
    async fn sleep_or_stop(&self, stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
        if *stop.borrow() {
            return true;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => false,
            _ = stop.changed() => *stop.borrow(),
        }
    }

    /// Process up to one batch of claims.
    async fn run_batch(&self, stop: &watch::Receiver<bool>) -> Result<BatchOutcome, DispatchError> {
        let Some(account) = self.accounts.get(&self.account_id).await? else {
            return Ok(BatchOutcome::AccountStopped);
        };

        if !account.status.is_sendable() {
            return Ok(BatchOutcome::AccountStopped);
        }

        let mut processed = 0u32;

        for _ in 0..account.batch_size.max(1) {
            // Cooperative cancellation point: between claims only.
            if *stop.borrow() {
                break;
            }

            let Some(message) = self.queue.claim_next_pending(&self.account_id).await? else {
                break;
            };

            match self.governor.check(&self.account_id).await? {
                SendDecision::Allow => {}
                SendDecision::DailyLimitReached | SendDecision::NotSendable => {
                    // Hand the claim back untouched and bow out.
                    self.queue.release(&message.id).await?;
                    return Ok(BatchOutcome::AccountStopped);
                }
            }

            if let Some(reason) = self.dispatch_one(&account, &message).await? {
                return Ok(BatchOutcome::AuthFailed(reason));
            }
            processed += 1;

            if account.send_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(account.send_delay_ms)).await;
            }
        }

        Ok(BatchOutcome::Processed(processed))
    }

    /// Send one claimed message and record its outcome. Returns the failure
    /// text when the error was account-level (credentials) rather than
    /// message-level.
    async fn dispatch_one(
        &self,
        account: &SenderAccount,
        message: &QueuedMessage,
    ) -> Result<Option<String>, DispatchError> {
        let html = self
            .processor
            .process(&message.html_body, &message.tracking_token);

        let email = OutboundEmail::new(
            account.address.clone(),
            message.recipient.clone(),
            message.subject.clone(),
            html,
        )
        .with_header(
            "List-Unsubscribe",
            format!(
                "<{}/track/unsubscribe/{}>",
                self.processor.base_url().trim_end_matches('/'),
                message.tracking_token
            ),
        );

        let result = self.transport.send(&email).await;

        if result.success {
            let provider_id = result.message_id.clone().unwrap_or_default();
            self.queue.mark_sent(&message.id, &provider_id).await?;
            let count = self.governor.record_send(&self.account_id).await?;
            self.shared.counters.record_sent();

            info!(
                event = "sent",
                account = %self.account_id,
                message = %message.id,
                recipient = %message.recipient,
                provider_id = %provider_id,
                response_ms = result.response_time_ms,
                daily_sent = count,
                "message delivered"
            );
            return Ok(None);
        }

        let error_text = result
            .error
            .clone()
            .unwrap_or_else(|| "send failed".to_string());
        let kind = result.error_kind.unwrap_or(ErrorKind::Unknown);

        self.governor.record_failure(&self.account_id).await?;

        if kind == ErrorKind::Auth {
            // Account-level: the message is blameless, so the claim goes back
            // to pending without an attempt charged against it.
            self.queue.release(&message.id).await?;
            return Ok(Some(error_text));
        }

        self.shared.counters.record_failed();
        self.shared.set_last_error(error_text.clone());

        let next_attempt = message.attempts + 1;
        if kind.is_retryable() && next_attempt < self.config.max_attempts {
            self.queue.requeue_retry(&message.id, &error_text).await?;
            debug!(
                event = "failed",
                account = %self.account_id,
                message = %message.id,
                recipient = %message.recipient,
                kind = %kind,
                attempt = next_attempt,
                "retryable failure, message requeued"
            );
        } else {
            self.queue.mark_failed(&message.id, &error_text).await?;
            warn!(
                event = "failed",
                account = %self.account_id,
                message = %message.id,
                recipient = %message.recipient,
                kind = %kind,
                attempt = next_attempt,
                error = %error_text,
                "message failed terminally"
            );
        }

        Ok(None)
    }

    /// Poll-and-acknowledge bounce cycle: discovery returns an immutable
    /// list, each notice is applied to the queue, then acknowledged as a
    /// separate idempotent step.
    async fn poll_bounces(&self) {
        let notices = match self.transport.check_bounces().await {
            Ok(notices) => notices,
            Err(e) => {
                warn!(account = %self.account_id, error = %e, "bounce poll failed");
                return;
            }
        };

        for notice in notices {
            if let Some(recipient) = &notice.recipient {
                match self
                    .queue
                    .find_sent_by_recipient(&self.account_id, recipient)
                    .await
                {
                    Ok(Some(message)) => {
                        if let Err(e) = self.queue.mark_bounced(&message.id, &notice.reason).await {
                            warn!(message = %message.id, error = %e, "failed to record bounce");
                        } else {
                            self.shared.counters.record_bounced();
                            info!(
                                event = "bounced",
                                account = %self.account_id,
                                message = %message.id,
                                recipient = %recipient,
                                reason = %notice.reason,
                                "bounce recorded"
                            );
                        }
                    }
                    Ok(None) => {
                        debug!(account = %self.account_id, recipient = %recipient, "bounce notice matches no sent message");
                    }
                    Err(e) => {
                        warn!(account = %self.account_id, error = %e, "bounce correlation failed");
                    }
                }
            }

            // Acknowledge regardless of correlation so the notice is not
            // rediscovered forever.
            if let Err(e) = self.transport.acknowledge(&notice).await {
                warn!(account = %self.account_id, provider_ref = %notice.provider_ref, error = %e, "bounce acknowledgment failed");
            }
        }
    }
}
