//! Store traits consumed by workers and the orchestrator.

use async_trait::async_trait;
use chrono::NaiveDate;
use courier_common::{
    account::{AccountId, AccountStatus, SenderAccount},
    message::{MessageId, QueuedMessage},
};
use serde::{Deserialize, Serialize};

use crate::QueueError;

/// Counts per lifecycle state, for the control surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub sent: usize,
    pub failed: usize,
    pub bounced: usize,
}

impl QueueStats {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.processing + self.sent + self.failed + self.bounced
    }
}

/// The shared, persisted backlog of campaign emails.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add one message per recipient for a campaign. Returns the new ids in
    /// recipient order.
    async fn enqueue(
        &self,
        campaign_id: &str,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<Vec<MessageId>, QueueError>;

    /// Atomically claim the oldest pending message this account may send:
    /// either unassigned or already assigned to it. On success the message is
    /// `Processing` and assigned; `None` when nothing is claimable.
    ///
    /// The conditional update is the only cross-worker race in the system;
    /// losing it is silent and the caller just asks again.
    async fn claim_next_pending(
        &self,
        account: &AccountId,
    ) -> Result<Option<QueuedMessage>, QueueError>;

    /// Return a claimed message to `Pending` without consuming an attempt
    /// (used when the governor denies the send after the claim).
    async fn release(&self, id: &MessageId) -> Result<(), QueueError>;

    /// Terminal success: `Processing -> Sent`, recording the provider id.
    async fn mark_sent(&self, id: &MessageId, provider_message_id: &str)
    -> Result<(), QueueError>;

    /// Terminal failure: `Processing -> Failed`, recording the error.
    async fn mark_failed(&self, id: &MessageId, error: &str) -> Result<(), QueueError>;

    /// Retryable failure: `Processing -> Pending` with `attempts + 1` and the
    /// error recorded.
    async fn requeue_retry(&self, id: &MessageId, error: &str) -> Result<(), QueueError>;

    /// Post-delivery bounce: `Sent -> Bounced`. The only transition allowed
    /// out of a terminal state.
    async fn mark_bounced(&self, id: &MessageId, info: &str) -> Result<(), QueueError>;

    /// Most recent `Sent` message for a recipient on this account, used to
    /// correlate bounce notices back to a message.
    async fn find_sent_by_recipient(
        &self,
        account: &AccountId,
        recipient: &str,
    ) -> Result<Option<QueuedMessage>, QueueError>;

    async fn get(&self, id: &MessageId) -> Result<Option<QueuedMessage>, QueueError>;

    /// Re-surface every `Processing` message as `Pending`. Run once at
    /// startup before workers spawn, so a crash mid-send never strands a
    /// message. Returns the number of recovered messages.
    async fn recover_stale(&self) -> Result<usize, QueueError>;

    async fn stats(&self) -> Result<QueueStats, QueueError>;
}

/// The sender-account registry.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: &AccountId) -> Result<Option<SenderAccount>, QueueError>;

    async fn list(&self) -> Result<Vec<SenderAccount>, QueueError>;

    async fn upsert(&self, account: SenderAccount) -> Result<(), QueueError>;

    async fn update_status(&self, id: &AccountId, status: AccountStatus)
    -> Result<(), QueueError>;

    /// Durably increment the daily counter; returns the new count. Must be
    /// flushed before the owning worker's next claim.
    async fn increment_daily_sent(&self, id: &AccountId) -> Result<u32, QueueError>;

    /// Reset the day window: zero the counter and stamp the reset date.
    /// Exactly-once-per-day is the caller's invariant; calling this twice for
    /// the same date is harmless.
    async fn reset_daily_window(&self, id: &AccountId, date: NaiveDate) -> Result<(), QueueError>;

    async fn touch_last_used(&self, id: &AccountId, at: u64) -> Result<(), QueueError>;
}
