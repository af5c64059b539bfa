//! Per-account send gating: daily quota, UTC day rollover, and the
//! `paused_limit_reached` transition.
//!
//! Counters live in the account store so they are durable before the owning
//! worker's next claim. Only one worker touches a given account's counters,
//! so there is no cross-worker locking here — just read, decide, write.

use std::sync::Arc;

use chrono::Utc;
use courier_common::account::{AccountId, AccountStatus, SenderAccount};
use courier_common::message::unix_now;
use courier_queue::AccountStore;

use crate::DispatchError;

/// Outcome of a pre-send check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDecision {
    /// Quota available; proceed with the send.
    Allow,
    /// The day window is exhausted. The account has been transitioned to
    /// `PausedLimitReached`; the orchestrator reactivates it after the next
    /// UTC rollover.
    DailyLimitReached,
    /// The account status does not permit sending at all.
    NotSendable,
}

/// Gate in front of every send.
#[derive(Clone)]
pub struct RateGovernor {
    accounts: Arc<dyn AccountStore>,
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RateGovernor")
    }
}

impl RateGovernor {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    async fn fetch(&self, id: &AccountId) -> Result<SenderAccount, DispatchError> {
        self.accounts
            .get(id)
            .await?
            .ok_or_else(|| DispatchError::AccountNotFound(id.clone()))
    }

    /// Apply the day rollover if the stored window is stale, exactly once per
    /// boundary. Returns the account with the rollover reflected.
    async fn rolled_over(&self, id: &AccountId) -> Result<SenderAccount, DispatchError> {
        let mut account = self.fetch(id).await?;

        if account.window_expired() {
            let today = Utc::now().date_naive();
            self.accounts.reset_daily_window(id, today).await?;
            account.daily_sent = 0;
            account.last_reset_date = today;
        }

        Ok(account)
    }

    /// May this account send right now.
    pub async fn check(&self, id: &AccountId) -> Result<SendDecision, DispatchError> {
        let account = self.rolled_over(id).await?;

        if !account.status.is_sendable() {
            return Ok(SendDecision::NotSendable);
        }

        if account.daily_sent >= account.effective_limit() {
            // Normally record_send flips the status at the moment the limit
            // is reached; this path covers a limit lowered mid-window or a
            // crash between the increment and the status write.
            self.accounts
                .update_status(id, AccountStatus::PausedLimitReached)
                .await?;
            return Ok(SendDecision::DailyLimitReached);
        }

        Ok(SendDecision::Allow)
    }

    /// Record a successful send: durable counter increment, last-used stamp,
    /// and the `PausedLimitReached` transition when this send exhausted the
    /// window. Returns the new count.
    pub async fn record_send(&self, id: &AccountId) -> Result<u32, DispatchError> {
        let count = self.accounts.increment_daily_sent(id).await?;
        self.accounts.touch_last_used(id, unix_now()).await?;

        let account = self.fetch(id).await?;
        if count >= account.effective_limit() && account.status.is_sendable() {
            self.accounts
                .update_status(id, AccountStatus::PausedLimitReached)
                .await?;
        }

        Ok(count)
    }

    /// Record a failed attempt. Failed sends consume no quota — the attempt
    /// counter lives on the message, not here — so this only stamps activity.
    pub async fn record_failure(&self, id: &AccountId) -> Result<(), DispatchError> {
        self.accounts.touch_last_used(id, unix_now()).await
            .map_err(DispatchError::from)
    }

    /// Flip a limit-paused account back to `Active` once its window has
    /// rolled over. Called from the orchestrator's housekeeping tick; returns
    /// whether a reactivation happened.
    pub async fn reactivate_if_reset(&self, id: &AccountId) -> Result<bool, DispatchError> {
        let account = self.fetch(id).await?;

        if account.status != AccountStatus::PausedLimitReached {
            return Ok(false);
        }

        if !account.window_expired() && account.daily_sent >= account.effective_limit() {
            return Ok(false);
        }

        if account.window_expired() {
            self.accounts
                .reset_daily_window(id, Utc::now().date_naive())
                .await?;
        }
        self.accounts
            .update_status(id, AccountStatus::Active)
            .await?;
        Ok(true)
    }
}
