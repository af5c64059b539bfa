//! In-memory store implementations.
//!
//! State lives behind a single `parking_lot::Mutex`, which makes the claim's
//! select-and-mark a genuinely atomic step. Suitable for tests and for
//! single-process deployments where the backlog fits in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use courier_common::{
    account::{AccountId, AccountStatus, SenderAccount},
    message::{MessageId, MessageStatus, QueuedMessage, unix_now},
};
use parking_lot::Mutex;

use crate::{AccountStore, QueueError, QueueStats, QueueStore};

/// In-memory [`QueueStore`].
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    messages: Mutex<HashMap<MessageId, QueuedMessage>>,
}

impl MemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prepared message directly, preserving its state. Used to
    /// seed scenarios.
    pub fn insert(&self, message: QueuedMessage) {
        self.messages.lock().insert(message.id.clone(), message);
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    fn with_message<T>(
        &self,
        id: &MessageId,
        f: impl FnOnce(&mut QueuedMessage) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let mut messages = self.messages.lock();
        let message = messages
            .get_mut(id)
            .ok_or_else(|| QueueError::MessageNotFound(id.clone()))?;
        f(message)
    }
}

fn invalid_transition(msg: &QueuedMessage, to: MessageStatus) -> QueueError {
    QueueError::InvalidTransition {
        id: msg.id.clone(),
        from: msg.status.to_string(),
        to: to.to_string(),
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(
        &self,
        campaign_id: &str,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<Vec<MessageId>, QueueError> {
        let mut messages = self.messages.lock();
        let mut ids = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let message = QueuedMessage::new(campaign_id, recipient.clone(), subject, html_body);
            ids.push(message.id.clone());
            messages.insert(message.id.clone(), message);
        }

        Ok(ids)
    }

    async fn claim_next_pending(
        &self,
        account: &AccountId,
    ) -> Result<Option<QueuedMessage>, QueueError> {
        let mut messages = self.messages.lock();

        // Oldest pending first: ULIDs sort by creation time.
        let candidate = messages
            .values()
            .filter(|m| {
                m.status == MessageStatus::Pending
                    && m.assigned_account
                        .as_ref()
                        .is_none_or(|assigned| assigned == account)
            })
            .min_by(|a, b| a.id.cmp(&b.id))
            .map(|m| m.id.clone());

        let Some(id) = candidate else {
            return Ok(None);
        };

        // Still under the same lock, so the pending check and the mark are
        // one step: no other claimer can interleave.
        let message = messages
            .get_mut(&id)
            .ok_or_else(|| QueueError::MessageNotFound(id.clone()))?;
        message.status = MessageStatus::Processing;
        message.assigned_account = Some(account.clone());

        Ok(Some(message.clone()))
    }

    async fn release(&self, id: &MessageId) -> Result<(), QueueError> {
        self.with_message(id, |msg| {
            if msg.status != MessageStatus::Processing {
                return Err(invalid_transition(msg, MessageStatus::Pending));
            }
            msg.status = MessageStatus::Pending;
            Ok(())
        })
    }

    async fn mark_sent(
        &self,
        id: &MessageId,
        provider_message_id: &str,
    ) -> Result<(), QueueError> {
        self.with_message(id, |msg| {
            if msg.status != MessageStatus::Processing {
                return Err(invalid_transition(msg, MessageStatus::Sent));
            }
            msg.status = MessageStatus::Sent;
            msg.attempts += 1;
            msg.last_error = None;
            msg.provider_message_id = Some(provider_message_id.to_string());
            msg.sent_at = Some(unix_now());
            Ok(())
        })
    }

    async fn mark_failed(&self, id: &MessageId, error: &str) -> Result<(), QueueError> {
        self.with_message(id, |msg| {
            if msg.status != MessageStatus::Processing {
                return Err(invalid_transition(msg, MessageStatus::Failed));
            }
            msg.status = MessageStatus::Failed;
            msg.attempts += 1;
            msg.last_error = Some(error.to_string());
            Ok(())
        })
    }

    async fn requeue_retry(&self, id: &MessageId, error: &str) -> Result<(), QueueError> {
        self.with_message(id, |msg| {
            if msg.status != MessageStatus::Processing {
                return Err(invalid_transition(msg, MessageStatus::Pending));
            }
            msg.status = MessageStatus::Pending;
            msg.attempts += 1;
            msg.last_error = Some(error.to_string());
            Ok(())
        })
    }

    async fn mark_bounced(&self, id: &MessageId, info: &str) -> Result<(), QueueError> {
        self.with_message(id, |msg| {
            if msg.status != MessageStatus::Sent {
                return Err(invalid_transition(msg, MessageStatus::Bounced));
            }
            msg.status = MessageStatus::Bounced;
            msg.last_error = Some(info.to_string());
            Ok(())
        })
    }

    async fn find_sent_by_recipient(
        &self,
        account: &AccountId,
        recipient: &str,
    ) -> Result<Option<QueuedMessage>, QueueError> {
        let messages = self.messages.lock();
        Ok(messages
            .values()
            .filter(|m| {
                m.status == MessageStatus::Sent
                    && m.recipient == recipient
                    && m.assigned_account.as_ref() == Some(account)
            })
            .max_by(|a, b| a.sent_at.cmp(&b.sent_at))
            .cloned())
    }

    async fn get(&self, id: &MessageId) -> Result<Option<QueuedMessage>, QueueError> {
        Ok(self.messages.lock().get(id).cloned())
    }

    async fn recover_stale(&self) -> Result<usize, QueueError> {
        let mut messages = self.messages.lock();
        let mut recovered = 0;

        for message in messages.values_mut() {
            if message.status == MessageStatus::Processing {
                message.status = MessageStatus::Pending;
                recovered += 1;
            }
        }

        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let messages = self.messages.lock();
        let mut stats = QueueStats::default();

        for message in messages.values() {
            match message.status {
                MessageStatus::Pending => stats.pending += 1,
                MessageStatus::Processing => stats.processing += 1,
                MessageStatus::Sent => stats.sent += 1,
                MessageStatus::Failed => stats.failed += 1,
                MessageStatus::Bounced => stats.bounced += 1,
            }
        }

        Ok(stats)
    }
}

/// In-memory [`AccountStore`].
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<AccountId, SenderAccount>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_account<T>(
        &self,
        id: &AccountId,
        f: impl FnOnce(&mut SenderAccount) -> T,
    ) -> Result<T, QueueError> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| QueueError::AccountNotFound(id.clone()))?;
        Ok(f(account))
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: &AccountId) -> Result<Option<SenderAccount>, QueueError> {
        Ok(self.accounts.lock().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<SenderAccount>, QueueError> {
        let mut accounts: Vec<_> = self.accounts.lock().values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn upsert(&self, account: SenderAccount) -> Result<(), QueueError> {
        self.accounts.lock().insert(account.id.clone(), account);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &AccountId,
        status: AccountStatus,
    ) -> Result<(), QueueError> {
        self.with_account(id, |account| account.status = status)
    }

    async fn increment_daily_sent(&self, id: &AccountId) -> Result<u32, QueueError> {
        self.with_account(id, |account| {
            account.daily_sent += 1;
            account.daily_sent
        })
    }

    async fn reset_daily_window(&self, id: &AccountId, date: NaiveDate) -> Result<(), QueueError> {
        self.with_account(id, |account| {
            account.daily_sent = 0;
            account.last_reset_date = date;
        })
    }

    async fn touch_last_used(&self, id: &AccountId, at: u64) -> Result<(), QueueError> {
        self.with_account(id, |account| account.last_used_at = Some(at))
    }
}
