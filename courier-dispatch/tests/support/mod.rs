//! Test doubles and wiring helpers for dispatch tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use courier_common::account::{AccountId, AccountStatus, SenderAccount, TransportKind};
use courier_common::message::SendResult;
use courier_queue::{MemoryAccountStore, MemoryQueueStore};
use courier_transport::{BounceNotice, OutboundEmail, Transport, TransportError};
use parking_lot::Mutex;

/// Scriptable in-memory transport: fails the first N sends with configured
/// error text, then succeeds; optionally rejects authentication; serves a
/// one-shot list of bounce notices.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<OutboundEmail>>,
    pub acknowledged: Mutex<Vec<String>>,
    fail_script: Mutex<VecDeque<String>>,
    auth_error: Option<String>,
    bounces: Mutex<Vec<BounceNotice>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue error texts returned (in order) by upcoming sends.
    pub fn fail_next_with(self, errors: &[&str]) -> Self {
        self.fail_script
            .lock()
            .extend(errors.iter().map(ToString::to_string));
        self
    }

    pub fn reject_auth(mut self, error: &str) -> Self {
        self.auth_error = Some(error.to_string());
        self
    }

    pub fn with_bounces(self, bounces: Vec<BounceNotice>) -> Self {
        *self.bounces.lock() = bounces;
        self
    }

    pub fn sent_recipients(&self) -> Vec<String> {
        self.sent.lock().iter().map(|e| e.to.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn authenticate(&self) -> Result<(), TransportError> {
        match &self.auth_error {
            Some(error) => Err(TransportError::Auth(error.clone())),
            None => Ok(()),
        }
    }

    async fn send(&self, email: &OutboundEmail) -> SendResult {
        if let Some(error) = self.fail_script.lock().pop_front() {
            return SendResult::rejected(&email.to, error, 1);
        }

        let mut sent = self.sent.lock();
        sent.push(email.clone());
        SendResult::delivered(&email.to, format!("mock-{}", sent.len()), 1)
    }

    async fn check_bounces(&self) -> Result<Vec<BounceNotice>, TransportError> {
        // One-shot: discovered notices are not re-served, mirroring a real
        // mailbox where acknowledged notices leave the unread set.
        Ok(std::mem::take(&mut *self.bounces.lock()))
    }

    async fn acknowledge(&self, notice: &BounceNotice) -> Result<(), TransportError> {
        self.acknowledged.lock().push(notice.provider_ref.clone());
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Smtp
    }
}

/// Boxable handle to a shared [`MockTransport`], letting a test keep a
/// reference to the transport a worker consumed.
pub struct ArcTransport(pub Arc<MockTransport>);

#[async_trait]
impl Transport for ArcTransport {
    async fn authenticate(&self) -> Result<(), TransportError> {
        self.0.authenticate().await
    }

    async fn send(&self, email: &OutboundEmail) -> SendResult {
        self.0.send(email).await
    }

    async fn check_bounces(&self) -> Result<Vec<BounceNotice>, TransportError> {
        self.0.check_bounces().await
    }

    async fn acknowledge(&self, notice: &BounceNotice) -> Result<(), TransportError> {
        self.0.acknowledge(notice).await
    }

    fn kind(&self) -> TransportKind {
        self.0.kind()
    }
}

pub fn test_account(id: &str, daily_limit: u32) -> SenderAccount {
    SenderAccount {
        id: AccountId::new(id),
        address: format!("{id}@example.com"),
        transport: TransportKind::Smtp,
        credential_blob: String::new(),
        status: AccountStatus::Active,
        daily_limit,
        warmup_limit: None,
        batch_size: 10,
        send_delay_ms: 0,
        daily_sent: 0,
        last_reset_date: Utc::now().date_naive(),
        last_used_at: None,
    }
}

pub fn stores() -> (Arc<MemoryAccountStore>, Arc<MemoryQueueStore>) {
    (
        Arc::new(MemoryAccountStore::new()),
        Arc::new(MemoryQueueStore::new()),
    )
}
