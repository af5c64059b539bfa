//! Queued message model and per-attempt send results.

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::ErrorKind;

/// Identifier for a queued message.
///
/// A ULID: lexicographically sortable by creation time, so the store's
/// oldest-pending-first claim ordering falls out of an id sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    id: ulid::Ulid,
}

impl MessageId {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Parse an id previously produced by [`MessageId::to_string`].
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self {
            id: ulid::Ulid::from_string(s)?,
        })
    }

    /// Milliseconds since the Unix epoch encoded in this id.
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Opaque token correlating one sent message to later open/click/unsubscribe
/// callbacks. Generated once at enqueue time and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingToken(String);

impl TrackingToken {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of a queued message.
///
/// Transitions are monotone along `Pending -> Processing -> {Sent | Failed}`;
/// `Sent -> Bounced` is the only edge out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Bounced,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Bounced => "bounced",
        };
        write!(f, "{s}")
    }
}

/// One recipient-scoped send obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: MessageId,
    pub campaign_id: String,
    pub recipient: String,
    pub subject: String,
    /// Rendered HTML body, before tracking rewrites are applied.
    pub html_body: String,
    pub status: MessageStatus,
    /// The account that claimed this message; `None` until first claimed.
    pub assigned_account: Option<AccountId>,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Provider-side id returned on a successful send.
    pub provider_message_id: Option<String>,
    pub tracking_token: TrackingToken,
    /// Unix timestamp (seconds) the message entered the queue.
    pub enqueued_at: u64,
    pub sent_at: Option<u64>,
    pub opened_at: Option<u64>,
    pub clicked_at: Option<u64>,
}

impl QueuedMessage {
    #[must_use]
    pub fn new(
        campaign_id: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            campaign_id: campaign_id.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            html_body: html_body.into(),
            status: MessageStatus::Pending,
            assigned_account: None,
            attempts: 0,
            last_error: None,
            provider_message_id: None,
            tracking_token: TrackingToken::generate(),
            enqueued_at: unix_now(),
            sent_at: None,
            opened_at: None,
            clicked_at: None,
        }
    }
}

/// Outcome of a single send attempt.
///
/// Transient: folded into the queued message's state and the governor's
/// counters, never persisted on its own.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub success: bool,
    /// Provider message id on success.
    pub message_id: Option<String>,
    /// Error text on failure.
    pub error: Option<String>,
    /// Classified failure kind, used for the retry decision.
    pub error_kind: Option<ErrorKind>,
    pub recipient: String,
    pub response_time_ms: u64,
}

impl SendResult {
    #[must_use]
    pub fn delivered(recipient: impl Into<String>, message_id: String, elapsed_ms: u64) -> Self {
        Self {
            success: true,
            message_id: Some(message_id),
            error: None,
            error_kind: None,
            recipient: recipient.into(),
            response_time_ms: elapsed_ms,
        }
    }

    #[must_use]
    pub fn rejected(recipient: impl Into<String>, error: String, elapsed_ms: u64) -> Self {
        let kind = ErrorKind::classify(None, &error);
        Self::rejected_as(recipient, error, kind, elapsed_ms)
    }

    /// Build a failure result when the caller already classified the error
    /// (e.g. from a provider status code).
    #[must_use]
    pub fn rejected_as(
        recipient: impl Into<String>,
        error: String,
        kind: ErrorKind,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error),
            error_kind: Some(kind),
            recipient: recipient.into(),
            response_time_ms: elapsed_ms,
        }
    }

    /// Whether the failure (if any) is worth requeueing.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.error_kind.is_some_and(ErrorKind::is_retryable)
    }
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
