//! Sender account model: one outbound mailbox with its own credentials,
//! transport, and daily quota window.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a sender account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The protocol used to actually deliver a message for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Gmail API authenticated with a user OAuth refresh/access token pair.
    Oauth,
    /// Gmail API authenticated with a delegated service-account JWT.
    Jwt,
    /// Raw SMTP with host/port/user/pass.
    Smtp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oauth => write!(f, "oauth"),
            Self::Jwt => write!(f, "jwt"),
            Self::Smtp => write!(f, "smtp"),
        }
    }
}

/// Lifecycle status of a sender account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Eligible for dispatch.
    Active,
    /// Manually paused by an operator.
    Paused,
    /// Building reputation; sendable, possibly under a reduced cap.
    WarmingUp,
    /// Disabled following provider-side problems.
    Suspended,
    /// Hit its daily limit; reactivated at the next UTC day boundary.
    PausedLimitReached,
}

impl AccountStatus {
    /// Whether a dispatch worker may claim and send for this account.
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        matches!(self, Self::Active | Self::WarmingUp)
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::WarmingUp => "warming_up",
            Self::Suspended => "suspended",
            Self::PausedLimitReached => "paused_limit_reached",
        };
        write!(f, "{s}")
    }
}

/// One outbound mailbox identity.
///
/// Owned by the account store; dispatch workers hold the id and re-fetch
/// before every mutation so a stale snapshot is never written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderAccount {
    pub id: AccountId,
    /// The mailbox address messages are sent from.
    pub address: String,
    pub transport: TransportKind,
    /// Base64 of IV-prefixed AES-256-CBC ciphertext holding the credential JSON.
    pub credential_blob: String,
    pub status: AccountStatus,
    /// Maximum sends per UTC day.
    pub daily_limit: u32,
    /// Cap applied instead of `daily_limit` while the account is warming up.
    #[serde(default)]
    pub warmup_limit: Option<u32>,
    /// Messages processed per worker cycle before the longer inter-batch pause.
    pub batch_size: u32,
    /// Delay between consecutive sends on this account.
    pub send_delay_ms: u64,
    /// Sends recorded in the current UTC day window.
    pub daily_sent: u32,
    /// UTC day the counter was last reset.
    pub last_reset_date: NaiveDate,
    /// Unix timestamp (seconds) of the most recent send, if any.
    #[serde(default)]
    pub last_used_at: Option<u64>,
}

impl SenderAccount {
    /// The quota that applies right now: the warm-up cap when one is set and
    /// the account is warming up, the daily limit otherwise.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        match (self.status, self.warmup_limit) {
            (AccountStatus::WarmingUp, Some(cap)) => cap.min(self.daily_limit),
            _ => self.daily_limit,
        }
    }

    /// Whether the stored day window is stale relative to the current UTC day.
    #[must_use]
    pub fn window_expired(&self) -> bool {
        self.last_reset_date < Utc::now().date_naive()
    }
}
