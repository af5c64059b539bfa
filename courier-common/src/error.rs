//! Failure classification shared by every transport and the dispatch loop.
//!
//! Providers report failures as a grab-bag of OS error codes, HTTP statuses,
//! SMTP reply codes, and prose. The dispatcher only cares about one thing:
//! is the failure worth another attempt. `ErrorKind` is that single decision
//! point; everything that can fail a send funnels through [`ErrorKind::classify`].

use serde::{Deserialize, Serialize};

/// Classified failure kind for a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionRefused,
    Network,
    Auth,
    Quota,
    InvalidInput,
    NotFound,
    Permission,
    Unknown,
}

impl ErrorKind {
    /// Classify a failure from an optional numeric code (HTTP status or SMTP
    /// reply) and the error text.
    ///
    /// Code-based classification wins over substring matching so a message
    /// like "429 too many requests: invalid mailbox state" lands on `Quota`,
    /// not `InvalidInput`.
    #[must_use]
    pub fn classify(code: Option<u16>, message: &str) -> Self {
        if let Some(kind) = code.and_then(Self::from_code) {
            return kind;
        }

        let lower = message.to_ascii_lowercase();

        if lower.contains("etimedout") || lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("econnrefused") || lower.contains("connection refused") {
            Self::ConnectionRefused
        } else if lower.contains("enotfound")
            || lower.contains("econnreset")
            || lower.contains("epipe")
            || lower.contains("dns")
            || lower.contains("network")
            || lower.contains("socket")
            || lower.contains("connection closed")
        {
            Self::Network
        } else if lower.contains("auth")
            || lower.contains("credential")
            || lower.contains("invalid_grant")
            || lower.contains("unauthorized")
        {
            Self::Auth
        } else if lower.contains("quota")
            || lower.contains("rate limit")
            || lower.contains("too many")
        {
            Self::Quota
        } else if lower.contains("forbidden") || lower.contains("permission") {
            Self::Permission
        } else if lower.contains("not found") || lower.contains("does not exist") {
            Self::NotFound
        } else if lower.contains("invalid") || lower.contains("malformed") {
            Self::InvalidInput
        } else {
            Self::Unknown
        }
    }

    /// Map a numeric provider code to a kind, where the code is decisive on
    /// its own. HTTP statuses and SMTP reply codes share ranges without
    /// colliding on the values used here.
    const fn from_code(code: u16) -> Option<Self> {
        match code {
            // HTTP
            400 => Some(Self::InvalidInput),
            401 => Some(Self::Auth),
            403 => Some(Self::Permission),
            404 => Some(Self::NotFound),
            408 => Some(Self::Timeout),
            429 => Some(Self::Quota),
            // SMTP
            421 | 450 | 451 => Some(Self::Network),
            452 => Some(Self::Quota),
            454 | 530 | 535 => Some(Self::Auth),
            550 | 553 => Some(Self::InvalidInput),
            _ => None,
        }
    }

    /// Whether a failure of this kind may succeed on a later attempt.
    ///
    /// Transient transport conditions retry; anything pointing at the message
    /// or the account configuration fails the message immediately.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionRefused | Self::Network | Self::Quota
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Permission => "permission",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Convenience wrapper matching the shape callers reach for in the dispatch
/// loop: classify raw error text and ask if it is retryable, in one step.
#[must_use]
pub fn is_retryable_error(message: &str) -> bool {
    ErrorKind::classify(None, message).is_retryable()
}
