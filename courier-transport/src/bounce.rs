//! Bounce notices discovered by transports.

use courier_common::message::unix_now;

/// One delivery failure reported back by the provider (a mailer-daemon
/// message, typically). Discovery and acknowledgment are separate steps:
/// this struct is what flows between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BounceNotice {
    /// Provider-side reference (e.g. the Gmail message id of the DSN),
    /// used to acknowledge the notice.
    pub provider_ref: String,
    /// The recipient that bounced, when the notice carries it.
    pub recipient: Option<String>,
    /// Human-readable failure text.
    pub reason: String,
    /// Unix timestamp (seconds) when the notice was discovered.
    pub observed_at: u64,
}

impl BounceNotice {
    #[must_use]
    pub fn new(provider_ref: impl Into<String>, recipient: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            provider_ref: provider_ref.into(),
            recipient,
            reason: reason.into(),
            observed_at: unix_now(),
        }
    }
}
