//! Transport adapters: a uniform send/verify/bounce interface over the Gmail
//! API (user OAuth or delegated service-account JWT) and raw SMTP.
//!
//! `send` never propagates an error past the adapter boundary — every failure
//! is folded into a [`SendResult`] with a classified kind, so the dispatch
//! loop has exactly one shape to handle. `authenticate` does fail loudly:
//! a credential problem is an account-level condition, not a per-message one.

mod bounce;
mod error;
pub mod gmail;
mod message;
pub mod smtp;

use std::time::Duration;

use async_trait::async_trait;
use courier_common::{account::TransportKind, message::SendResult};
use courier_vault::Credential;
use serde::{Deserialize, Serialize};

pub use bounce::BounceNotice;
pub use error::TransportError;
pub use gmail::{GmailJwtTransport, GmailOauthTransport};
pub use message::OutboundEmail;
pub use smtp::SmtpTransport;

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_http_timeout() -> u64 {
    30
}

/// Bounded timeouts for transport operations. A hung provider call must
/// surface as a retryable timeout, never leave a message in limbo.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransportTimeouts {
    /// TCP connection establishment (SMTP).
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Individual SMTP commands (EHLO, AUTH, MAIL, RCPT, QUIT).
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// DATA transmission; longer to accommodate large bodies.
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// Whole-request timeout for Gmail API and token-endpoint calls.
    #[serde(default = "default_http_timeout")]
    pub http_secs: u64,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
            http_secs: default_http_timeout(),
        }
    }
}

impl TransportTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }
}

/// The capability set every backend provides.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Validate the credential against the provider. Failing here is an
    /// account-level fault: the owning worker stops claiming and reports the
    /// account as errored.
    async fn authenticate(&self) -> Result<(), TransportError>;

    /// Deliver one message. Never returns `Err`: provider failures are
    /// caught, classified, and folded into the result.
    async fn send(&self, email: &OutboundEmail) -> SendResult;

    /// Deliver a batch sequentially. Bulk send on one account is inherently
    /// serial; there is no hidden parallelism here.
    async fn send_bulk(&self, emails: &[OutboundEmail]) -> Vec<SendResult> {
        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            results.push(self.send(email).await);
        }
        results
    }

    /// Discover bounce notices without mutating provider state. Returns an
    /// immutable list; acknowledgment is a separate, idempotent step so a
    /// crash between the two neither loses nor duplicates a bounce.
    async fn check_bounces(&self) -> Result<Vec<BounceNotice>, TransportError>;

    /// Acknowledge a previously discovered bounce (e.g. mark the provider
    /// message read). Safe to repeat.
    async fn acknowledge(&self, notice: &BounceNotice) -> Result<(), TransportError>;

    fn kind(&self) -> TransportKind;
}

/// Select the adapter for an account's stored transport kind. One match at
/// construction time; from here on everything is `dyn Transport`.
pub fn build_transport(
    sender_address: &str,
    credential: Credential,
    timeouts: TransportTimeouts,
) -> Result<Box<dyn Transport>, TransportError> {
    match credential {
        Credential::Oauth {
            client_id,
            client_secret,
            refresh_token,
        } => Ok(Box::new(GmailOauthTransport::new(
            sender_address,
            client_id,
            client_secret,
            refresh_token,
            timeouts,
        )?)),
        Credential::Jwt {
            service_account_email,
            private_key_pem,
            delegated_user,
        } => Ok(Box::new(GmailJwtTransport::new(
            sender_address,
            service_account_email,
            private_key_pem,
            delegated_user,
            timeouts,
        )?)),
        Credential::Smtp {
            host,
            port,
            secure,
            username,
            password,
        } => Ok(Box::new(SmtpTransport::new(
            sender_address,
            host,
            port,
            secure,
            username,
            password,
            timeouts,
        ))),
    }
}
