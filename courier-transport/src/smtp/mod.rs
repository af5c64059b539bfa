//! Raw SMTP transport adapter.

pub mod client;
pub mod response;

use std::time::Instant;

use async_trait::async_trait;
use courier_common::{account::TransportKind, message::SendResult};

use crate::{
    BounceNotice, OutboundEmail, Transport, TransportError, TransportTimeouts,
    smtp::client::SmtpClient,
};

/// Sends through a configured SMTP relay with AUTH LOGIN.
///
/// Each send opens its own session: connect, EHLO, (START)TLS, AUTH, MAIL,
/// RCPT, DATA, QUIT. One account's sends are serial by construction, so the
/// extra handshake cost buys freedom from half-dead pooled connections.
#[derive(Debug)]
pub struct SmtpTransport {
    sender: String,
    host: String,
    port: u16,
    secure: bool,
    username: String,
    password: String,
    timeouts: TransportTimeouts,
}

impl SmtpTransport {
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        secure: bool,
        username: impl Into<String>,
        password: impl Into<String>,
        timeouts: TransportTimeouts,
    ) -> Self {
        Self {
            sender: sender.into(),
            host: host.into(),
            port,
            secure,
            username: username.into(),
            password: password.into(),
            timeouts,
        }
    }

    /// The domain we introduce ourselves as in EHLO.
    fn helo_domain(&self) -> &str {
        self.sender.rsplit('@').next().unwrap_or("localhost")
    }

    /// Open a session and authenticate, leaving the client ready for a
    /// MAIL FROM.
    async fn open_session(&self) -> Result<SmtpClient, TransportError> {
        let mut client =
            SmtpClient::connect(&self.host, self.port, self.secure, &self.timeouts).await?;

        let greeting = client.read_greeting().await?;
        if !greeting.is_success() {
            return Err(greeting.into_error());
        }

        let mut ehlo = client.ehlo(self.helo_domain()).await?;
        if !ehlo.is_success() {
            return Err(ehlo.into_error());
        }

        // Opportunistic STARTTLS on plaintext sessions when offered.
        if !self.secure && ehlo.advertises("STARTTLS") {
            client.starttls().await?;
            ehlo = client.ehlo(self.helo_domain()).await?;
            if !ehlo.is_success() {
                return Err(ehlo.into_error());
            }
        }

        if !self.username.is_empty() {
            client.auth_login(&self.username, &self.password).await?;
        }

        Ok(client)
    }

    /// Full transaction for one message. Returns the local Message-ID used
    /// as the provider reference.
    async fn transact(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        let mut client = self.open_session().await?;

        let reply = client.mail_from(&email.from).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        let reply = client.rcpt_to(&email.to).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        let reply = client.data().await?;
        if !reply.is_intermediate() {
            return Err(reply.into_error());
        }

        let message_id = email.local_message_id();
        let raw = email.to_rfc2822(&message_id);
        let reply = client.send_data(&raw, self.timeouts.data()).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        // Delivery already succeeded; a QUIT failure is only worth a log line.
        if let Err(e) = client.quit().await {
            tracing::debug!(host = %self.host, error = %e, "QUIT after successful delivery failed");
        }

        Ok(message_id)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    /// Verify the session end-to-end: connect, negotiate TLS, authenticate,
    /// QUIT. Surfaces credential problems before any message is claimed.
    async fn authenticate(&self) -> Result<(), TransportError> {
        let mut client = self.open_session().await?;
        if let Err(e) = client.quit().await {
            tracing::debug!(host = %self.host, error = %e, "QUIT after verification failed");
        }
        Ok(())
    }

    async fn send(&self, email: &OutboundEmail) -> SendResult {
        let start = Instant::now();
        let outcome = self.transact(email).await;
        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(message_id) => SendResult::delivered(&email.to, message_id, elapsed),
            Err(e) => SendResult::rejected_as(&email.to, e.to_string(), e.kind(), elapsed),
        }
    }

    /// SMTP relays have no mailbox for us to scan; bounces for SMTP accounts
    /// arrive through the external webhook/route layer instead.
    async fn check_bounces(&self) -> Result<Vec<BounceNotice>, TransportError> {
        Ok(Vec::new())
    }

    async fn acknowledge(&self, _notice: &BounceNotice) -> Result<(), TransportError> {
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Smtp
    }
}
