//! Gmail adapter authenticated with a user OAuth refresh token.

use std::time::Instant;

use async_trait::async_trait;
use courier_common::{account::TransportKind, message::SendResult};

use super::{GmailMailer, TOKEN_ENDPOINT, TokenGrant, TokenSource, api_error, request_error};
use crate::{BounceNotice, OutboundEmail, Transport, TransportError, TransportTimeouts};

/// Exchanges a long-lived refresh token for short-lived access tokens.
struct RefreshTokenSource {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn fetch(&self, http: &reqwest::Client) -> Result<TokenGrant, TransportError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(request_error)?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| TransportError::Parse(format!("token response: {e}")))
        } else {
            // A rejected refresh token is a credential problem regardless of
            // the exact status the endpoint picked.
            match api_error(response).await {
                TransportError::Api { status, message } if status < 500 => {
                    Err(TransportError::Auth(format!("token refresh rejected ({status}): {message}")))
                }
                other => Err(other),
            }
        }
    }
}

/// Gmail API transport using user OAuth credentials.
#[derive(Debug)]
pub struct GmailOauthTransport {
    mailer: GmailMailer,
    sender: String,
}

impl GmailOauthTransport {
    pub fn new(
        sender: impl Into<String>,
        client_id: String,
        client_secret: String,
        refresh_token: String,
        timeouts: TransportTimeouts,
    ) -> Result<Self, TransportError> {
        let source = RefreshTokenSource {
            client_id,
            client_secret,
            refresh_token,
        };

        Ok(Self {
            mailer: GmailMailer::new(Box::new(source), &timeouts)?,
            sender: sender.into(),
        })
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }
}

#[async_trait]
impl Transport for GmailOauthTransport {
    async fn authenticate(&self) -> Result<(), TransportError> {
        self.mailer.verify().await
    }

    async fn send(&self, email: &OutboundEmail) -> SendResult {
        let start = Instant::now();
        let outcome = self.mailer.send_raw(email).await;
        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(id) => SendResult::delivered(&email.to, id, elapsed),
            Err(e) => SendResult::rejected_as(&email.to, e.to_string(), e.kind(), elapsed),
        }
    }

    async fn check_bounces(&self) -> Result<Vec<BounceNotice>, TransportError> {
        self.mailer.list_bounces().await
    }

    async fn acknowledge(&self, notice: &BounceNotice) -> Result<(), TransportError> {
        self.mailer.mark_read(&notice.provider_ref).await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Oauth
    }
}
