//! Gmail adapter authenticated with a delegated service-account JWT.

use std::time::Instant;

use async_trait::async_trait;
use courier_common::{account::TransportKind, message::SendResult};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use super::{
    GMAIL_SCOPES, GmailMailer, TOKEN_ENDPOINT, TokenGrant, TokenSource, api_error, request_error,
};
use crate::{BounceNotice, OutboundEmail, Transport, TransportError, TransportTimeouts};

/// Assertion lifetime; Google rejects anything over an hour.
const ASSERTION_TTL_SECS: u64 = 3600;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Builds an RS256 service-account assertion per request and exchanges it via
/// the `jwt-bearer` grant. Domain-wide delegation: `sub` is the mailbox the
/// service account impersonates.
struct JwtTokenSource {
    service_account_email: String,
    signing_key: EncodingKey,
    delegated_user: String,
}

impl JwtTokenSource {
    fn assertion(&self) -> Result<String, TransportError> {
        let now = courier_common::message::unix_now();
        let claims = Claims {
            iss: &self.service_account_email,
            sub: &self.delegated_user,
            scope: GMAIL_SCOPES,
            aud: TOKEN_ENDPOINT,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| TransportError::Auth(format!("failed to sign assertion: {e}")))
    }
}

#[async_trait]
impl TokenSource for JwtTokenSource {
    async fn fetch(&self, http: &reqwest::Client) -> Result<TokenGrant, TransportError> {
        let assertion = self.assertion()?;
        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
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
            match api_error(response).await {
                TransportError::Api { status, message } if status < 500 => Err(
                    TransportError::Auth(format!("assertion rejected ({status}): {message}")),
                ),
                other => Err(other),
            }
        }
    }
}

/// Gmail API transport using domain-wide-delegation service-account
/// credentials.
#[derive(Debug)]
pub struct GmailJwtTransport {
    mailer: GmailMailer,
    sender: String,
}

impl GmailJwtTransport {
    pub fn new(
        sender: impl Into<String>,
        service_account_email: String,
        private_key_pem: String,
        delegated_user: String,
        timeouts: TransportTimeouts,
    ) -> Result<Self, TransportError> {
        // An unparseable key is a configuration error surfaced at
        // construction, not a per-send failure.
        let signing_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| TransportError::Config(format!("invalid service-account key: {e}")))?;

        let source = JwtTokenSource {
            service_account_email,
            signing_key,
            delegated_user,
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
impl Transport for GmailJwtTransport {
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
        TransportKind::Jwt
    }
}
