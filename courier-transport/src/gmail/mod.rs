//! Gmail API plumbing shared by the OAuth and JWT adapters.
//!
//! Both adapters speak the same REST surface; they differ only in how an
//! access token is obtained. That difference is isolated behind
//! [`TokenSource`], and everything else lives in [`GmailMailer`].

mod jwt;
mod oauth;

pub use jwt::GmailJwtTransport;
pub use oauth::GmailOauthTransport;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::{BounceNotice, OutboundEmail, TransportError, TransportTimeouts};

pub(crate) const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Scopes requested by both Gmail adapters: send plus the label mutation
/// needed to acknowledge bounce notices.
pub(crate) const GMAIL_SCOPES: &str =
    "https://www.googleapis.com/auth/gmail.send https://www.googleapis.com/auth/gmail.modify";

/// Query selecting unread delivery-status notifications.
const BOUNCE_QUERY: &str = "from:(mailer-daemon OR postmaster) is:unread";
const BOUNCE_PAGE_SIZE: u32 = 25;

/// A freshly issued access token and its lifetime in seconds.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenGrant {
    pub access_token: String,
    #[serde(default = "default_expiry")]
    pub expires_in: u64,
}

const fn default_expiry() -> u64 {
    3600
}

/// How an adapter turns its credential into an access token.
#[async_trait]
pub(crate) trait TokenSource: Send + Sync {
    async fn fetch(&self, http: &reqwest::Client) -> Result<TokenGrant, TransportError>;
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Shared Gmail REST client with token caching.
pub(crate) struct GmailMailer {
    http: reqwest::Client,
    source: Box<dyn TokenSource>,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GmailMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GmailMailer")
    }
}

impl GmailMailer {
    pub(crate) fn new(
        source: Box<dyn TokenSource>,
        timeouts: &TransportTimeouts,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.http())
            .build()
            .map_err(|e| TransportError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            source,
            cached: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, refreshing through the token source when
    /// the cached one is missing or within a minute of expiry.
    pub(crate) async fn bearer(&self) -> Result<String, TransportError> {
        if let Some(cached) = self.cached.lock().clone() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token);
            }
        }

        let grant = self.source.fetch(&self.http).await?;
        let ttl = Duration::from_secs(grant.expires_in.saturating_sub(60));
        let token = grant.access_token;

        *self.cached.lock() = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(token)
    }

    /// Force a token round trip; used by `authenticate`.
    pub(crate) async fn verify(&self) -> Result<(), TransportError> {
        *self.cached.lock() = None;
        self.bearer().await.map(|_| ())
    }

    /// Submit a message and return the Gmail message id.
    pub(crate) async fn send_raw(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        #[derive(Deserialize)]
        struct SendResponse {
            id: String,
        }

        let token = self.bearer().await?;
        let message_id = email.local_message_id();
        let raw = URL_SAFE_NO_PAD.encode(email.to_rfc2822(&message_id));

        let response = self
            .http
            .post(format!("{API_BASE}/users/me/messages/send"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(request_error)?;

        if response.status().is_success() {
            let sent: SendResponse = response
                .json()
                .await
                .map_err(|e| TransportError::Parse(format!("send response: {e}")))?;
            Ok(sent.id)
        } else {
            Err(api_error(response).await)
        }
    }

    /// Discover unread bounce notifications. Read-only: nothing is marked
    /// until [`Self::mark_read`].
    pub(crate) async fn list_bounces(&self) -> Result<Vec<BounceNotice>, TransportError> {
        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            messages: Vec<MessageRef>,
        }

        #[derive(Deserialize)]
        struct MessageRef {
            id: String,
        }

        let token = self.bearer().await?;
        let page_size = BOUNCE_PAGE_SIZE.to_string();
        let response = self
            .http
            .get(format!("{API_BASE}/users/me/messages"))
            .bearer_auth(&token)
            .query(&[("q", BOUNCE_QUERY), ("maxResults", page_size.as_str())])
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let listing: ListResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(format!("list response: {e}")))?;

        let mut notices = Vec::with_capacity(listing.messages.len());
        for reference in listing.messages {
            match self.fetch_notice(&token, &reference.id).await {
                Ok(notice) => notices.push(notice),
                Err(e) => {
                    tracing::warn!(message = %reference.id, error = %e, "failed to fetch bounce notice");
                }
            }
        }

        Ok(notices)
    }

    async fn fetch_notice(
        &self,
        token: &str,
        id: &str,
    ) -> Result<BounceNotice, TransportError> {
        #[derive(Deserialize)]
        struct Metadata {
            #[serde(default)]
            snippet: String,
            #[serde(default)]
            payload: Payload,
        }

        #[derive(Deserialize, Default)]
        struct Payload {
            #[serde(default)]
            headers: Vec<Header>,
        }

        #[derive(Deserialize)]
        struct Header {
            name: String,
            value: String,
        }

        let response = self
            .http
            .get(format!("{API_BASE}/users/me/messages/{id}"))
            .bearer_auth(token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "X-Failed-Recipients"),
                ("metadataHeaders", "Subject"),
            ])
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let meta: Metadata = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(format!("message metadata: {e}")))?;

        let header = |name: &str| {
            meta.payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };

        let recipient = header("X-Failed-Recipients");
        let reason = match header("Subject") {
            Some(subject) if !meta.snippet.is_empty() => {
                format!("{subject}: {}", meta.snippet)
            }
            Some(subject) => subject,
            None => meta.snippet,
        };

        Ok(BounceNotice::new(id, recipient, reason))
    }

    /// Acknowledge a notice by clearing its UNREAD label. Idempotent: Gmail
    /// treats removing an absent label as a no-op.
    pub(crate) async fn mark_read(&self, provider_ref: &str) -> Result<(), TransportError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(format!("{API_BASE}/users/me/messages/{provider_ref}/modify"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "removeLabelIds": ["UNREAD"] }))
            .send()
            .await
            .map_err(request_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }
}

/// Map a reqwest failure onto the transport taxonomy.
pub(crate) fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Connection(format!("request failed: {e}"))
    }
}

/// Convert a non-success HTTP response into a typed error, folding 401/403
/// token problems into `Auth`.
pub(crate) async fn api_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = body.chars().take(512).collect::<String>();

    if status == 401 {
        TransportError::Auth(message)
    } else {
        TransportError::Api { status, message }
    }
}
