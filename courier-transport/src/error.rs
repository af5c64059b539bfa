use courier_common::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Credential rejected or token exchange failed. Account-level.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-success HTTP response from the Gmail API or token endpoint.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// SMTP server replied with an error code.
    #[error("SMTP error ({code}): {message}")]
    Smtp { code: u16, message: String },

    /// Connection could not be established or was lost mid-session.
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    /// A bounded operation timeout elapsed.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Malformed provider response.
    #[error("Protocol parse error: {0}")]
    Parse(String),

    /// Bad adapter configuration (unsignable key, invalid address, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Classify into the shared dispatch taxonomy. Numeric provider codes
    /// take precedence; everything else is classified from the text.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Api { status, message } => ErrorKind::classify(Some(*status), message),
            Self::Smtp { code, message } => ErrorKind::classify(Some(*code), message),
            Self::Connection(msg) | Self::Tls(msg) => {
                let kind = ErrorKind::classify(None, msg);
                if kind == ErrorKind::Unknown {
                    ErrorKind::Network
                } else {
                    kind
                }
            }
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
                std::io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
                _ => ErrorKind::Network,
            },
            Self::Parse(_) | Self::Config(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether this is an account-level credential failure that should stop
    /// the owning worker rather than fail a single message.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_)) || self.kind() == ErrorKind::Auth
    }
}
