//! Minimal async SMTP client: plain TCP, implicit TLS, or STARTTLS upgrade,
//! with AUTH LOGIN and bounded per-command timeouts.

use std::{sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::response::Reply;
use crate::{TransportError, TransportTimeouts};

const BUFFER_SIZE: usize = 8192;
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(TransportError::Connection(
                "connection closed by server".to_string(),
            ));
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, host: &str) -> Result<Self, TransportError> {
        match self {
            Self::Plain(stream) => {
                let connector = tls_connector()?;
                let server_name = ServerName::try_from(host.to_string())
                    .map_err(|e| TransportError::Tls(format!("invalid server name: {e}")))?;
                let tls = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| TransportError::Tls(e.to_string()))?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(TransportError::Tls("connection is already TLS".to_string())),
        }
    }
}

fn tls_connector() -> Result<TlsConnector, TransportError> {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store
            .add(cert)
            .map_err(|e| TransportError::Tls(format!("failed to add certificate: {e}")))?;
    }
    if !certs.errors.is_empty() {
        tracing::warn!(errors = ?certs.errors, "some system certificates could not be loaded");
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// One SMTP session. Commands run with a bounded timeout; a hung server
/// surfaces as `TransportError::Timeout`, never an indefinite wait.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    host: String,
    command_timeout: Duration,
}

impl std::fmt::Debug for SmtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpClient")
            .field("host", &self.host)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl SmtpClient {
    /// Connect to `host:port`. With `implicit_tls` the TLS handshake happens
    /// before the first byte of SMTP (the port-465 convention); otherwise the
    /// session starts in plaintext and may upgrade via [`Self::starttls`].
    pub async fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        timeouts: &TransportTimeouts,
    ) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let stream = tokio::time::timeout(timeouts.connect(), TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout(format!("connect to {addr} timed out")))?
            .map_err(TransportError::Io)?;

        let connection = if implicit_tls {
            Connection::Plain(stream).upgrade_to_tls(host).await?
        } else {
            Connection::Plain(stream)
        };

        Ok(Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            host: host.to_string(),
            command_timeout: timeouts.command(),
        })
    }

    /// Read the server greeting (220).
    pub async fn read_greeting(&mut self) -> Result<Reply, TransportError> {
        self.read_reply(self.command_timeout).await
    }

    /// Send one command line and read the reply.
    pub async fn command(&mut self, command: &str) -> Result<Reply, TransportError> {
        self.command_with_timeout(command, self.command_timeout)
            .await
    }

    async fn command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<Reply, TransportError> {
        let data = format!("{command}\r\n");
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| TransportError::Connection("not connected".to_string()))?;

        tokio::time::timeout(timeout, connection.write_all(data.as_bytes()))
            .await
            .map_err(|_| TransportError::Timeout(format!("command timed out after {timeout:?}")))??;

        self.read_reply(timeout).await
    }

    pub async fn ehlo(&mut self, domain: &str) -> Result<Reply, TransportError> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// STARTTLS: issue the command and, on 220, upgrade the stream. The
    /// caller must re-EHLO afterwards per RFC 3207.
    pub async fn starttls(&mut self) -> Result<(), TransportError> {
        let reply = self.command("STARTTLS").await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        let connection = self
            .connection
            .take()
            .ok_or_else(|| TransportError::Connection("not connected".to_string()))?;
        self.connection = Some(connection.upgrade_to_tls(&self.host).await?);
        // Any bytes buffered before the handshake belong to the plaintext
        // session and must not leak into the TLS one.
        self.buffer_pos = 0;
        Ok(())
    }

    /// AUTH LOGIN: base64 username and password over two 334 challenges.
    pub async fn auth_login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), TransportError> {
        let reply = self.command("AUTH LOGIN").await?;
        if !reply.is_intermediate() {
            return Err(auth_error(&reply));
        }

        let reply = self.command(&BASE64.encode(username)).await?;
        if !reply.is_intermediate() {
            return Err(auth_error(&reply));
        }

        let reply = self.command(&BASE64.encode(password)).await?;
        if !reply.is_success() {
            return Err(auth_error(&reply));
        }

        Ok(())
    }

    pub async fn mail_from(&mut self, from: &str) -> Result<Reply, TransportError> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    pub async fn rcpt_to(&mut self, to: &str) -> Result<Reply, TransportError> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    pub async fn data(&mut self) -> Result<Reply, TransportError> {
        self.command("DATA").await
    }

    /// Transmit the message body after a 354, dot-stuffed, terminated with
    /// `<CRLF>.<CRLF>`.
    pub async fn send_data(
        &mut self,
        data: &str,
        timeout: Duration,
    ) -> Result<Reply, TransportError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| TransportError::Connection("not connected".to_string()))?;

        // Dot-stuff lines that start with '.' (RFC 5321 section 4.5.2).
        let stuffed = if data.starts_with('.') {
            format!(".{}", data.replace("\r\n.", "\r\n.."))
        } else {
            data.replace("\r\n.", "\r\n..")
        };

        let write = async {
            connection.write_all(stuffed.as_bytes()).await?;
            if !stuffed.ends_with("\r\n") {
                connection.write_all(b"\r\n").await?;
            }
            connection.write_all(b".\r\n").await
        };

        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| TransportError::Timeout(format!("DATA timed out after {timeout:?}")))??;

        self.read_reply(timeout).await
    }

    pub async fn quit(&mut self) -> Result<Reply, TransportError> {
        self.command("QUIT").await
    }

    async fn read_reply(&mut self, timeout: Duration) -> Result<Reply, TransportError> {
        loop {
            if let Some((reply, consumed)) = Reply::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                return Ok(reply);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(TransportError::Parse(format!(
                        "reply exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or_else(|| TransportError::Connection("not connected".to_string()))?;
            let n = tokio::time::timeout(timeout, connection.read(&mut self.buffer[self.buffer_pos..]))
                .await
                .map_err(|_| {
                    TransportError::Timeout(format!("read timed out after {timeout:?}"))
                })??;
            self.buffer_pos += n;
        }
    }
}

fn auth_error(reply: &Reply) -> TransportError {
    TransportError::Auth(format!("{} {}", reply.code, reply.message()))
}
