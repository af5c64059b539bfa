//! Configurable mock SMTP server for transport tests.
//!
//! Supports canned per-command responses, AUTH LOGIN challenges, failure
//! injection (dropped connections, hangs), and records every command it
//! receives for later assertion.

#![allow(dead_code)] // shared test utility; not every test uses every knob

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// Command received by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    AuthLogin,
    AuthUsername(String),
    AuthPassword(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    MessageContent(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct CannedReply {
    code: u16,
    message: String,
}

impl CannedReply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockConfig {
    greeting: CannedReply,
    ehlo_capabilities: Vec<String>,
    auth_response: CannedReply,
    mail_from_response: CannedReply,
    rcpt_to_response: CannedReply,
    data_response: CannedReply,
    data_end_response: CannedReply,
    quit_response: CannedReply,
    drop_after_commands: Option<usize>,
    hang_on_command: Option<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            greeting: CannedReply::new(220, "mock.courier.test ESMTP ready"),
            ehlo_capabilities: vec![
                "mock.courier.test".to_string(),
                "AUTH LOGIN PLAIN".to_string(),
                "SIZE 35882577".to_string(),
            ],
            auth_response: CannedReply::new(235, "2.7.0 Accepted"),
            mail_from_response: CannedReply::new(250, "OK"),
            rcpt_to_response: CannedReply::new(250, "OK"),
            data_response: CannedReply::new(354, "Go ahead"),
            data_end_response: CannedReply::new(250, "OK: queued"),
            quit_response: CannedReply::new(221, "Bye"),
            drop_after_commands: None,
            hang_on_command: None,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    command_count: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockConfig::default(),
        }
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
        command_count: Arc<AtomicUsize>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut seen = 0usize;
        // AUTH LOGIN progresses through two 334 challenges.
        let mut auth_stage = 0u8;

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            if config.drop_after_commands.is_some_and(|n| seen >= n) {
                return Ok(());
            }
            if config.hang_on_command == Some(seen) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let read = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;
            let Ok(Ok(n)) = read else { return Ok(()) };
            if n == 0 {
                return Ok(());
            }

            seen += 1;
            command_count.fetch_add(1, Ordering::Relaxed);

            let cmd_line = line.trim().to_string();

            if auth_stage > 0 {
                let (reply, cmd) = if auth_stage == 1 {
                    auth_stage = 2;
                    (
                        CannedReply::new(334, "UGFzc3dvcmQ6"),
                        SmtpCommand::AuthUsername(cmd_line.clone()),
                    )
                } else {
                    auth_stage = 0;
                    (
                        config.auth_response.clone(),
                        SmtpCommand::AuthPassword(cmd_line.clone()),
                    )
                };
                commands.write().await.push(cmd);
                writer.write_all(&reply.to_bytes()).await?;
                writer.flush().await?;
                continue;
            }

            let upper = cmd_line.to_uppercase();
            let argument = cmd_line
                .splitn(2, ' ')
                .nth(1)
                .unwrap_or_default()
                .to_string();

            let (reply, cmd) = if upper.starts_with("EHLO") || upper.starts_with("HELO") {
                (None, SmtpCommand::Ehlo(argument))
            } else if upper.starts_with("AUTH LOGIN") {
                auth_stage = 1;
                commands.write().await.push(SmtpCommand::AuthLogin);
                writer
                    .write_all(&CannedReply::new(334, "VXNlcm5hbWU6").to_bytes())
                    .await?;
                writer.flush().await?;
                continue;
            } else if upper.starts_with("MAIL") {
                (
                    Some(config.mail_from_response.clone()),
                    SmtpCommand::MailFrom(argument),
                )
            } else if upper.starts_with("RCPT") {
                (
                    Some(config.rcpt_to_response.clone()),
                    SmtpCommand::RcptTo(argument),
                )
            } else if upper.starts_with("DATA") {
                (Some(config.data_response.clone()), SmtpCommand::Data)
            } else if upper.starts_with("QUIT") {
                commands.write().await.push(SmtpCommand::Quit);
                writer.write_all(&config.quit_response.to_bytes()).await?;
                writer.flush().await?;
                return Ok(());
            } else {
                (
                    Some(CannedReply::new(500, "Unknown command")),
                    SmtpCommand::Other(cmd_line.clone()),
                )
            };

            commands.write().await.push(cmd.clone());

            // EHLO renders a multi-line capability reply.
            if matches!(cmd, SmtpCommand::Ehlo(_)) {
                let mut rendered = String::new();
                let count = config.ehlo_capabilities.len();
                for (i, capability) in config.ehlo_capabilities.iter().enumerate() {
                    let sep = if i + 1 < count { '-' } else { ' ' };
                    rendered.push_str(&format!("250{sep}{capability}\r\n"));
                }
                writer.write_all(rendered.as_bytes()).await?;
                writer.flush().await?;
                continue;
            }

            let Some(reply) = reply else { continue };

            // After a 354, consume message content until the dot terminator.
            if matches!(cmd, SmtpCommand::Data) && reply.code == 354 {
                writer.write_all(&reply.to_bytes()).await?;
                writer.flush().await?;

                let mut content = String::new();
                let mut data_line = String::new();
                loop {
                    data_line.clear();
                    let n = reader.read_line(&mut data_line).await?;
                    if n == 0 {
                        return Ok(());
                    }
                    if data_line.trim_end() == "." {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(content.clone()));
                        writer.write_all(&config.data_end_response.to_bytes()).await?;
                        writer.flush().await?;
                        break;
                    }
                    content.push_str(&data_line);
                }
                continue;
            }

            writer.write_all(&reply.to_bytes()).await?;
            writer.flush().await?;
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockConfig,
}

impl MockSmtpServerBuilder {
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = CannedReply::new(code, message);
        self
    }

    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = CannedReply::new(code, message);
        self
    }

    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = CannedReply::new(code, message);
        self
    }

    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = CannedReply::new(code, message);
        self
    }

    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = CannedReply::new(code, message);
        self
    }

    pub fn with_ehlo_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.config.ehlo_capabilities = capabilities;
        self
    }

    pub fn with_drop_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    pub fn with_hang_on_command(mut self, index: usize) -> Self {
        self.config.hang_on_command = Some(index);
        self
    }

    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let command_count = Arc::new(AtomicUsize::new(0));

        let accept_config = Arc::clone(&config);
        let accept_commands = Arc::clone(&commands);
        let accept_shutdown = Arc::clone(&shutdown);
        let accept_count = Arc::clone(&command_count);

        tokio::spawn(async move {
            loop {
                if accept_shutdown.load(Ordering::Relaxed) {
                    break;
                }

                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;
                if let Ok(Ok((stream, _peer))) = accepted {
                    let config = Arc::clone(&accept_config);
                    let commands = Arc::clone(&accept_commands);
                    let count = Arc::clone(&accept_count);
                    tokio::spawn(async move {
                        let _ = MockSmtpServer::handle_client(stream, config, commands, count).await;
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            shutdown,
            command_count,
        })
    }
}
