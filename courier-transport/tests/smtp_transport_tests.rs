//! Integration tests for the SMTP transport against a mock server.

mod support;

use courier_common::error::ErrorKind;
use courier_transport::{OutboundEmail, SmtpTransport, Transport, TransportTimeouts};
use support::mock_server::{MockSmtpServer, SmtpCommand};

fn transport_for(server: &MockSmtpServer) -> SmtpTransport {
    SmtpTransport::new(
        "sender@example.com",
        "127.0.0.1",
        server.port(),
        false,
        "mailer",
        "secret",
        TransportTimeouts {
            connect_secs: 5,
            command_secs: 5,
            data_secs: 5,
            http_secs: 5,
        },
    )
}

fn email() -> OutboundEmail {
    OutboundEmail::new(
        "sender@example.com",
        "rcpt@example.org",
        "Hello",
        "<p>Hello there</p>",
    )
}

#[tokio::test]
async fn successful_send_walks_the_full_transaction() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let transport = transport_for(&server);

    let result = transport.send(&email()).await;
    assert!(result.success, "send failed: {:?}", result.error);
    assert!(result.message_id.is_some());
    assert_eq!(result.recipient, "rcpt@example.org");

    let commands = server.commands().await;
    assert!(matches!(commands[0], SmtpCommand::Ehlo(_)));
    assert!(commands.contains(&SmtpCommand::AuthLogin));
    assert!(
        commands
            .iter()
            .any(|c| matches!(c, SmtpCommand::MailFrom(arg) if arg.contains("sender@example.com")))
    );
    assert!(
        commands
            .iter()
            .any(|c| matches!(c, SmtpCommand::RcptTo(arg) if arg.contains("rcpt@example.org")))
    );
    assert!(commands.contains(&SmtpCommand::Quit));

    let body = commands.iter().find_map(|c| match c {
        SmtpCommand::MessageContent(content) => Some(content.clone()),
        _ => None,
    });
    let body = body.expect("server recorded no message content");
    assert!(body.contains("Subject: Hello"));
    assert!(body.contains("<p>Hello there</p>"));

    server.shutdown();
}

#[tokio::test]
async fn authenticate_verifies_the_session() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let transport = transport_for(&server);

    transport.authenticate().await.unwrap();

    let commands = server.commands().await;
    assert!(commands.contains(&SmtpCommand::AuthLogin));
    assert!(commands.contains(&SmtpCommand::Quit));
    // Verification never starts a mail transaction.
    assert!(!commands.iter().any(|c| matches!(c, SmtpCommand::MailFrom(_))));

    server.shutdown();
}

#[tokio::test]
async fn rejected_credentials_fail_authentication() {
    let server = MockSmtpServer::builder()
        .with_auth_response(535, "5.7.8 Authentication credentials invalid")
        .build()
        .await
        .unwrap();
    let transport = transport_for(&server);

    let err = transport.authenticate().await.unwrap_err();
    assert!(err.is_auth());

    server.shutdown();
}

#[tokio::test]
async fn rejected_recipient_folds_into_result() {
    let server = MockSmtpServer::builder()
        .with_rcpt_to_response(550, "No such user here")
        .build()
        .await
        .unwrap();
    let transport = transport_for(&server);

    let result = transport.send(&email()).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::InvalidInput));
    assert!(!result.is_retryable());
    assert!(result.error.as_deref().unwrap_or_default().contains("550"));

    server.shutdown();
}

#[tokio::test]
async fn temporary_server_failure_is_retryable() {
    let server = MockSmtpServer::builder()
        .with_mail_from_response(421, "Service not available, try again")
        .build()
        .await
        .unwrap();
    let transport = transport_for(&server);

    let result = transport.send(&email()).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Network));
    assert!(result.is_retryable());

    server.shutdown();
}

#[tokio::test]
async fn dropped_connection_is_retryable() {
    let server = MockSmtpServer::builder()
        .with_drop_after_commands(2)
        .build()
        .await
        .unwrap();
    let transport = transport_for(&server);

    let result = transport.send(&email()).await;
    assert!(!result.success);
    assert!(result.is_retryable(), "kind: {:?}", result.error_kind);

    server.shutdown();
}

#[tokio::test]
async fn hung_server_times_out_as_retryable() {
    let server = MockSmtpServer::builder()
        .with_hang_on_command(1)
        .build()
        .await
        .unwrap();

    let transport = SmtpTransport::new(
        "sender@example.com",
        "127.0.0.1",
        server.port(),
        false,
        "mailer",
        "secret",
        TransportTimeouts {
            connect_secs: 2,
            command_secs: 1,
            data_secs: 2,
            http_secs: 2,
        },
    );

    let result = transport.send(&email()).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    assert!(result.is_retryable());

    server.shutdown();
}

#[tokio::test]
async fn refused_connection_is_retryable() {
    // Bind-then-drop to find a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = SmtpTransport::new(
        "sender@example.com",
        "127.0.0.1",
        port,
        false,
        "mailer",
        "secret",
        TransportTimeouts {
            connect_secs: 2,
            command_secs: 2,
            data_secs: 2,
            http_secs: 2,
        },
    );

    let result = transport.send(&email()).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ConnectionRefused));
    assert!(result.is_retryable());
}

#[tokio::test]
async fn send_bulk_is_sequential_per_recipient() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let transport = transport_for(&server);

    let emails = vec![
        OutboundEmail::new("sender@example.com", "a@example.org", "s", "b"),
        OutboundEmail::new("sender@example.com", "b@example.org", "s", "b"),
    ];
    let results = transport.send_bulk(&emails).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(results[0].recipient, "a@example.org");
    assert_eq!(results[1].recipient, "b@example.org");

    server.shutdown();
}

#[tokio::test]
async fn smtp_has_no_bounce_mailbox() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let transport = transport_for(&server);

    let notices = transport.check_bounces().await.unwrap();
    assert!(notices.is_empty());

    server.shutdown();
}
