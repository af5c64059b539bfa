//! Orchestrator lifecycle tests: registry semantics, isolation, recovery.

mod support;

use std::sync::Arc;
use std::time::Duration;

use courier_common::account::{AccountId, AccountStatus};
use courier_content::{ContentProcessor, TrackingConfig};
use courier_dispatch::{DispatchError, Orchestrator, StartOutcome, StopOutcome, WorkerConfig};
use courier_queue::{AccountStore, MemoryAccountStore, MemoryQueueStore, QueueStore};
use courier_transport::TransportTimeouts;
use courier_vault::{Credential, MasterKey, Vault};
use support::test_account;

/// A TCP listener that accepts connections and never says a word, keeping
/// SMTP workers parked in their greeting read.
async fn hanging_smtp_server() -> (u16, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (port, handle)
}

async fn orchestrator_with_smtp_account(
    account_id: &str,
    port: u16,
) -> (Arc<Orchestrator>, Arc<MemoryAccountStore>, Arc<MemoryQueueStore>) {
    let vault = Arc::new(Vault::new(MasterKey::from_bytes(&[9u8; 32]).unwrap()));
    let accounts = Arc::new(MemoryAccountStore::new());
    let queue = Arc::new(MemoryQueueStore::new());

    let mut account = test_account(account_id, 100);
    account.credential_blob = vault
        .seal(&Credential::Smtp {
            host: "127.0.0.1".to_string(),
            port,
            secure: false,
            username: "mailer".to_string(),
            password: "pw".to_string(),
        })
        .unwrap();
    accounts.upsert(account).await.unwrap();

    let orchestrator = Arc::new(Orchestrator::new(
        accounts.clone(),
        queue.clone(),
        vault,
        ContentProcessor::new("https://mail.example.org", TrackingConfig::default()),
        TransportTimeouts {
            connect_secs: 2,
            command_secs: 1,
            data_secs: 2,
            http_secs: 2,
        },
        WorkerConfig {
            idle_sleep: Duration::from_millis(10),
            bounce_poll_interval: Duration::from_secs(3600),
            max_attempts: 3,
        },
    ));

    (orchestrator, accounts, queue)
}

#[tokio::test]
async fn start_twice_is_a_reported_noop() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, _accounts, _queue) = orchestrator_with_smtp_account("acct-1", port).await;
    let id = AccountId::new("acct-1");

    assert_eq!(orchestrator.start(&id).await.unwrap(), StartOutcome::Started);
    assert_eq!(
        orchestrator.start(&id).await.unwrap(),
        StartOutcome::AlreadyRunning
    );

    assert_eq!(orchestrator.stop(&id).await, StopOutcome::Stopped);
    server.abort();
}

#[tokio::test]
async fn stop_without_a_worker_is_a_noop() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, _accounts, _queue) = orchestrator_with_smtp_account("acct-1", port).await;

    assert_eq!(
        orchestrator.stop(&AccountId::new("acct-1")).await,
        StopOutcome::NotRunning
    );
    server.abort();
}

#[tokio::test]
async fn start_unknown_account_errors() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, _accounts, _queue) = orchestrator_with_smtp_account("acct-1", port).await;

    let err = orchestrator
        .start(&AccountId::new("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AccountNotFound(_)));
    server.abort();
}

#[tokio::test]
async fn start_paused_account_errors() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, accounts, _queue) = orchestrator_with_smtp_account("acct-1", port).await;
    let id = AccountId::new("acct-1");

    accounts
        .update_status(&id, AccountStatus::Paused)
        .await
        .unwrap();

    let err = orchestrator.start(&id).await.unwrap_err();
    assert!(matches!(err, DispatchError::NotSendable(_)));
    server.abort();
}

#[tokio::test]
async fn garbage_credential_blob_fails_start_without_spawning() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, accounts, _queue) = orchestrator_with_smtp_account("acct-1", port).await;
    let id = AccountId::new("acct-1");

    let mut account = accounts.get(&id).await.unwrap().unwrap();
    account.credential_blob = "not-a-blob".to_string();
    accounts.upsert(account).await.unwrap();

    let err = orchestrator.start(&id).await.unwrap_err();
    assert!(matches!(err, DispatchError::Vault(_)));
    assert!(orchestrator.status().is_empty());
    server.abort();
}

#[tokio::test]
async fn status_and_metrics_reflect_running_workers() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, _accounts, _queue) = orchestrator_with_smtp_account("acct-1", port).await;
    let id = AccountId::new("acct-1");

    orchestrator.start(&id).await.unwrap();

    let status = orchestrator.status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].account_id, id);
    assert_eq!(status[0].sent, 0);

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.workers, 1);
    assert_eq!(metrics.sent, 0);
    assert!(metrics.sends_per_sec.abs() < f64::EPSILON);

    // Stopping removes the worker from the registry entirely.
    orchestrator.stop(&id).await;
    assert!(orchestrator.status().is_empty());
    server.abort();
}

#[tokio::test]
async fn one_accounts_failure_does_not_block_others() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, accounts, _queue) = orchestrator_with_smtp_account("acct-good", port).await;

    // Second account with an unusable credential blob.
    let mut broken = test_account("acct-broken", 100);
    broken.credential_blob = "garbage".to_string();
    accounts.upsert(broken).await.unwrap();

    let started = orchestrator.spawn_eligible().await.unwrap();
    assert_eq!(started, vec![AccountId::new("acct-good")]);

    orchestrator.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn recover_stale_resurfaces_processing_before_workers_spawn() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, _accounts, queue) = orchestrator_with_smtp_account("acct-1", port).await;

    queue
        .enqueue("camp", &["r@example.com".to_string()], "s", "<p>b</p>")
        .await
        .unwrap();
    queue
        .claim_next_pending(&AccountId::new("acct-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queue.stats().await.unwrap().processing, 1);

    let recovered = orchestrator.recover_stale().await.unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(queue.stats().await.unwrap().pending, 1);
    server.abort();
}

#[tokio::test]
async fn restart_stops_then_starts() {
    let (port, server) = hanging_smtp_server().await;
    let (orchestrator, _accounts, _queue) = orchestrator_with_smtp_account("acct-1", port).await;
    let id = AccountId::new("acct-1");

    orchestrator.start(&id).await.unwrap();
    assert_eq!(
        orchestrator.restart(&id).await.unwrap(),
        StartOutcome::Started
    );

    orchestrator.stop(&id).await;
    server.abort();
}
