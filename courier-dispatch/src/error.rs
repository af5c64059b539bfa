use courier_common::account::AccountId;
use courier_queue::QueueError;
use courier_transport::TransportError;
use courier_vault::VaultError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Queue(#[from] QueueError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Direct `start` on an account whose status does not permit sending.
    #[error("Account {0} is not in a sendable status")]
    NotSendable(AccountId),
}
