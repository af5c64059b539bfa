use courier_common::{account::AccountId, message::MessageId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// A status transition that violates the monotone lifecycle, e.g.
    /// marking a pending message as bounced.
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: MessageId,
        from: String,
        to: String,
    },

    /// Backend-level failure (I/O, connection, serialization).
    #[error("Store error: {0}")]
    Backend(String),
}
