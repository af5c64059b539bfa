//! Persistence contracts for the dispatch core: the shared message backlog
//! and the sender-account registry.
//!
//! Both stores are defined as traits so production can back them with a
//! relational database while tests and single-node deployments use the
//! in-memory implementations here. The one operation with cross-worker
//! semantics is the claim: `claim_next_pending` is an atomic conditional
//! update, so a message is handed to at most one worker.

mod error;
mod memory;
mod store;

pub use error::QueueError;
pub use memory::{MemoryAccountStore, MemoryQueueStore};
pub use store::{AccountStore, QueueStats, QueueStore};
