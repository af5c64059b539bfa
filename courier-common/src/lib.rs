pub mod account;
pub mod error;
pub mod logging;
pub mod message;

pub use tracing;

/// Process-wide lifecycle signal, broadcast to every long-running task.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
