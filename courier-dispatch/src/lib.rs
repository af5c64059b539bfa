//! The dispatch core: one worker per active sender account, supervised by an
//! orchestrator, gated by a per-account rate governor.
//!
//! Workers are isolated by construction — each owns exactly one account's
//! credentials and queue claims, so a failing account never affects its
//! neighbours. The queue store's atomic claim is the only cross-worker race.

mod error;
mod governor;
mod metrics;
mod orchestrator;
mod worker;

pub use error::DispatchError;
pub use governor::{RateGovernor, SendDecision};
pub use metrics::{AggregateMetrics, WorkerCounters};
pub use orchestrator::{Orchestrator, StartOutcome, StopOutcome, WorkerStatus};
pub use worker::{DispatchWorker, ProcessStatus, WorkerConfig, WorkerShared};
