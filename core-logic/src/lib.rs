//! # Core Logic - Shared Spam Framework
//!
//! Chain-agnostic building blocks for load generators: typed errors,
//! lock-free spam counters with sliding-window rate tracking, retry policies,
//! a concurrent worker runner and the logging setup.
//!
//! ## Modules
//!
//! - [`config`] - Node endpoint and worker-loop settings
//! - [`error`] - Typed error handling with thiserror
//! - [`metrics`] - Spam counters and rate tracking
//! - [`traits`] - The `Spammer` worker trait
//! - [`utils`] - Logger, retry policies, worker runner

pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod utils;

pub use config::{LoopConfig, NodeEndpoint};
pub use error::{ConfigError, CoreError, NetworkError};
pub use metrics::{CounterSnapshot, RateSnapshot, RateTracker, SpamCounters};
pub use traits::{Spammer as SpammerTrait, SpammerStats};

pub use utils::{setup_logger, LogOptions, WorkerRunner, SPAM_TARGET};

pub use utils::retry::{
    is_transient_error, with_retry, ExponentialBackoff, MaxThroughput, RetryConfig, RetryPolicy,
};
