//! # Utilities Module
//!
//! Logging, retry policies and the worker runner.

pub mod logger;
pub mod retry;
pub(crate) mod runner;

pub use logger::{setup_logger, LogOptions, SPAM_TARGET};
pub use runner::WorkerRunner;
