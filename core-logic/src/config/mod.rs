use crate::error::ConfigError;
use crate::utils::retry::{ExponentialBackoff, MaxThroughput, RetryConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One node the spammer submits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub url: String,
    pub timeout_secs: u64,
}

impl NodeEndpoint {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, ConfigError> {
        let url = url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidNodeUrl {
                url: url.to_string(),
            });
        }
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            url: url.to_string(),
            timeout_secs,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How a worker loop ends and how it reacts to failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Successful cycles after which the worker exits. `None` runs forever.
    pub stop_after: Option<u64>,
    /// Enables exponential backoff between failed cycles.
    pub backoff_base_ms: Option<u64>,
}

impl LoopConfig {
    pub fn retry_policy(&self) -> Box<dyn RetryPolicy> {
        match self.backoff_base_ms {
            Some(base) => Box::new(ExponentialBackoff::new(RetryConfig::new(0, base))),
            None => Box::new(MaxThroughput),
        }
    }
}
