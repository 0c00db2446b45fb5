use anyhow::{Context, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: base_delay_ms.saturating_mul(30),
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.exponential_base.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        let delay_ms = if self.jitter {
            let rng_factor = rand::thread_rng().gen_range(0.5..=1.5);
            delay_ms * rng_factor
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

/// Runs `operation` up to `max_retries + 1` times, sleeping between attempts.
pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt + 1);
                }
                return Ok(result);
            }
            Err(e) if attempt >= config.max_retries => {
                let error_msg = format!("{}", e);
                return Err(e).context(format!(
                    "{} failed after {} attempts. Last error: {}",
                    operation_name,
                    attempt + 1,
                    error_msg
                ));
            }
            Err(e) => {
                let delay = config.calculate_delay(attempt);
                debug!(
                    "{} failed (attempt {}/{}). Retrying in {:?}: {}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Decides how long a worker waits after a failed cycle.
///
/// Spam workers never give up on a cycle; the policy only shapes the pause
/// before the next attempt.
pub trait RetryPolicy: Send + Sync {
    /// `consecutive_failures` is at least 1. `None` retries immediately.
    fn failure_delay(&self, consecutive_failures: u32) -> Option<Duration>;
}

/// Retry immediately, always. Maximum offered load.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxThroughput;

impl RetryPolicy for MaxThroughput {
    fn failure_delay(&self, _consecutive_failures: u32) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn failure_delay(&self, consecutive_failures: u32) -> Option<Duration> {
        Some(
            self.config
                .calculate_delay(consecutive_failures.saturating_sub(1)),
        )
    }
}

/// Heuristic split between node hiccups and hard rejections, used to pick
/// the log level of a failed cycle.
pub fn is_transient_error(error: &anyhow::Error) -> bool {
    let error_msg = format!("{:?}", error).to_lowercase();

    let transient_patterns = [
        "timeout",
        "connection refused",
        "connection reset",
        "error sending request",
        "service unavailable",
        "too many requests",
        "http error 429",
        "http error 502",
        "http error 503",
        "tips are not consistent",
        "node is not synced",
    ];

    transient_patterns
        .iter()
        .any(|pattern| error_msg.contains(pattern))
}
