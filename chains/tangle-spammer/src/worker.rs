//! Submission worker: fetch tips, attach, broadcast, repeat.

use crate::bundle::SignedBundle;
use crate::client::TangleApi;
use crate::provider::BundleProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use core_logic::{
    is_transient_error, LoopConfig, NetworkError, RetryPolicy, SpamCounters, SpammerStats,
    SpammerTrait, SPAM_TARGET,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default tip selection depth.
pub const DEFAULT_DEPTH: u32 = 3;
/// Default minimum weight magnitude.
pub const DEFAULT_MWM: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchTips,
    Attach,
    Broadcast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::FetchTips => "getTransactionsToApprove",
            Stage::Attach => "attachToTangle",
            Stage::Broadcast => "broadcastTransactions",
        })
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct CycleError {
    pub stage: Stage,
    #[source]
    pub source: NetworkError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub depth: u32,
    pub mwm: u8,
    pub loop_config: LoopConfig,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            mwm: DEFAULT_MWM,
            loop_config: LoopConfig::default(),
        }
    }
}

pub struct SubmissionWorker {
    id: usize,
    node: Arc<dyn TangleApi>,
    pow: Arc<dyn TangleApi>,
    provider: Arc<BundleProvider>,
    counters: Arc<SpamCounters>,
    retry: Box<dyn RetryPolicy>,
    settings: WorkerSettings,
    rng: StdRng,
}

impl SubmissionWorker {
    pub fn new(
        id: usize,
        node: Arc<dyn TangleApi>,
        provider: Arc<BundleProvider>,
        counters: Arc<SpamCounters>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            pow: Arc::clone(&node),
            node,
            provider,
            counters,
            retry: settings.loop_config.retry_policy(),
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Routes attach to a separate proof-of-work node.
    pub fn with_pow_node(mut self, pow: Arc<dyn TangleApi>) -> Self {
        self.pow = pow;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_retry_policy(mut self, retry: Box<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// One attach-broadcast cycle. Returns the transactions submitted.
    pub async fn submit_once(&self, bundle: &SignedBundle) -> Result<usize, CycleError> {
        let tips = self
            .node
            .transactions_to_approve(self.settings.depth)
            .await
            .map_err(|source| CycleError {
                stage: Stage::FetchTips,
                source,
            })?;

        let attached = self
            .pow
            .attach_to_tangle(&tips, self.settings.mwm, bundle.payloads())
            .await
            .map_err(|source| CycleError {
                stage: Stage::Attach,
                source,
            })?;

        self.node
            .broadcast_transactions(&attached)
            .await
            .map_err(|source| CycleError {
                stage: Stage::Broadcast,
                source,
            })?;

        Ok(attached.len())
    }

    fn limit_reached(&self, stats: &SpammerStats) -> bool {
        self.settings
            .loop_config
            .stop_after
            .is_some_and(|limit| stats.success >= limit)
    }
}

#[async_trait]
impl SpammerTrait for SubmissionWorker {
    fn label(&self) -> String {
        self.node.endpoint().to_string()
    }

    async fn start(&mut self, cancellation_token: CancellationToken) -> Result<SpammerStats> {
        let mut stats = SpammerStats::default();
        let mut consecutive_failures = 0u32;
        let provider = Arc::clone(&self.provider);

        debug!(worker = self.id, "Worker started");

        while !cancellation_token.is_cancelled() && !self.limit_reached(&stats) {
            let bundle = provider
                .get_next_bundle(&mut self.rng)
                .with_context(|| format!("Worker {} has no bundle to submit", self.id))?;

            let outcome = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                outcome = self.submit_once(bundle) => outcome,
            };

            match outcome {
                Ok(transactions) => {
                    consecutive_failures = 0;
                    self.counters.record_spammed(transactions as u64);
                    stats.success += 1;
                    stats.transactions += transactions as u64;
                    debug!(worker = self.id, transactions, "SUCCESS bundle broadcast");
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    self.counters.record_error();
                    stats.failed += 1;

                    let endpoint = e.source.endpoint().to_string();
                    let err = anyhow::Error::new(e);
                    if is_transient_error(&err) {
                        warn!(target: SPAM_TARGET, "FAILED {} ({})", err, endpoint);
                    } else {
                        error!(target: SPAM_TARGET, "FAILED {} ({})", err, endpoint);
                    }

                    if let Some(delay) = self.retry.failure_delay(consecutive_failures) {
                        tokio::select! {
                            _ = cancellation_token.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        info!(
            target: SPAM_TARGET,
            "Worker {} finished: {} bundles, {} transactions, {} errors",
            self.id,
            stats.success,
            stats.transactions,
            stats.failed
        );
        Ok(stats)
    }
}
