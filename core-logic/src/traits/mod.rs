use anyhow::Result;
use async_trait::async_trait;
use std::ops::AddAssign;
use tokio_util::sync::CancellationToken;

/// Per-worker cycle totals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpammerStats {
    /// Completed cycles (one bundle broadcast each).
    pub success: u64,
    pub failed: u64,
    /// Transactions carried by the successful cycles.
    pub transactions: u64,
}

impl AddAssign for SpammerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.success += rhs.success;
        self.failed += rhs.failed;
        self.transactions += rhs.transactions;
    }
}

#[async_trait]
pub trait Spammer: Send {
    /// Short label used in the worker span.
    fn label(&self) -> String;

    /// Runs the spam loop until its own stop condition or cancellation.
    async fn start(&mut self, cancellation_token: CancellationToken) -> Result<SpammerStats>;
}
