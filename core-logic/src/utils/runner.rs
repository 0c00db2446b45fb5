use crate::traits::{Spammer, SpammerStats};
use anyhow::Result;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

pub struct WorkerRunner;

impl WorkerRunner {
    /// Spawns the spammers as concurrent tasks and waits for all of them.
    ///
    /// Ctrl+C cancels `token`, which every worker observes between cycles.
    /// Returns the summed stats of the workers that exited cleanly.
    pub async fn run_spammers(
        spammers: Vec<Box<dyn Spammer>>,
        token: CancellationToken,
    ) -> Result<SpammerStats> {
        let mut set = JoinSet::new();

        let signal_token = token.clone();
        let signal_handle = tokio::spawn(async move {
            tokio::select! {
                res = signal::ctrl_c() => match res {
                    Ok(()) => {
                        info!(target: "spam", "Received Ctrl+C. Stopping workers...");
                        signal_token.cancel();
                    }
                    Err(err) => error!("Unable to listen for shutdown signal: {}", err),
                },
                _ = signal_token.cancelled() => {}
            }
        });

        let start_time = std::time::Instant::now();
        info!(target: "spam", "Starting {} spam workers...", spammers.len());

        for (i, mut spammer) in spammers.into_iter().enumerate() {
            let id = i + 1;
            let span = tracing::info_span!(
                "worker",
                worker_id = format!("{:03}", id),
                node = %spammer.label()
            );
            let child_token = token.clone();

            set.spawn(
                async move {
                    match spammer.start(child_token).await {
                        Ok(stats) => Ok(stats),
                        Err(e) => {
                            error!("Worker {} failed: {:?}", id, e);
                            Err(e)
                        }
                    }
                }
                .instrument(span),
            );
        }

        let mut total = SpammerStats::default();
        let mut failed_workers = 0usize;

        while let Some(res) = set.join_next().await {
            match res {
                Ok(Ok(stats)) => total += stats,
                Ok(Err(_)) => failed_workers += 1,
                Err(e) => {
                    failed_workers += 1;
                    error!("A worker task panicked or failed to join: {:?}", e);
                }
            }
        }
        signal_handle.abort();

        let cycles = total.success + total.failed;
        let rate = if cycles > 0 {
            (total.success as f64 / cycles as f64) * 100.0
        } else {
            0.0
        };

        info!(
            target: "spam",
            "Total Time: {:.1}s | Bundles: {} | Transactions: {} | Errors: {} | Success Rate: {:.2}% | Failed Workers: {}",
            start_time.elapsed().as_secs_f64(),
            total.success,
            total.transactions,
            total.failed,
            rate,
            failed_workers
        );

        Ok(total)
    }
}
