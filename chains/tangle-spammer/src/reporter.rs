//! Single status line, rewritten once per second.

use core_logic::{CounterSnapshot, RateSnapshot, RateTracker, SpamCounters, SPAM_TARGET};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub fn format_status(counters: &CounterSnapshot, rates: &RateSnapshot) -> String {
    format!(
        "Spammed {:7}   Errors {:7}   Current TPS {:7.2}   60s TPS {:7.2}",
        counters.spammed, counters.errors, rates.current, rates.smoothed
    )
}

/// Samples `counters` every interval until `token` is cancelled, then logs
/// a final summary.
pub async fn run_reporter(
    counters: Arc<SpamCounters>,
    token: CancellationToken,
    interval: Duration,
    quiet: bool,
) -> RateSnapshot {
    let mut tracker = RateTracker::with_baseline(interval, counters.spammed());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately
    ticker.tick().await;

    let mut last = RateSnapshot::default();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = counters.snapshot();
                last = tracker.record(snapshot.spammed);
                if !quiet {
                    let mut stdout = std::io::stdout();
                    let _ = write!(stdout, "\r{}", format_status(&snapshot, &last));
                    let _ = stdout.flush();
                }
            }
        }
    }

    let snapshot = counters.snapshot();
    if !quiet {
        println!();
    }
    info!(
        target: SPAM_TARGET,
        "Finished after {:.1}s: {}",
        counters.uptime().as_secs_f64(),
        format_status(&snapshot, &last)
    );
    last
}
