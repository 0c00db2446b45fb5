//! # Spam Counters and Rate Tracking
//!
//! [`SpamCounters`] is the only state shared between submission workers. It is
//! created once, wrapped in an `Arc` and handed to every worker; workers only
//! ever add to it. A single reporter reads it through [`SpamCounters::snapshot`]
//! and feeds the spammed total into a [`RateTracker`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counter samples averaged into the instantaneous rate.
pub const SHORT_WINDOW: usize = 5;
/// Instantaneous-rate readings averaged into the smoothed rate (12 x 5s = 60s).
pub const LONG_WINDOW: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub spammed: u64,
    pub errors: u64,
}

/// Monotonic success/error totals shared by all workers.
#[derive(Debug)]
pub struct SpamCounters {
    spammed: AtomicU64,
    errors: AtomicU64,
    start_time: Instant,
}

impl Default for SpamCounters {
    fn default() -> Self {
        Self {
            spammed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl SpamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the transactions of one successfully broadcast bundle.
    pub fn record_spammed(&self, transactions: u64) {
        self.spammed.fetch_add(transactions, Ordering::SeqCst);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            spammed: self.spammed.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }

    pub fn spammed(&self) -> u64 {
        self.spammed.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Fixed-capacity ring that overwrites its oldest value.
#[derive(Debug, Clone)]
struct RingWindow<const N: usize> {
    values: [f64; N],
    len: usize,
    next: usize,
}

impl<const N: usize> RingWindow<N> {
    fn new() -> Self {
        Self {
            values: [0.0; N],
            len: 0,
            next: 0,
        }
    }

    fn push(&mut self, value: f64) {
        self.values[self.next] = value;
        self.next = (self.next + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    /// Mean of the filled slots; 0.0 while empty.
    fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.values[..self.len].iter().sum::<f64>() / self.len as f64
    }

    fn is_full(&self) -> bool {
        self.len == N
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateSnapshot {
    /// Per-second rate averaged over the last [`SHORT_WINDOW`] samples.
    pub current: f64,
    /// Mean of the last [`LONG_WINDOW`] current-rate readings.
    pub smoothed: f64,
    /// False until the long window has filled once.
    pub warmed_up: bool,
}

/// Sliding-window throughput estimate over an ever-increasing counter.
///
/// Call [`RateTracker::record`] once per sampling interval. Every sample adds
/// its first difference to the short window; every [`SHORT_WINDOW`] samples
/// the current rate is pushed into the long window. Partially filled windows
/// are averaged over what they hold.
#[derive(Debug, Clone)]
pub struct RateTracker {
    interval_secs: f64,
    last_sample: u64,
    samples: u64,
    deltas: RingWindow<SHORT_WINDOW>,
    rates: RingWindow<LONG_WINDOW>,
}

impl RateTracker {
    pub fn new(interval: Duration) -> Self {
        Self::with_baseline(interval, 0)
    }

    /// Starts from a counter value other than zero, so totals accumulated
    /// before the tracker existed don't show up as a spike.
    pub fn with_baseline(interval: Duration, baseline: u64) -> Self {
        Self {
            interval_secs: interval.as_secs_f64().max(f64::EPSILON),
            last_sample: baseline,
            samples: 0,
            deltas: RingWindow::new(),
            rates: RingWindow::new(),
        }
    }

    pub fn record(&mut self, counter: u64) -> RateSnapshot {
        let delta = counter.saturating_sub(self.last_sample) as f64 / self.interval_secs;
        self.last_sample = counter;
        self.samples += 1;

        self.deltas.push(delta);
        let current = self.deltas.mean();
        if self.samples % SHORT_WINDOW as u64 == 0 {
            self.rates.push(current);
        }

        RateSnapshot {
            current,
            smoothed: self.rates.mean(),
            warmed_up: self.rates.is_full(),
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_counters_from_many_tasks() {
        let counters = Arc::new(SpamCounters::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let counters = counters.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counters.record_spammed(3);
                    counters.record_error();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.spammed, 8 * 100 * 3);
        assert_eq!(snapshot.errors, 8 * 100);
    }

    #[test]
    fn test_steady_rate_converges() {
        let mut tracker = RateTracker::new(Duration::from_secs(1));
        let mut last = None;
        for second in 1..=60u64 {
            last = Some(tracker.record(second * 10));
        }

        let rate = last.unwrap();
        assert_eq!(rate.current, 10.0);
        assert_eq!(rate.smoothed, 10.0);
        assert!(rate.warmed_up);
    }

    #[test]
    fn test_smoothed_lags_behind_ramp() {
        let mut tracker = RateTracker::new(Duration::from_secs(1));
        let mut counter = 0;
        let mut rate = None;
        for second in 1..=60u64 {
            if second > 30 {
                counter += 10;
            }
            rate = Some(tracker.record(counter));
        }

        let rate = rate.unwrap();
        assert_eq!(rate.current, 10.0);
        // six idle readings, six busy ones
        assert_eq!(rate.smoothed, 5.0);
    }

    #[test]
    fn test_partial_windows_are_readable() {
        let mut tracker = RateTracker::new(Duration::from_secs(1));
        let first = tracker.record(4);
        assert_eq!(first.current, 4.0);
        assert_eq!(first.smoothed, 0.0);
        assert!(!first.warmed_up);

        let second = tracker.record(4);
        assert_eq!(second.current, 2.0);
    }

    #[test]
    fn test_baseline_and_interval() {
        let mut tracker = RateTracker::with_baseline(Duration::from_millis(500), 1_000);
        let rate = tracker.record(1_010);
        assert_eq!(rate.current, 20.0);
        assert_eq!(tracker.samples(), 1);
    }
}
