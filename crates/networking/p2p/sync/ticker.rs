//! Periodic stats readout for the healing engine.
//!
//! The ticker task only reads: it pulls a [`TickerStats`] snapshot from the
//! updater the coordinator provides and logs it, suppressing runs of
//! identical readouts up to a cap.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::constants::TICKER_SUPPRESS_MAX;

/// Mean and standard deviation of a sampled series.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MeanStd {
    pub mean: f64,
    pub std_dev: f64,
}

/// Welford-style running accumulator behind [`MeanStd`].
#[derive(Debug, Default, Clone)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
    }

    pub fn snapshot(&self) -> MeanStd {
        let std_dev = if self.count > 1 {
            (self.m2 / (self.count - 1) as f64).sqrt()
        } else {
            0.0
        };
        MeanStd {
            mean: self.mean,
            std_dev,
        }
    }
}

/// One readout of the healing engine's externally visible numbers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickerStats {
    pub pivot_block: Option<u64>,
    pub n_accounts: MeanStd,
    pub n_storage: MeanStd,
    /// Processed fraction of the current pivot's account space, over history.
    pub accounts_fill: MeanStd,
    /// Latest fill sample.
    pub accounts_fill_merged: f64,
    /// Global account coverage across pivots.
    pub acc_coverage: f64,
    /// Pending storage-heal queue length.
    pub n_queues: usize,
}

pub type StatsUpdater = Arc<dyn Fn() -> TickerStats + Send + Sync>;

/// Spawns the ticker loop; it runs until `cancel` fires.
pub fn spawn_ticker(
    interval: Duration,
    updater: StatsUpdater,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last: Option<TickerStats> = None;
        let mut suppressed = 0u32;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let stats = (updater)();
                    if last.as_ref() == Some(&stats) && suppressed < TICKER_SUPPRESS_MAX {
                        suppressed += 1;
                        continue;
                    }
                    suppressed = 0;
                    log_stats(&stats);
                    last = Some(stats);
                }
            }
        }
    })
}

fn log_stats(stats: &TickerStats) {
    info!(
        pivot = stats.pivot_block.unwrap_or_default(),
        accounts = %format!("{:.0}±{:.0}", stats.n_accounts.mean, stats.n_accounts.std_dev),
        storage = %format!("{:.0}±{:.0}", stats.n_storage.mean, stats.n_storage.std_dev),
        fill = %format!("{:.2}%±{:.2}", stats.accounts_fill.mean * 100.0, stats.accounts_fill.std_dev * 100.0),
        merged = %format!("{:.2}%", stats.accounts_fill_merged * 100.0),
        coverage = %format!("{:.2}%", stats.acc_coverage * 100.0),
        queues = stats.n_queues,
        "healing progress"
    );
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn running_stats_mean_and_deviation() {
        let mut stats = RunningStats::default();
        for sample in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(sample);
        }
        let snapshot = stats.snapshot();
        assert!((snapshot.mean - 5.0).abs() < 1e-9);
        // Sample standard deviation of the series above
        assert!((snapshot.std_dev - 2.138089935).abs() < 1e-6);
    }

    #[test]
    fn single_sample_has_zero_deviation() {
        let mut stats = RunningStats::default();
        stats.push(42.0);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.mean, 42.0);
        assert_eq!(snapshot.std_dev, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_stops_on_cancellation() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let updater: StatsUpdater = {
            let calls = calls.clone();
            Arc::new(move || {
                calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                TickerStats::default()
            })
        };
        let handle = spawn_ticker(Duration::from_secs(1), updater, cancel.clone());
        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(calls.load(std::sync::atomic::Ordering::Relaxed) >= 3);
    }
}
