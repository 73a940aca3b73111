// src/scheduler.rs
// One cycle = display refresh for the dot-ticker list, then the stage sweep for the
// ticker list. Cycles never overlap and a stop request is only honoured between cycles.
use crate::dot_snapshot::refresh_display_fields;
use crate::pairs::load_pairs;
use crate::pattern_driver::{CycleSummary, PatternDriver};
use crate::store::{IndicatorStore, ProgressStore};
use crate::types::TrackedPair;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub struct PollingService {
    driver: PatternDriver,
    indicators: Arc<dyn IndicatorStore>,
    progress: Arc<dyn ProgressStore>,
    tickers_file: String,
    dot_tickers_file: String,
    interval_mins: u64,
    last_pairs: Mutex<Vec<TrackedPair>>,
}

impl PollingService {
    pub fn new(
        driver: PatternDriver,
        indicators: Arc<dyn IndicatorStore>,
        progress: Arc<dyn ProgressStore>,
        tickers_file: impl Into<String>,
        dot_tickers_file: impl Into<String>,
        interval_mins: u64,
    ) -> Self {
        Self {
            driver,
            indicators,
            progress,
            tickers_file: tickers_file.into(),
            dot_tickers_file: dot_tickers_file.into(),
            interval_mins,
            last_pairs: Mutex::new(Vec::new()),
        }
    }

    fn note_pair_changes(&self, pairs: &[TrackedPair]) {
        let mut last = self.last_pairs.lock();
        let added = pairs.iter().filter(|p| !last.contains(p)).count();
        let removed = last.iter().filter(|p| !pairs.contains(p)).count();
        if added > 0 || removed > 0 {
            info!(
                "[SCHEDULER] Tracked pairs changed: {} added, {} removed, {} total",
                added,
                removed,
                pairs.len()
            );
        }
        *last = pairs.to_vec();
    }

    pub async fn run_once(&self) -> CycleSummary {
        info!("[SCHEDULER] Starting cycle");

        match load_pairs(&self.dot_tickers_file) {
            Ok(dot_pairs) if dot_pairs.is_empty() => warn!("[SCHEDULER] No dot tickers found"),
            Ok(dot_pairs) => {
                refresh_display_fields(self.indicators.as_ref(), self.progress.as_ref(), &dot_pairs).await;
            }
            Err(e) => error!("[SCHEDULER] Skipping display refresh: {}", e),
        }

        let pairs = match load_pairs(&self.tickers_file) {
            Ok(pairs) => pairs,
            Err(e) => {
                error!("[SCHEDULER] Skipping stage sweep: {}", e);
                return CycleSummary::default();
            }
        };
        self.note_pair_changes(&pairs);

        let summary = self.driver.run_cycle(&pairs).await;
        info!(
            "[SCHEDULER] Cycle complete: {} advanced, {} unchanged, {} reset, {} failed",
            summary.advanced, summary.unchanged, summary.reset, summary.failed
        );
        summary
    }

    /// Runs a cycle every `interval_mins` until `shutdown` resolves. An interval of 0
    /// runs a single cycle.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        if self.interval_mins == 0 {
            info!("[SCHEDULER] Interval is 0, running a single cycle.");
            self.run_once().await;
            return;
        }

        info!("[SCHEDULER] Service started. Interval: {}m", self.interval_mins);
        let mut ticker = interval(Duration::from_secs(self.interval_mins * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    info!("[SCHEDULER] Stop requested, exiting between cycles.");
                    break;
                }
            }
            self.run_once().await;
            info!("[SCHEDULER] Next cycle in approx {} minutes.", self.interval_mins);
        }
    }
}
