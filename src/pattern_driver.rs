// src/pattern_driver.rs
// Drives every tracked pair through the stage machine once per cycle.
//
// Stage 0 -> Stage1 detector, 1 -> Stage2, 2 -> Stage3, 3 -> announce + reset check. A successful
// transition is persisted immediately and the next detector runs in the same cycle, so
// one poll can fast-forward 0 -> 3. Any transition back to stage 0 ends the pair's turn.
use crate::config::PatternThresholds;
use crate::errors::DriverError;
use crate::notifications::{format_completion_message, Notifier};
use crate::stages::{
    check_reset, find_completion, find_entry, find_invalidation, CompletionOutcome, EntryOutcome,
    InvalidationOutcome, ResetOutcome,
};
use crate::store::{IndicatorStore, ProgressStore, TradeEventStore};
use crate::types::{Patch, ProgressRecord, ProgressUpdate, Stage, TrackedPair, TradeEvent};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Entered { entry_time: DateTime<Utc> },
    RedDot { anchor_time: DateTime<Utc>, anchor_value: f64 },
    GreenDot { completion_time: DateTime<Utc> },
    /// Stage 3 scan found a red dot stronger than the anchor.
    Invalidated { at: DateTime<Utc> },
    /// A red dot appeared after a completed pattern.
    Reset { at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairReport {
    pub pair: TrackedPair,
    pub from: Stage,
    pub to: Stage,
    pub transitions: Vec<Transition>,
}

impl PairReport {
    fn new(pair: &TrackedPair, from: Stage) -> Self {
        Self {
            pair: pair.clone(),
            from,
            to: from,
            transitions: Vec::new(),
        }
    }

    fn record(&mut self, to: Stage, transition: Transition) {
        self.to = to;
        self.transitions.push(transition);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub advanced: usize,
    pub unchanged: usize,
    pub reset: usize,
    pub failed: usize,
}

impl CycleSummary {
    fn count(&mut self, report: &PairReport) {
        if report.transitions.is_empty() {
            self.unchanged += 1;
        } else if report.to == Stage::Idle {
            self.reset += 1;
        } else {
            self.advanced += 1;
        }
    }
}

/// Anchors carried between detectors within one pair's turn.
#[derive(Debug, Clone, Default)]
struct Anchors {
    start_time: Option<DateTime<Utc>>,
    entry_time: Option<DateTime<Utc>>,
    red_dot_time: Option<DateTime<Utc>>,
    red_dot_value: Option<f64>,
    green_dot_time: Option<DateTime<Utc>>,
}

impl From<&ProgressRecord> for Anchors {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            // Older records may only carry the entry time.
            start_time: record.start_time.or(record.entry_time),
            entry_time: record.entry_time,
            red_dot_time: record.invalidation_anchor_time,
            red_dot_value: record.invalidation_anchor_value,
            green_dot_time: record.completion_time,
        }
    }
}

pub struct PatternDriver {
    indicators: Arc<dyn IndicatorStore>,
    progress: Arc<dyn ProgressStore>,
    trade_events: Arc<dyn TradeEventStore>,
    notifier: Arc<dyn Notifier>,
    thresholds: PatternThresholds,
}

impl PatternDriver {
    pub fn new(
        indicators: Arc<dyn IndicatorStore>,
        progress: Arc<dyn ProgressStore>,
        trade_events: Arc<dyn TradeEventStore>,
        notifier: Arc<dyn Notifier>,
        thresholds: PatternThresholds,
    ) -> Self {
        Self {
            indicators,
            progress,
            trade_events,
            notifier,
            thresholds,
        }
    }

    /// Processes pairs one after another. A failing pair is logged and skipped.
    pub async fn run_cycle(&self, pairs: &[TrackedPair]) -> CycleSummary {
        let mut summary = CycleSummary::default();
        for pair in pairs {
            match self.advance(pair).await {
                Ok(report) => {
                    if report.from != report.to || !report.transitions.is_empty() {
                        info!(
                            "[DRIVER] {}: stage {} -> {} via {:?}",
                            pair, report.from, report.to, report.transitions
                        );
                    } else {
                        debug!("[DRIVER] {}: stays at stage {}", pair, report.to);
                    }
                    summary.count(&report);
                }
                Err(e) => {
                    error!("[DRIVER] Skipping {} this cycle: {}", pair, e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Runs as many detectors as the stored data allows for one pair.
    pub async fn advance(&self, pair: &TrackedPair) -> Result<PairReport, DriverError> {
        let record = self.progress.get(pair).await?;
        let mut report = PairReport::new(pair, record.stage);
        let mut anchors = Anchors::from(&record);
        let mut stage = record.stage;

        loop {
            match stage {
                Stage::Idle => match find_entry(self.indicators.as_ref(), pair).await? {
                    EntryOutcome::Found { entry_time } => {
                        self.write(pair, ProgressUpdate::entered(entry_time, Utc::now())).await?;
                        anchors = Anchors {
                            start_time: Some(entry_time),
                            entry_time: Some(entry_time),
                            ..Anchors::default()
                        };
                        stage = Stage::Entry;
                        report.record(stage, Transition::Entered { entry_time });
                    }
                    EntryOutcome::Broken => {
                        info!("[DRIVER] Setting stage to 0 for {}, pattern is broken", pair);
                        self.write(pair, ProgressUpdate::stage(Stage::Idle, Utc::now())).await?;
                        break;
                    }
                },

                Stage::Entry => {
                    let start_time = anchors.start_time.ok_or_else(|| missing(pair, stage, "start_time"))?;
                    match find_invalidation(self.indicators.as_ref(), pair, start_time, &self.thresholds).await? {
                        InvalidationOutcome::Anchored {
                            anchor_time,
                            anchor_value,
                        } => {
                            let mut update = ProgressUpdate::invalidation_anchored(anchor_time, anchor_value, Utc::now());
                            update.start_time = Patch::Set(start_time);
                            self.write(pair, update).await?;
                            anchors.red_dot_time = Some(anchor_time);
                            anchors.red_dot_value = Some(anchor_value);
                            stage = Stage::Invalidation;
                            report.record(
                                stage,
                                Transition::RedDot {
                                    anchor_time,
                                    anchor_value,
                                },
                            );
                        }
                        InvalidationOutcome::NotYet => {
                            self.write(pair, ProgressUpdate::stage(Stage::Entry, Utc::now())).await?;
                            break;
                        }
                    }
                }

                Stage::Invalidation => {
                    let anchor_time = anchors
                        .red_dot_time
                        .ok_or_else(|| missing(pair, stage, "invalidation_anchor_time"))?;
                    let anchor_value = anchors
                        .red_dot_value
                        .ok_or_else(|| missing(pair, stage, "invalidation_anchor_value"))?;

                    match find_completion(self.indicators.as_ref(), pair, anchor_time, anchor_value, &self.thresholds)
                        .await?
                    {
                        CompletionOutcome::Completed { completion_time } => {
                            self.write(pair, ProgressUpdate::completed(completion_time, Utc::now())).await?;
                            anchors.green_dot_time = Some(completion_time);
                            stage = Stage::Completion;
                            report.record(stage, Transition::GreenDot { completion_time });
                        }
                        CompletionOutcome::Invalidated { at, .. } => {
                            self.write(pair, ProgressUpdate::full_clear(Utc::now())).await?;
                            report.record(Stage::Idle, Transition::Invalidated { at });
                            break;
                        }
                        CompletionOutcome::NotYet => {
                            self.write(pair, ProgressUpdate::stage(Stage::Invalidation, Utc::now())).await?;
                            break;
                        }
                    }
                }

                Stage::Completion => {
                    let completion_time = anchors
                        .green_dot_time
                        .ok_or_else(|| missing(pair, stage, "completion_time"))?;
                    // Runs on every visit; the trade event's `notified` flag keeps it to one alert.
                    self.announce_completion(pair, &anchors, completion_time).await;
                    match check_reset(self.indicators.as_ref(), pair, completion_time).await? {
                        ResetOutcome::Stale { red_dot_time } => {
                            self.write(pair, ProgressUpdate::full_clear(Utc::now())).await?;
                            report.record(Stage::Idle, Transition::Reset { at: red_dot_time });
                        }
                        ResetOutcome::Hold => {}
                    }
                    break;
                }
            }
        }

        Ok(report)
    }

    async fn write(&self, pair: &TrackedPair, update: ProgressUpdate) -> Result<(), DriverError> {
        self.progress.upsert(pair, &update).await?;
        debug!("[DRIVER] Updated progress for {} to stage {:?}", pair, update.stage);
        Ok(())
    }

    /// Records the trade event and sends the alert unless it was already sent for this
    /// completion instance. Failures are logged and retried on the next stage-3 visit;
    /// nothing here can fail the pair's turn.
    async fn announce_completion(&self, pair: &TrackedPair, anchors: &Anchors, completion_time: DateTime<Utc>) {
        let event = TradeEvent {
            instrument: pair.instrument.clone(),
            timeframe: pair.timeframe.clone(),
            completion_time,
            entry_time: anchors.entry_time,
            invalidation_anchor_time: anchors.red_dot_time,
            invalidation_anchor_value: anchors.red_dot_value,
            recorded_at: Utc::now(),
            notified: false,
        };

        let stored = match self.trade_events.record_completion(&event).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("[DRIVER] Could not record trade event for {} at {}: {}", pair, completion_time, e);
                return;
            }
        };
        if stored.notified {
            debug!("[DRIVER] Completion of {} at {} was already notified", pair, completion_time);
            return;
        }

        match self.notifier.notify(&format_completion_message(&stored)).await {
            Ok(()) => {
                if let Err(e) = self.trade_events.mark_notified(&stored).await {
                    warn!("[DRIVER] Notified {} but could not flag the trade event: {}", pair, e);
                }
            }
            Err(e) => error!("[DRIVER] Notification for {} at {} failed: {}", pair, completion_time, e),
        }
    }
}

fn missing(pair: &TrackedPair, stage: Stage, field: &'static str) -> DriverError {
    DriverError::MissingAnchor {
        pair: pair.clone(),
        stage,
        field,
    }
}
