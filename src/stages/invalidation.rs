// src/stages/invalidation.rs
// Stage 2: the first strong bearish crossing ("red dot") after the entry.
use crate::config::PatternThresholds;
use crate::errors::StoreError;
use crate::store::IndicatorStore;
use crate::types::{IndicatorRecord, ScanOrder, TrackedPair};
use chrono::{DateTime, Utc};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidationOutcome {
    Anchored {
        anchor_time: DateTime<Utc>,
        anchor_value: f64,
    },
    /// Nothing qualifies yet. The pattern is still alive at stage 1.
    NotYet,
}

/// `records` must be in ascending time order. The raw magnitude is compared,
/// not its sign-flipped value.
pub fn detect_invalidation(records: &[IndicatorRecord], thresholds: &PatternThresholds) -> InvalidationOutcome {
    for record in records {
        let Some(magnitude) = record.crossing_down else {
            continue;
        };
        if magnitude >= thresholds.red_dot_min {
            return InvalidationOutcome::Anchored {
                anchor_time: record.event_time,
                anchor_value: magnitude,
            };
        }
        debug!(
            "[STAGE2] Weak red dot at {} ({} < {})",
            record.event_time, magnitude, thresholds.red_dot_min
        );
    }
    InvalidationOutcome::NotYet
}

pub async fn find_invalidation(
    store: &dyn IndicatorStore,
    pair: &TrackedPair,
    start_time: DateTime<Utc>,
    thresholds: &PatternThresholds,
) -> Result<InvalidationOutcome, StoreError> {
    let records = store.scan(pair, Some(start_time), ScanOrder::Ascending).await?;
    let outcome = detect_invalidation(&records, thresholds);
    match outcome {
        InvalidationOutcome::Anchored {
            anchor_time,
            anchor_value,
        } => info!(
            "[STAGE2] Red dot for {} at {} (value {})",
            pair, anchor_time, anchor_value
        ),
        InvalidationOutcome::NotYet => info!(
            "[STAGE2] No red dot for {} in {} record(s) after {}",
            pair,
            records.len(),
            start_time
        ),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_event_time;

    fn rec(time: &str) -> IndicatorRecord {
        IndicatorRecord::at(&TrackedPair::new("X", "5"), parse_event_time(time).unwrap())
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let thresholds = PatternThresholds::default();
        let records = vec![
            rec("2024-03-01T10:00:00Z").with_crossing_down(8.99),
            rec("2024-03-01T10:05:00Z").with_crossing_down(9.0),
            rec("2024-03-01T10:10:00Z").with_crossing_down(15.0),
        ];

        assert_eq!(
            detect_invalidation(&records, &thresholds),
            InvalidationOutcome::Anchored {
                anchor_time: parse_event_time("2024-03-01T10:05:00Z").unwrap(),
                anchor_value: 9.0,
            }
        );
    }

    #[test]
    fn test_below_threshold_never_fires() {
        let thresholds = PatternThresholds::default();
        let records = vec![
            rec("2024-03-01T10:00:00Z").with_crossing_down(8.5),
            rec("2024-03-01T10:05:00Z").with_crossing_down(-20.0),
            rec("2024-03-01T10:10:00Z").with_crossing_up(30.0),
        ];

        assert_eq!(detect_invalidation(&records, &thresholds), InvalidationOutcome::NotYet);
    }

    #[test]
    fn test_empty_scan_is_not_yet() {
        assert_eq!(
            detect_invalidation(&[], &PatternThresholds::default()),
            InvalidationOutcome::NotYet
        );
    }
}
