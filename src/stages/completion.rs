// src/stages/completion.rs
// Stage 3: a strong bullish crossing ("green dot") after the red dot completes the
// pattern, unless a stronger red dot shows up first.
use crate::config::PatternThresholds;
use crate::errors::StoreError;
use crate::store::IndicatorStore;
use crate::types::{IndicatorRecord, ScanOrder, TrackedPair};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionOutcome {
    Completed { completion_time: DateTime<Utc> },
    /// A red dot stronger than the anchor broke the pattern.
    Invalidated { at: DateTime<Utc>, magnitude: f64 },
    NotYet,
}

/// `records` must be in ascending time order. On each record the invalidation
/// check runs before the completion check.
pub fn detect_completion(
    records: &[IndicatorRecord],
    anchor_value: f64,
    thresholds: &PatternThresholds,
) -> CompletionOutcome {
    for record in records {
        if let Some(down) = record.crossing_down {
            if down > anchor_value {
                return CompletionOutcome::Invalidated {
                    at: record.event_time,
                    magnitude: down,
                };
            }
        }
        if let Some(up) = record.crossing_up {
            if up <= thresholds.green_dot_max {
                return CompletionOutcome::Completed {
                    completion_time: record.event_time,
                };
            }
            debug!("[STAGE3] Weak green dot at {} ({})", record.event_time, up);
        }
    }
    CompletionOutcome::NotYet
}

pub async fn find_completion(
    store: &dyn IndicatorStore,
    pair: &TrackedPair,
    anchor_time: DateTime<Utc>,
    anchor_value: f64,
    thresholds: &PatternThresholds,
) -> Result<CompletionOutcome, StoreError> {
    // One second past the anchor so the red dot record itself is never re-read.
    let search_start = anchor_time + Duration::seconds(1);
    info!("[STAGE3] Searching for green dots after {} for {}", search_start, pair);

    let records = store.scan(pair, Some(search_start), ScanOrder::Ascending).await?;
    let outcome = detect_completion(&records, anchor_value, thresholds);
    match outcome {
        CompletionOutcome::Completed { completion_time } => {
            info!("[STAGE3] Green dot for {} at {}", pair, completion_time)
        }
        CompletionOutcome::Invalidated { at, magnitude } => info!(
            "[STAGE3] Breaking sequence for {}: higher red dot {} > {} at {}",
            pair, magnitude, anchor_value, at
        ),
        CompletionOutcome::NotYet => {
            info!("[STAGE3] No green dot for {} after red dot at {}", pair, anchor_time)
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_event_time;

    fn t(s: &str) -> DateTime<Utc> {
        parse_event_time(s).unwrap()
    }

    fn rec(time: &str) -> IndicatorRecord {
        IndicatorRecord::at(&TrackedPair::new("X", "5"), t(time))
    }

    #[test]
    fn test_invalidation_beats_completion_on_same_record() {
        let records = vec![rec("2024-03-01T10:00:00Z")
            .with_crossing_down(11.0)
            .with_crossing_up(-12.0)];

        assert_eq!(
            detect_completion(&records, 10.0, &PatternThresholds::default()),
            CompletionOutcome::Invalidated {
                at: t("2024-03-01T10:00:00Z"),
                magnitude: 11.0
            }
        );
    }

    #[test]
    fn test_equal_red_dot_does_not_invalidate() {
        let records = vec![
            rec("2024-03-01T10:00:00Z").with_crossing_down(10.0),
            rec("2024-03-01T10:05:00Z").with_crossing_up(-9.0),
        ];

        assert_eq!(
            detect_completion(&records, 10.0, &PatternThresholds::default()),
            CompletionOutcome::Completed {
                completion_time: t("2024-03-01T10:05:00Z")
            }
        );
    }

    #[test]
    fn test_weak_green_dot_keeps_scanning() {
        let records = vec![
            rec("2024-03-01T10:00:00Z").with_crossing_up(-8.0),
            rec("2024-03-01T10:05:00Z").with_crossing_up(5.0),
        ];

        assert_eq!(
            detect_completion(&records, 10.0, &PatternThresholds::default()),
            CompletionOutcome::NotYet
        );
    }

    #[tokio::test]
    async fn test_scan_skips_the_second_after_the_anchor() {
        use crate::store::MemoryIndicatorStore;

        let pair = TrackedPair::new("X", "5");
        let store = MemoryIndicatorStore::new();
        let anchor = t("2024-03-01T10:00:00Z");
        store.push(IndicatorRecord::at(&pair, anchor).with_crossing_down(10.0));
        store.push(IndicatorRecord::at(&pair, t("2024-03-01T10:00:01Z")).with_crossing_up(-20.0));
        store.push(IndicatorRecord::at(&pair, t("2024-03-01T10:00:02Z")).with_crossing_up(-9.5));

        let outcome = find_completion(&store, &pair, anchor, 10.0, &PatternThresholds::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::Completed {
                completion_time: t("2024-03-01T10:00:02Z")
            }
        );
    }
}
