// src/stages/reset.rs
// Post-completion watchdog: any red dot after the green dot makes the completed
// sequence stale.
use crate::errors::StoreError;
use crate::store::IndicatorStore;
use crate::types::{IndicatorRecord, ScanOrder, TrackedPair};
use chrono::{DateTime, Utc};
use log::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResetOutcome {
    Stale { red_dot_time: DateTime<Utc> },
    Hold,
}

/// `records` must be ascending and strictly after the completion time.
pub fn detect_reset(records: &[IndicatorRecord]) -> ResetOutcome {
    records
        .iter()
        .find(|r| r.crossing_down.is_some())
        .map(|r| ResetOutcome::Stale {
            red_dot_time: r.event_time,
        })
        .unwrap_or(ResetOutcome::Hold)
}

pub async fn check_reset(
    store: &dyn IndicatorStore,
    pair: &TrackedPair,
    completion_time: DateTime<Utc>,
) -> Result<ResetOutcome, StoreError> {
    let records = store.scan(pair, Some(completion_time), ScanOrder::Ascending).await?;
    let outcome = detect_reset(&records);
    match outcome {
        ResetOutcome::Stale { red_dot_time } => info!(
            "[RESET] New red dot for {} at {} after green dot at {}",
            pair, red_dot_time, completion_time
        ),
        ResetOutcome::Hold => info!(
            "[RESET] No new red dot after the green dot for {} at {}. No action taken.",
            pair, completion_time
        ),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryIndicatorStore;
    use crate::types::parse_event_time;

    fn t(s: &str) -> DateTime<Utc> {
        parse_event_time(s).unwrap()
    }

    #[tokio::test]
    async fn test_record_at_completion_time_does_not_reset() {
        let pair = TrackedPair::new("X", "5");
        let store = MemoryIndicatorStore::new();
        let completion = t("2024-03-01T10:00:00Z");
        store.push(IndicatorRecord::at(&pair, completion).with_crossing_down(3.0));

        assert_eq!(check_reset(&store, &pair, completion).await.unwrap(), ResetOutcome::Hold);
    }

    #[tokio::test]
    async fn test_earliest_later_red_dot_is_reported() {
        let pair = TrackedPair::new("X", "5");
        let store = MemoryIndicatorStore::new();
        let completion = t("2024-03-01T10:00:00Z");
        store.push(IndicatorRecord::at(&pair, t("2024-03-01T10:20:00Z")).with_crossing_down(2.0));
        store.push(IndicatorRecord::at(&pair, t("2024-03-01T10:05:00Z")).with_crossing_up(4.0));
        store.push(IndicatorRecord::at(&pair, t("2024-03-01T10:10:00Z")).with_crossing_down(-1.0));

        assert_eq!(
            check_reset(&store, &pair, completion).await.unwrap(),
            ResetOutcome::Stale {
                red_dot_time: t("2024-03-01T10:10:00Z")
            }
        );
    }
}
