// src/dot_snapshot.rs
// Display fields (latest dot colour, money flow, price) for the dot-ticker list.
// Written through the same partial upsert as the stage machine but never read by it.
use crate::errors::StoreError;
use crate::store::{IndicatorStore, ProgressStore};
use crate::types::{IndicatorRecord, ProgressUpdate, RecordFilter, TrackedPair};
use chrono::Utc;
use log::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub struct DotSnapshot {
    pub is_red_dot: bool,
    pub is_green_dot: bool,
    pub money_flow: Option<f64>,
    pub price: Option<f64>,
}

/// A bullish crossing wins when a record carries both.
pub fn snapshot_from(latest_crossing: &IndicatorRecord, latest: Option<&IndicatorRecord>) -> DotSnapshot {
    let is_green_dot = latest_crossing.crossing_up.is_some();
    let is_red_dot = !is_green_dot && latest_crossing.crossing_down.is_some();
    DotSnapshot {
        is_red_dot,
        is_green_dot,
        money_flow: latest.and_then(|r| r.money_flow),
        price: latest.and_then(|r| r.price),
    }
}

async fn refresh_pair(
    indicators: &dyn IndicatorStore,
    progress: &dyn ProgressStore,
    pair: &TrackedPair,
) -> Result<Option<DotSnapshot>, StoreError> {
    let Some(latest_crossing) = indicators.find_latest(pair, RecordFilter::AnyCrossing).await? else {
        return Ok(None);
    };
    let latest = indicators.find_latest(pair, RecordFilter::Any).await?;
    let snapshot = snapshot_from(&latest_crossing, latest.as_ref());

    let update = ProgressUpdate::display(
        snapshot.is_red_dot,
        snapshot.is_green_dot,
        snapshot.money_flow,
        snapshot.price,
        Utc::now(),
    );
    progress.upsert(pair, &update).await?;
    Ok(Some(snapshot))
}

/// Returns how many pairs were refreshed. Failures are logged per pair.
pub async fn refresh_display_fields(
    indicators: &dyn IndicatorStore,
    progress: &dyn ProgressStore,
    pairs: &[TrackedPair],
) -> usize {
    info!(
        "[DOTS] Getting current green and red dots for {} ticker(s)",
        pairs.len()
    );
    let mut refreshed = 0;
    for pair in pairs {
        match refresh_pair(indicators, progress, pair).await {
            Ok(Some(snapshot)) => {
                refreshed += 1;
                info!(
                    "[DOTS] {}: red={} green={} money_flow={:?}",
                    pair, snapshot.is_red_dot, snapshot.is_green_dot, snapshot.money_flow
                );
            }
            Ok(None) => info!("[DOTS] No dot found for {}", pair),
            Err(e) => error!("[DOTS] Error collecting data for {}: {}", pair, e),
        }
    }
    refreshed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryIndicatorStore, MemoryProgressStore};
    use crate::types::{parse_event_time, Stage};

    #[test]
    fn test_green_wins_over_red_on_same_record() {
        let pair = TrackedPair::new("X", "5");
        let t = parse_event_time("2024-03-01T10:00:00Z").unwrap();
        let record = IndicatorRecord::at(&pair, t).with_crossing_up(-3.0).with_crossing_down(4.0);

        let snapshot = snapshot_from(&record, None);
        assert!(snapshot.is_green_dot);
        assert!(!snapshot.is_red_dot);
    }

    #[tokio::test]
    async fn test_refresh_uses_latest_record_for_money_flow() {
        let pair = TrackedPair::new("X", "5");
        let indicators = MemoryIndicatorStore::new();
        let progress = MemoryProgressStore::new();
        indicators.push(
            IndicatorRecord::at(&pair, parse_event_time("2024-03-01T10:00:00Z").unwrap())
                .with_crossing_down(12.0)
                .with_money_flow(-4.0),
        );
        indicators.push(
            IndicatorRecord::at(&pair, parse_event_time("2024-03-01T10:05:00Z").unwrap())
                .with_money_flow(6.5)
                .with_price(101.0),
        );

        let refreshed = refresh_display_fields(&indicators, &progress, &[pair.clone()]).await;
        assert_eq!(refreshed, 1);

        let record = progress.snapshot(&pair).unwrap();
        assert_eq!(record.is_red_dot, Some(true));
        assert_eq!(record.is_green_dot, Some(false));
        assert_eq!(record.money_flow, Some(6.5));
        assert_eq!(record.price, Some(101.0));
        assert_eq!(record.stage, Stage::Idle);
    }

    #[tokio::test]
    async fn test_pair_without_crossings_is_skipped() {
        let pair = TrackedPair::new("X", "5");
        let indicators = MemoryIndicatorStore::new();
        let progress = MemoryProgressStore::new();
        indicators.push(IndicatorRecord::at(&pair, parse_event_time("2024-03-01T10:00:00Z").unwrap()));

        assert_eq!(refresh_display_fields(&indicators, &progress, &[pair.clone()]).await, 0);
        assert!(progress.snapshot(&pair).is_none());
    }
}
