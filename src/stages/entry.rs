// src/stages/entry.rs
// Stage 1: the most recent entry signal ("big green dot") anchors the sequence.
use crate::errors::StoreError;
use crate::store::IndicatorStore;
use crate::types::{RecordFilter, TrackedPair};
use chrono::{DateTime, Utc};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryOutcome {
    Found { entry_time: DateTime<Utc> },
    /// No entry signal exists at all; the pair goes back to stage 0.
    Broken,
}

pub async fn find_entry(store: &dyn IndicatorStore, pair: &TrackedPair) -> Result<EntryOutcome, StoreError> {
    debug!("[STAGE1] Looking for big green dot for {}", pair);
    match store.find_latest(pair, RecordFilter::EntrySignal).await? {
        Some(record) => {
            info!("[STAGE1] Big green dot for {} at {}", pair, record.event_time);
            Ok(EntryOutcome::Found {
                entry_time: record.event_time,
            })
        }
        None => {
            info!("[STAGE1] No big green dot found for {}", pair);
            Ok(EntryOutcome::Broken)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryIndicatorStore;
    use crate::types::{parse_event_time, IndicatorRecord};

    #[tokio::test]
    async fn test_latest_entry_signal_wins() {
        let pair = TrackedPair::new("X", "5");
        let store = MemoryIndicatorStore::new();
        let t1 = parse_event_time("2024-03-01T10:00:00Z").unwrap();
        let t2 = parse_event_time("2024-03-01T11:00:00Z").unwrap();
        let t3 = parse_event_time("2024-03-01T12:00:00Z").unwrap();
        store.push(IndicatorRecord::at(&pair, t2).with_entry_signal());
        store.push(IndicatorRecord::at(&pair, t1).with_entry_signal());
        store.push(IndicatorRecord::at(&pair, t3).with_crossing_down(12.0));

        let outcome = find_entry(&store, &pair).await.unwrap();
        assert_eq!(outcome, EntryOutcome::Found { entry_time: t2 });
    }

    #[tokio::test]
    async fn test_no_entry_signal_is_broken() {
        let pair = TrackedPair::new("X", "5");
        let store = MemoryIndicatorStore::new();
        let t1 = parse_event_time("2024-03-01T10:00:00Z").unwrap();
        store.push(IndicatorRecord::at(&pair, t1).with_crossing_up(-12.0));

        assert_eq!(find_entry(&store, &pair).await.unwrap(), EntryOutcome::Broken);
    }
}
