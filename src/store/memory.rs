// src/store/memory.rs
// In-process stores for tests and dry runs.
//
// Duplicate event_time values keep insertion order in ascending scans;
// descending scans are the exact reverse, so the last-inserted duplicate is "latest".
use crate::errors::StoreError;
use crate::store::{IndicatorStore, ProgressStore, TradeEventStore};
use crate::types::{
    IndicatorRecord, ProgressRecord, ProgressUpdate, RecordFilter, ScanOrder, TrackedPair, TradeEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryIndicatorStore {
    series: RwLock<HashMap<TrackedPair, Vec<IndicatorRecord>>>,
    unavailable: AtomicBool,
}

impl MemoryIndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: IndicatorRecord) {
        let pair = TrackedPair::new(record.instrument.clone(), record.timeframe.clone());
        self.series.write().entry(pair).or_default().push(record);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory indicator store offline".to_string()));
        }
        Ok(())
    }

    fn ordered(&self, pair: &TrackedPair, after: Option<DateTime<Utc>>, order: ScanOrder) -> Vec<IndicatorRecord> {
        let series = self.series.read();
        let mut records: Vec<IndicatorRecord> = series
            .get(pair)
            .map(|rs| {
                rs.iter()
                    .filter(|r| after.map_or(true, |bound| r.event_time > bound))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.event_time.cmp(&b.event_time));
        if order == ScanOrder::Descending {
            records.reverse();
        }
        records
    }
}

#[async_trait]
impl IndicatorStore for MemoryIndicatorStore {
    async fn find_latest(
        &self,
        pair: &TrackedPair,
        filter: RecordFilter,
    ) -> Result<Option<IndicatorRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .ordered(pair, None, ScanOrder::Descending)
            .into_iter()
            .find(|r| filter.matches(r)))
    }

    async fn scan(
        &self,
        pair: &TrackedPair,
        after: Option<DateTime<Utc>>,
        order: ScanOrder,
    ) -> Result<Vec<IndicatorRecord>, StoreError> {
        self.check_available()?;
        Ok(self.ordered(pair, after, order))
    }
}

fn trade_event_key(pair: &TrackedPair, completion_time: DateTime<Utc>) -> (TrackedPair, DateTime<Utc>) {
    (pair.clone(), completion_time)
}

#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    progress: RwLock<HashMap<TrackedPair, ProgressRecord>>,
    trade_events: RwLock<HashMap<(TrackedPair, DateTime<Utc>), TradeEvent>>,
    unavailable: AtomicBool,
    trade_events_unavailable: AtomicBool,
    upserts: AtomicUsize,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fails only the trade-event side; progress reads and writes keep working.
    pub fn set_trade_events_unavailable(&self, unavailable: bool) {
        self.trade_events_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored record, or `None` when the pair was never written.
    pub fn snapshot(&self, pair: &TrackedPair) -> Option<ProgressRecord> {
        self.progress.read().get(pair).cloned()
    }

    pub fn trade_events(&self) -> Vec<TradeEvent> {
        let mut events: Vec<TradeEvent> = self.trade_events.read().values().cloned().collect();
        events.sort_by(|a, b| a.completion_time.cmp(&b.completion_time));
        events
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory progress store offline".to_string()));
        }
        Ok(())
    }

    fn check_trade_events_available(&self) -> Result<(), StoreError> {
        self.check_available()?;
        if self.trade_events_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory trade event store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, pair: &TrackedPair) -> Result<ProgressRecord, StoreError> {
        self.check_available()?;
        Ok(self.snapshot(pair).unwrap_or_default())
    }

    async fn upsert(&self, pair: &TrackedPair, update: &ProgressUpdate) -> Result<(), StoreError> {
        self.check_available()?;
        self.progress.write().entry(pair.clone()).or_default().apply(update);
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TradeEventStore for MemoryProgressStore {
    async fn record_completion(&self, event: &TradeEvent) -> Result<TradeEvent, StoreError> {
        self.check_trade_events_available()?;
        let key = trade_event_key(&event.pair(), event.completion_time);
        Ok(self.trade_events.write().entry(key).or_insert_with(|| event.clone()).clone())
    }

    async fn mark_notified(&self, event: &TradeEvent) -> Result<(), StoreError> {
        self.check_trade_events_available()?;
        let key = trade_event_key(&event.pair(), event.completion_time);
        match self.trade_events.write().get_mut(&key) {
            Some(stored) => {
                stored.notified = true;
                Ok(())
            }
            None => Err(StoreError::Corrupt {
                key: format!("{}@{}", key.0, key.1),
                reason: "trade event vanished before it was marked notified".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_event_time;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_event_time(s).unwrap()
    }

    #[tokio::test]
    async fn test_scan_is_strictly_after_and_ordered() {
        let pair = TrackedPair::new("X", "5");
        let store = MemoryIndicatorStore::new();
        store.push(IndicatorRecord::at(&pair, ts("2024-03-01T10:10:00Z")));
        store.push(IndicatorRecord::at(&pair, ts("2024-03-01T10:00:00Z")));
        store.push(IndicatorRecord::at(&pair, ts("2024-03-01T10:05:00Z")));

        let after = store
            .scan(&pair, Some(ts("2024-03-01T10:00:00Z")), ScanOrder::Ascending)
            .await
            .unwrap();
        let times: Vec<_> = after.iter().map(|r| r.event_time).collect();
        assert_eq!(times, vec![ts("2024-03-01T10:05:00Z"), ts("2024-03-01T10:10:00Z")]);
    }

    #[tokio::test]
    async fn test_find_latest_duplicate_timestamp_takes_last_inserted() {
        let pair = TrackedPair::new("X", "5");
        let store = MemoryIndicatorStore::new();
        let t = ts("2024-03-01T10:00:00Z");
        store.push(IndicatorRecord::at(&pair, t).with_entry_signal().with_price(1.0));
        store.push(IndicatorRecord::at(&pair, t).with_entry_signal().with_price(2.0));

        let latest = store.find_latest(&pair, RecordFilter::EntrySignal).await.unwrap().unwrap();
        assert_eq!(latest.price, Some(2.0));
    }

    #[tokio::test]
    async fn test_record_completion_is_idempotent() {
        let store = MemoryProgressStore::new();
        let event = TradeEvent {
            instrument: "X".to_string(),
            timeframe: "5".to_string(),
            completion_time: ts("2024-03-01T10:00:00Z"),
            entry_time: None,
            invalidation_anchor_time: None,
            invalidation_anchor_value: None,
            recorded_at: ts("2024-03-01T10:01:00Z"),
            notified: false,
        };

        store.record_completion(&event).await.unwrap();
        store.mark_notified(&event).await.unwrap();
        let again = store.record_completion(&event).await.unwrap();

        assert!(again.notified);
        assert_eq!(store.trade_events().len(), 1);
    }
}
