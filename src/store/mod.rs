// src/store/mod.rs
pub mod influx;
pub mod memory;
pub mod redis_store;

use crate::errors::StoreError;
use crate::types::{
    IndicatorRecord, ProgressRecord, ProgressUpdate, RecordFilter, ScanOrder, TrackedPair, TradeEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use influx::InfluxIndicatorStore;
pub use memory::{MemoryIndicatorStore, MemoryProgressStore};
pub use redis_store::RedisProgressStore;

/// Read-only access to the indicator series of each pair.
#[async_trait]
pub trait IndicatorStore: Send + Sync {
    /// Most recent record of the pair that matches `filter`.
    async fn find_latest(
        &self,
        pair: &TrackedPair,
        filter: RecordFilter,
    ) -> Result<Option<IndicatorRecord>, StoreError>;

    /// Every record with `event_time > after` (all records when `after` is `None`),
    /// ordered by `event_time`.
    async fn scan(
        &self,
        pair: &TrackedPair,
        after: Option<DateTime<Utc>>,
        order: ScanOrder,
    ) -> Result<Vec<IndicatorRecord>, StoreError>;
}

/// Per-pair progress, written only by the pattern driver and the display refresh.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Stored progress, or the stage-0 default when the pair was never written.
    async fn get(&self, pair: &TrackedPair) -> Result<ProgressRecord, StoreError>;

    /// Applies `update` atomically; fields left at `Keep`/`None` are untouched.
    async fn upsert(&self, pair: &TrackedPair, update: &ProgressUpdate) -> Result<(), StoreError>;
}

/// Append-only log of completed pattern instances.
#[async_trait]
pub trait TradeEventStore: Send + Sync {
    /// Inserts `event` unless an event with the same (pair, completion_time) exists,
    /// and returns whichever event is stored.
    async fn record_completion(&self, event: &TradeEvent) -> Result<TradeEvent, StoreError>;

    async fn mark_notified(&self, event: &TradeEvent) -> Result<(), StoreError>;
}
