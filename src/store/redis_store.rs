// src/store/redis_store.rs
// Progress records live in one Redis hash per pair; partial updates are HSET/HDEL
// pipelines run atomically. Trade events are JSON strings created with SET NX.
use crate::errors::StoreError;
use crate::store::{ProgressStore, TradeEventStore};
use crate::types::{parse_event_time, Patch, ProgressRecord, ProgressUpdate, Stage, TrackedPair, TradeEvent};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;

const F_STAGE: &str = "stage";
const F_START_TIME: &str = "start_time";
const F_ENTRY_TIME: &str = "entry_time";
const F_ANCHOR_TIME: &str = "invalidation_anchor_time";
const F_ANCHOR_VALUE: &str = "invalidation_anchor_value";
const F_COMPLETION_TIME: &str = "completion_time";
const F_LAST_UPDATED: &str = "last_updated";
const F_IS_RED_DOT: &str = "is_red_dot";
const F_IS_GREEN_DOT: &str = "is_green_dot";
const F_MONEY_FLOW: &str = "money_flow";
const F_PRICE: &str = "price";

fn fmt_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn progress_key(pair: &TrackedPair) -> String {
    format!("dot_progress:{}:{}", pair.instrument, pair.timeframe)
}

pub fn trade_event_key(pair: &TrackedPair, completion_time: &DateTime<Utc>) -> String {
    format!("trade_event:{}:{}:{}", pair.instrument, pair.timeframe, fmt_time(completion_time))
}

fn push_patch<T>(
    field: &'static str,
    patch: &Patch<T>,
    render: impl Fn(&T) -> String,
    sets: &mut Vec<(&'static str, String)>,
    clears: &mut Vec<&'static str>,
) {
    match patch {
        Patch::Keep => {}
        Patch::Set(v) => sets.push((field, render(v))),
        Patch::Clear => clears.push(field),
    }
}

/// Splits an update into hash fields to set and hash fields to delete.
pub fn encode_update(update: &ProgressUpdate) -> (Vec<(&'static str, String)>, Vec<&'static str>) {
    let mut sets = Vec::new();
    let mut clears = Vec::new();

    if let Some(stage) = update.stage {
        sets.push((F_STAGE, stage.as_i64().to_string()));
    }
    push_patch(F_START_TIME, &update.start_time, fmt_time, &mut sets, &mut clears);
    push_patch(F_ENTRY_TIME, &update.entry_time, fmt_time, &mut sets, &mut clears);
    push_patch(F_ANCHOR_TIME, &update.invalidation_anchor_time, fmt_time, &mut sets, &mut clears);
    push_patch(F_ANCHOR_VALUE, &update.invalidation_anchor_value, f64::to_string, &mut sets, &mut clears);
    push_patch(F_COMPLETION_TIME, &update.completion_time, fmt_time, &mut sets, &mut clears);

    if let Some(t) = &update.last_updated {
        sets.push((F_LAST_UPDATED, fmt_time(t)));
    }
    if let Some(v) = update.is_red_dot {
        sets.push((F_IS_RED_DOT, v.to_string()));
    }
    if let Some(v) = update.is_green_dot {
        sets.push((F_IS_GREEN_DOT, v.to_string()));
    }
    if let Some(v) = update.money_flow {
        sets.push((F_MONEY_FLOW, v.to_string()));
    }
    if let Some(v) = update.price {
        sets.push((F_PRICE, v.to_string()));
    }

    (sets, clears)
}

/// Rebuilds a record from a hash; an empty hash is the stage-0 default.
pub fn decode_progress(key: &str, fields: &HashMap<String, String>) -> Result<ProgressRecord, StoreError> {
    let corrupt = |field: &str, raw: &str| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("{} = '{}'", field, raw),
    };
    let time = |field: &str| -> Result<Option<DateTime<Utc>>, StoreError> {
        match fields.get(field) {
            None => Ok(None),
            Some(raw) => parse_event_time(raw).map(Some).ok_or_else(|| corrupt(field, raw)),
        }
    };
    let number = |field: &str| -> Result<Option<f64>, StoreError> {
        match fields.get(field) {
            None => Ok(None),
            Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| corrupt(field, raw)),
        }
    };
    let flag = |field: &str| -> Result<Option<bool>, StoreError> {
        match fields.get(field) {
            None => Ok(None),
            Some(raw) => raw.parse::<bool>().map(Some).map_err(|_| corrupt(field, raw)),
        }
    };

    let stage = match fields.get(F_STAGE) {
        None => Stage::Idle,
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .and_then(|n| Stage::try_from(n).ok())
            .ok_or_else(|| corrupt(F_STAGE, raw))?,
    };

    Ok(ProgressRecord {
        stage,
        start_time: time(F_START_TIME)?,
        entry_time: time(F_ENTRY_TIME)?,
        invalidation_anchor_time: time(F_ANCHOR_TIME)?,
        invalidation_anchor_value: number(F_ANCHOR_VALUE)?,
        completion_time: time(F_COMPLETION_TIME)?,
        last_updated: time(F_LAST_UPDATED)?,
        is_red_dot: flag(F_IS_RED_DOT)?,
        is_green_dot: flag(F_IS_GREEN_DOT)?,
        money_flow: number(F_MONEY_FLOW)?,
        price: number(F_PRICE)?,
    })
}

/// Redis-backed progress and trade-event store.
#[derive(Clone)]
pub struct RedisProgressStore {
    connection: MultiplexedConnection,
}

impl RedisProgressStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("[PROGRESS_STORE] Connected to Redis at {}", redis_url);
        Ok(Self { connection })
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn get(&self, pair: &TrackedPair) -> Result<ProgressRecord, StoreError> {
        let key = progress_key(pair);
        let mut con = self.connection.clone();
        let fields: HashMap<String, String> = con.hgetall(&key).await?;
        decode_progress(&key, &fields)
    }

    async fn upsert(&self, pair: &TrackedPair, update: &ProgressUpdate) -> Result<(), StoreError> {
        let key = progress_key(pair);
        let (sets, clears) = encode_update(update);
        if sets.is_empty() && clears.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        if !sets.is_empty() {
            pipe.hset_multiple(&key, &sets).ignore();
        }
        if !clears.is_empty() {
            pipe.hdel(&key, clears.clone()).ignore();
        }

        let mut con = self.connection.clone();
        pipe.query_async::<_, ()>(&mut con).await?;
        debug!("[PROGRESS_STORE] {} set {:?} cleared {:?}", key, sets, clears);
        Ok(())
    }
}

#[async_trait]
impl TradeEventStore for RedisProgressStore {
    async fn record_completion(&self, event: &TradeEvent) -> Result<TradeEvent, StoreError> {
        let key = trade_event_key(&event.pair(), &event.completion_time);
        let payload = serde_json::to_string(event)?;
        let mut con = self.connection.clone();

        let created: bool = con.set_nx(&key, payload).await?;
        if created {
            info!("[PROGRESS_STORE] Recorded trade event {}", key);
            return Ok(event.clone());
        }
        let stored: String = con.get(&key).await?;
        Ok(serde_json::from_str(&stored)?)
    }

    async fn mark_notified(&self, event: &TradeEvent) -> Result<(), StoreError> {
        let key = trade_event_key(&event.pair(), &event.completion_time);
        let mut notified = event.clone();
        notified.notified = true;
        let payload = serde_json::to_string(&notified)?;
        let mut con = self.connection.clone();
        let _: () = con.set(&key, payload).await?;
        Ok(())
    }
}
