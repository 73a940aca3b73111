// src/types.rs
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An (instrument, timeframe) unit that progresses through the stage machine on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedPair {
    pub instrument: String,
    pub timeframe: String,
}

impl TrackedPair {
    pub fn new(instrument: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe: timeframe.into(),
        }
    }
}

impl fmt::Display for TrackedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.instrument, self.timeframe)
    }
}

// --- Indicator feed ---

/// One time-stamped indicator row, already parsed at the store boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub instrument: String,
    pub timeframe: String,
    pub event_time: DateTime<Utc>,
    pub crossing_up: Option<f64>,
    pub crossing_down: Option<f64>,
    pub entry_signal: bool,
    pub money_flow: Option<f64>,
    pub price: Option<f64>,
}

impl IndicatorRecord {
    /// A bare record with no crossings and no entry signal.
    pub fn at(pair: &TrackedPair, event_time: DateTime<Utc>) -> Self {
        Self {
            instrument: pair.instrument.clone(),
            timeframe: pair.timeframe.clone(),
            event_time,
            crossing_up: None,
            crossing_down: None,
            entry_signal: false,
            money_flow: None,
            price: None,
        }
    }

    pub fn with_entry_signal(mut self) -> Self {
        self.entry_signal = true;
        self
    }

    pub fn with_crossing_up(mut self, magnitude: f64) -> Self {
        self.crossing_up = Some(magnitude);
        self
    }

    pub fn with_crossing_down(mut self, magnitude: f64) -> Self {
        self.crossing_down = Some(magnitude);
        self
    }

    pub fn with_money_flow(mut self, money_flow: f64) -> Self {
        self.money_flow = Some(money_flow);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn has_crossing(&self) -> bool {
        self.crossing_up.is_some() || self.crossing_down.is_some()
    }
}

/// Selection applied by `IndicatorStore::find_latest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    Any,
    EntrySignal,
    AnyCrossing,
}

impl RecordFilter {
    pub fn matches(&self, record: &IndicatorRecord) -> bool {
        match self {
            RecordFilter::Any => true,
            RecordFilter::EntrySignal => record.entry_signal,
            RecordFilter::AnyCrossing => record.has_crossing(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// Parses the feed's timestamp formats into UTC.
///
/// Accepts RFC 3339 (`2024-03-01T10:15:00Z`) and the naive
/// `2024-03-01 10:15:00` form, which is taken as UTC.
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parses an optional magnitude column. Empty and `null` mean "not set";
/// anything else that is not a number is an error.
pub fn parse_magnitude(raw: Option<&str>) -> Result<Option<f64>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("null") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("'{}' is not a number", s)),
    }
}

/// Interprets the entry-signal column (`1`, `1.0`, `true`).
pub fn parse_flag(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None => false,
        Some(s) if s.eq_ignore_ascii_case("true") => true,
        Some(s) => s.parse::<f64>().map(|v| v == 1.0).unwrap_or(false),
    }
}

// --- Stage machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Idle = 0,
    Entry = 1,
    Invalidation = 2,
    Completion = 3,
}

impl Stage {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Idle
    }
}

impl TryFrom<i64> for Stage {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Stage::Idle),
            1 => Ok(Stage::Entry),
            2 => Ok(Stage::Invalidation),
            3 => Ok(Stage::Completion),
            other => Err(format!("stage {} is outside 0..=3", other)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Persisted progress of one pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressRecord {
    pub stage: Stage,
    pub start_time: Option<DateTime<Utc>>,
    pub entry_time: Option<DateTime<Utc>>,
    pub invalidation_anchor_time: Option<DateTime<Utc>>,
    pub invalidation_anchor_value: Option<f64>,
    pub completion_time: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    // Display-only; never read by the stage machine.
    pub is_red_dot: Option<bool>,
    pub is_green_dot: Option<bool>,
    pub money_flow: Option<f64>,
    pub price: Option<f64>,
}

/// A single field's change in a partial upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Patch<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T: Clone> Patch<T> {
    pub fn apply_to(&self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Set(v) => *slot = Some(v.clone()),
            Patch::Clear => *slot = None,
        }
    }
}

/// Partial update of a `ProgressRecord`. Fields left at `Keep` are never touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub stage: Option<Stage>,
    pub start_time: Patch<DateTime<Utc>>,
    pub entry_time: Patch<DateTime<Utc>>,
    pub invalidation_anchor_time: Patch<DateTime<Utc>>,
    pub invalidation_anchor_value: Patch<f64>,
    pub completion_time: Patch<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_red_dot: Option<bool>,
    pub is_green_dot: Option<bool>,
    pub money_flow: Option<f64>,
    pub price: Option<f64>,
}

impl ProgressUpdate {
    /// Writes only the stage (and the timestamp of the write).
    pub fn stage(stage: Stage, now: DateTime<Utc>) -> Self {
        Self {
            stage: Some(stage),
            last_updated: Some(now),
            ..Default::default()
        }
    }

    /// Stage 0 with every anchor cleared.
    pub fn full_clear(now: DateTime<Utc>) -> Self {
        Self {
            stage: Some(Stage::Idle),
            start_time: Patch::Clear,
            entry_time: Patch::Clear,
            invalidation_anchor_time: Patch::Clear,
            invalidation_anchor_value: Patch::Clear,
            completion_time: Patch::Clear,
            last_updated: Some(now),
            ..Default::default()
        }
    }

    pub fn entered(entry_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            start_time: Patch::Set(entry_time),
            entry_time: Patch::Set(entry_time),
            ..Self::stage(Stage::Entry, now)
        }
    }

    pub fn invalidation_anchored(anchor_time: DateTime<Utc>, anchor_value: f64, now: DateTime<Utc>) -> Self {
        Self {
            invalidation_anchor_time: Patch::Set(anchor_time),
            invalidation_anchor_value: Patch::Set(anchor_value),
            ..Self::stage(Stage::Invalidation, now)
        }
    }

    pub fn completed(completion_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            completion_time: Patch::Set(completion_time),
            ..Self::stage(Stage::Completion, now)
        }
    }

    /// Display fields only; the stage machine's fields stay untouched.
    pub fn display(
        is_red_dot: bool,
        is_green_dot: bool,
        money_flow: Option<f64>,
        price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_red_dot: Some(is_red_dot),
            is_green_dot: Some(is_green_dot),
            money_flow,
            price,
            last_updated: Some(now),
            ..Default::default()
        }
    }
}

impl ProgressRecord {
    pub fn apply(&mut self, update: &ProgressUpdate) {
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        update.start_time.apply_to(&mut self.start_time);
        update.entry_time.apply_to(&mut self.entry_time);
        update.invalidation_anchor_time.apply_to(&mut self.invalidation_anchor_time);
        update.invalidation_anchor_value.apply_to(&mut self.invalidation_anchor_value);
        update.completion_time.apply_to(&mut self.completion_time);
        if update.last_updated.is_some() {
            self.last_updated = update.last_updated;
        }
        if update.is_red_dot.is_some() {
            self.is_red_dot = update.is_red_dot;
        }
        if update.is_green_dot.is_some() {
            self.is_green_dot = update.is_green_dot;
        }
        if update.money_flow.is_some() {
            self.money_flow = update.money_flow;
        }
        if update.price.is_some() {
            self.price = update.price;
        }
    }
}

// --- Trade events ---

/// One completed pattern instance. `notified` guards the one-shot alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub instrument: String,
    pub timeframe: String,
    pub completion_time: DateTime<Utc>,
    pub entry_time: Option<DateTime<Utc>>,
    pub invalidation_anchor_time: Option<DateTime<Utc>>,
    pub invalidation_anchor_value: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub notified: bool,
}

impl TradeEvent {
    pub fn pair(&self) -> TrackedPair {
        TrackedPair::new(self.instrument.clone(), self.timeframe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_event_time(s).unwrap()
    }

    #[test]
    fn test_parse_event_time_formats() {
        let rfc = ts("2024-03-01T10:15:00Z");
        let naive = ts("2024-03-01 10:15:00");
        assert_eq!(rfc, naive);
        assert!(parse_event_time("").is_none());
        assert!(parse_event_time("yesterday").is_none());
    }

    #[test]
    fn test_parse_magnitude_null_and_garbage() {
        assert_eq!(parse_magnitude(None), Ok(None));
        assert_eq!(parse_magnitude(Some("null")), Ok(None));
        assert_eq!(parse_magnitude(Some(" ")), Ok(None));
        assert_eq!(parse_magnitude(Some("-9.5")), Ok(Some(-9.5)));
        assert!(parse_magnitude(Some("abc")).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some("1.0")));
        assert!(parse_flag(Some("TRUE")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn test_full_clear_keeps_display_fields() {
        let now = ts("2024-03-01T10:15:00Z");
        let mut record = ProgressRecord {
            stage: Stage::Completion,
            start_time: Some(now),
            entry_time: Some(now),
            invalidation_anchor_time: Some(now),
            invalidation_anchor_value: Some(10.0),
            completion_time: Some(now),
            money_flow: Some(3.2),
            is_green_dot: Some(true),
            ..Default::default()
        };

        record.apply(&ProgressUpdate::full_clear(now));

        assert_eq!(record.stage, Stage::Idle);
        assert!(record.start_time.is_none());
        assert!(record.entry_time.is_none());
        assert!(record.invalidation_anchor_time.is_none());
        assert!(record.invalidation_anchor_value.is_none());
        assert!(record.completion_time.is_none());
        assert_eq!(record.money_flow, Some(3.2));
        assert_eq!(record.is_green_dot, Some(true));
    }

    #[test]
    fn test_stage_only_update_leaves_anchors() {
        let t1 = ts("2024-03-01T10:15:00Z");
        let mut record = ProgressRecord::default();
        record.apply(&ProgressUpdate::entered(t1, t1));
        record.apply(&ProgressUpdate::stage(Stage::Entry, ts("2024-03-01T10:30:00Z")));

        assert_eq!(record.stage, Stage::Entry);
        assert_eq!(record.entry_time, Some(t1));
        assert_eq!(record.start_time, Some(t1));
    }

    #[test]
    fn test_stage_try_from() {
        assert_eq!(Stage::try_from(2), Ok(Stage::Invalidation));
        assert!(Stage::try_from(4).is_err());
    }
}
