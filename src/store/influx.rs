// src/store/influx.rs
// Indicator reader over the InfluxDB v2 HTTP API (Flux query, CSV response).
use crate::config::InfluxSettings;
use crate::errors::StoreError;
use crate::store::IndicatorStore;
use crate::types::{
    parse_event_time, parse_flag, parse_magnitude, IndicatorRecord, RecordFilter, ScanOrder, TrackedPair,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, warn};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

/// Raw pivoted row as returned by the Flux query.
#[derive(Debug, Deserialize)]
pub struct IndicatorCsvRecord {
    #[serde(rename = "_time")]
    pub time: Option<String>,
    pub ticker: Option<String>,
    pub time_frame: Option<String>,
    pub blue_wave_crossing_up: Option<String>,
    pub blue_wave_crossing_down: Option<String>,
    pub buy: Option<String>,
    pub money_flow: Option<String>,
    pub price: Option<String>,
}

impl IndicatorCsvRecord {
    fn into_record(self, pair: &TrackedPair) -> Result<IndicatorRecord, String> {
        let raw_time = self.time.unwrap_or_default();
        let event_time = parse_event_time(&raw_time).ok_or_else(|| format!("bad _time '{}'", raw_time))?;
        let crossing_up = parse_magnitude(self.blue_wave_crossing_up.as_deref())
            .map_err(|e| format!("blue_wave_crossing_up: {}", e))?;
        let crossing_down = parse_magnitude(self.blue_wave_crossing_down.as_deref())
            .map_err(|e| format!("blue_wave_crossing_down: {}", e))?;
        let money_flow =
            parse_magnitude(self.money_flow.as_deref()).map_err(|e| format!("money_flow: {}", e))?;
        let price = parse_magnitude(self.price.as_deref()).map_err(|e| format!("price: {}", e))?;

        Ok(IndicatorRecord {
            instrument: self.ticker.unwrap_or_else(|| pair.instrument.clone()),
            timeframe: self.time_frame.unwrap_or_else(|| pair.timeframe.clone()),
            event_time,
            crossing_up,
            crossing_down,
            entry_signal: parse_flag(self.buy.as_deref()),
            money_flow,
            price,
        })
    }
}

/// Decodes a Flux CSV body. Rows that fail to parse are logged and skipped.
pub fn decode_indicator_csv(csv_text: &str, pair: &TrackedPair) -> Result<Vec<IndicatorRecord>, StoreError> {
    let mut records = Vec::new();
    if csv_text.lines().skip_while(|l| l.starts_with('#') || l.is_empty()).count() <= 1 {
        return Ok(records);
    }

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(csv_text.as_bytes());

    for result in rdr.deserialize::<IndicatorCsvRecord>() {
        match result {
            Ok(row) => match row.into_record(pair) {
                Ok(record) => records.push(record),
                Err(reason) => warn!("[INDICATOR_STORE] Skipping malformed row for {}: {}", pair, reason),
            },
            Err(e) => warn!("[INDICATOR_STORE] CSV deserialize error for {}: {}", pair, e),
        }
    }
    Ok(records)
}

fn flux_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn build_scan_query(
    bucket: &str,
    measurement: &str,
    pair: &TrackedPair,
    after: Option<DateTime<Utc>>,
    order: ScanOrder,
) -> String {
    let after_filter = match after {
        Some(t) => format!(
            "|> filter(fn: (r) => r._time > time(v: \"{}\"))",
            t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ),
        None => String::new(),
    };
    let desc = matches!(order, ScanOrder::Descending);

    format!(
        r#"
        from(bucket: "{bucket}")
          |> range(start: 0)
          |> filter(fn: (r) => r._measurement == "{measurement}")
          |> filter(fn: (r) => r.ticker == "{ticker}" and r.time_frame == "{time_frame}")
          {after_filter}
          |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")
          |> group()
          |> sort(columns: ["_time"], desc: {desc})
          |> yield(name: "indicator_scan")
        "#,
        bucket = flux_string(bucket),
        measurement = flux_string(measurement),
        ticker = flux_string(&pair.instrument),
        time_frame = flux_string(&pair.timeframe),
        after_filter = after_filter,
        desc = desc,
    )
}

/// Drops records at or before `after` and orders the rest by event time. Ties keep
/// response order ascending; descending is the exact reverse, matching the memory store.
pub fn order_records(
    mut records: Vec<IndicatorRecord>,
    after: Option<DateTime<Utc>>,
    order: ScanOrder,
) -> Vec<IndicatorRecord> {
    if let Some(bound) = after {
        records.retain(|r| r.event_time > bound);
    }
    records.sort_by(|a, b| a.event_time.cmp(&b.event_time));
    if order == ScanOrder::Descending {
        records.reverse();
    }
    records
}

pub struct InfluxIndicatorStore {
    http_client: HttpClient,
    settings: InfluxSettings,
}

impl InfluxIndicatorStore {
    pub fn new(http_client: HttpClient, settings: InfluxSettings) -> Self {
        Self { http_client, settings }
    }

    async fn run_query(&self, flux_query: &str) -> Result<String, StoreError> {
        debug!("[INDICATOR_STORE] Query: {}", flux_query);
        let query_url = format!("{}/api/v2/query?org={}", self.settings.host, self.settings.org);

        let response = self
            .http_client
            .post(&query_url)
            .bearer_auth(&self.settings.token)
            .header("Accept", "application/csv")
            .header("Content-Type", "application/json")
            .json(&json!({ "query": flux_query, "type": "flux" }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!("[INDICATOR_STORE] InfluxDB query failed (status {}): {}", status, body);
            return Err(StoreError::Query {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl IndicatorStore for InfluxIndicatorStore {
    async fn find_latest(
        &self,
        pair: &TrackedPair,
        filter: RecordFilter,
    ) -> Result<Option<IndicatorRecord>, StoreError> {
        let records = self.scan(pair, None, ScanOrder::Descending).await?;
        Ok(records.into_iter().find(|r| filter.matches(r)))
    }

    async fn scan(
        &self,
        pair: &TrackedPair,
        after: Option<DateTime<Utc>>,
        order: ScanOrder,
    ) -> Result<Vec<IndicatorRecord>, StoreError> {
        let flux_query = build_scan_query(&self.settings.bucket, &self.settings.measurement, pair, after, order);
        let csv_text = self.run_query(&flux_query).await?;
        let records = order_records(decode_indicator_csv(&csv_text, pair)?, after, order);
        debug!("[INDICATOR_STORE] {} record(s) for {} after {:?}", records.len(), pair, after);
        Ok(records)
    }
}
