// src/errors.rs
use crate::types::{Stage, TrackedPair};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("InfluxDB query failed (status {status}): {body}")]
    Query { status: u16, body: String },

    #[error("CSV decode failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier disabled")]
    Disabled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("Failed to read pair file {path}: {source}")]
    PairFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line_no}: expected 'TICKER, TIMEFRAME', got '{line}'")]
    PairLine {
        path: String,
        line_no: usize,
        line: String,
    },
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{pair} is at stage {stage} but has no {field}")]
    MissingAnchor {
        pair: TrackedPair,
        stage: Stage,
        field: &'static str,
    },
}
