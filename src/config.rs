// src/config.rs
// Environment-driven settings. `dotenv` is loaded by the binary before `Settings::from_env`.
use crate::errors::ConfigError;
use log::warn;
use std::env;
use std::str::FromStr;

/// Magnitudes that turn a crossing into a red or green dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternThresholds {
    /// Stage 2 fires on the first `crossing_down >= red_dot_min`.
    pub red_dot_min: f64,
    /// Stage 3 completes on the first `crossing_up <= green_dot_max`.
    pub green_dot_max: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            red_dot_min: 9.0,
            green_dot_max: -9.0,
        }
    }
}

impl PatternThresholds {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            red_dot_min: env_or("STAGE2_RED_DOT_THRESHOLD", defaults.red_dot_min),
            green_dot_max: env_or("STAGE3_GREEN_DOT_THRESHOLD", defaults.green_dot_max),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub org: String,
    pub token: String,
    pub bucket: String,
    pub measurement: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub schedule_interval_mins: u64,
    pub tickers_file: String,
    pub dot_tickers_file: String,
    pub influx: InfluxSettings,
    pub redis_url: String,
    pub thresholds: PatternThresholds,
    pub version: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let schedule_interval_mins = match env::var("SCHEDULE_INTERVAL") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: "SCHEDULE_INTERVAL",
                value: raw.clone(),
            })?,
            Err(_) => 12,
        };

        let influx = InfluxSettings {
            host: required("INFLUXDB_HOST")?,
            org: required("INFLUXDB_ORG")?,
            token: required("INFLUXDB_TOKEN")?,
            bucket: required("INFLUXDB_BUCKET")?,
            measurement: env::var("INDICATOR_MEASUREMENT").unwrap_or_else(|_| "market_cipher_b".to_string()),
        };

        Ok(Self {
            schedule_interval_mins,
            tickers_file: env::var("TICKERS_FILE").unwrap_or_else(|_| "./config/tickers.txt".to_string()),
            dot_tickers_file: env::var("DOT_TICKERS_FILE")
                .unwrap_or_else(|_| "./config/dot_tickers.txt".to_string()),
            influx,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            thresholds: PatternThresholds::from_env(),
            version: env::var("VERSION").ok().filter(|v| !v.trim().is_empty()),
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(var: &'static str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("[CONFIG] {}='{}' is not valid, using {}", var, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let t = PatternThresholds::default();
        assert_eq!(t.red_dot_min, 9.0);
        assert_eq!(t.green_dot_max, -9.0);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("DOT_TRACKER_TEST_THRESHOLD", "not-a-number");
        assert_eq!(env_or("DOT_TRACKER_TEST_THRESHOLD", 4.5), 4.5);
        env::set_var("DOT_TRACKER_TEST_THRESHOLD", " 7 ");
        assert_eq!(env_or("DOT_TRACKER_TEST_THRESHOLD", 4.5), 7.0);
        env::remove_var("DOT_TRACKER_TEST_THRESHOLD");
    }
}
