// src/pairs.rs
// Tracked-pair lists. Each line is `TICKER, TIMEFRAME`; the files are re-read every cycle.
use crate::errors::ConfigError;
use crate::types::TrackedPair;
use log::debug;
use std::fs;

pub fn parse_pairs(path: &str, contents: &str) -> Result<Vec<TrackedPair>, ConfigError> {
    let mut pairs = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split(',').map(str::trim);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ticker), Some(timeframe), None) if !ticker.is_empty() && !timeframe.is_empty() => {
                let pair = TrackedPair::new(ticker, timeframe);
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
            _ => {
                return Err(ConfigError::PairLine {
                    path: path.to_string(),
                    line_no: idx + 1,
                    line: line.to_string(),
                })
            }
        }
    }
    Ok(pairs)
}

pub fn load_pairs(path: &str) -> Result<Vec<TrackedPair>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::PairFile {
        path: path.to_string(),
        source,
    })?;
    let pairs = parse_pairs(path, &contents)?;
    debug!("[PAIRS] Loaded {} pair(s) from {}", pairs.len(), path);
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs_skips_blank_and_comments() {
        let contents = "BTCUSDT, 5\n\n# disabled\nETHUSDT,15\nBTCUSDT, 5\n";
        let pairs = parse_pairs("tickers.txt", contents).unwrap();
        assert_eq!(
            pairs,
            vec![TrackedPair::new("BTCUSDT", "5"), TrackedPair::new("ETHUSDT", "15")]
        );
    }

    #[test]
    fn test_parse_pairs_rejects_malformed_line() {
        let err = parse_pairs("tickers.txt", "BTCUSDT, 5\nETHUSDT\n").unwrap_err();
        match err {
            ConfigError::PairLine { line_no, line, .. } => {
                assert_eq!(line_no, 2);
                assert_eq!(line, "ETHUSDT");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_load_pairs_missing_file() {
        assert!(matches!(
            load_pairs("/nonexistent/dot_tickers.txt"),
            Err(ConfigError::PairFile { .. })
        ));
    }
}
