//! Core data models for the forecaster

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Text layout of timestamps in the persisted store. Sorts lexicographically
/// in time order, so `max(timestamp)` in SQL is the latest instant.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Spacing between consecutive readings
pub fn step() -> Duration {
    Duration::hours(1)
}

/// An observed temperature at an hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A forecast for the hour at `timestamp`, with the trailing error once known
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    pub error: Option<f64>,
}

/// One row of the outer join of readings and predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub predicted_value: Option<f64>,
    pub error: Option<f64>,
}

/// Format a timestamp for storage
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| ForecastError::InvalidConfig(format!("bad timestamp {:?}: {}", raw, e)))
}

/// Drop minutes, seconds and sub-seconds
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let naive = ts.naive_utc();
    let hour = naive
        .date()
        .and_hms_opt(naive.hour(), 0, 0)
        .unwrap_or(naive);
    Utc.from_utc_datetime(&hour)
}

/// `count` hourly timestamps ending at (and including) `end`, oldest first
pub fn hourly_range(end: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let end = truncate_to_hour(end);
    (0..count)
        .rev()
        .map(|back| end - step() * back as i32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 14, 15, 0, 0).unwrap();
        let raw = format_timestamp(&ts);
        assert_eq!(raw, "2021-03-14 15:00:00");
        assert_eq!(parse_timestamp(&raw).unwrap(), ts);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_truncate_to_hour() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 14, 15, 42, 7).unwrap();
        assert_eq!(
            truncate_to_hour(ts),
            Utc.with_ymd_and_hms(2021, 3, 14, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_hourly_range() {
        let end = Utc.with_ymd_and_hms(2021, 3, 14, 1, 30, 0).unwrap();
        let range = hourly_range(end, 3);
        assert_eq!(
            range,
            vec![
                Utc.with_ymd_and_hms(2021, 3, 13, 23, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 3, 14, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 3, 14, 1, 0, 0).unwrap(),
            ]
        );
        assert!(hourly_range(end, 0).is_empty());
    }
}
