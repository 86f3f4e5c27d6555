//! OpenWeather "timemachine" history client

use super::{CollectorConfig, DataCollector};
use crate::error::{ForecastError, Result};
use crate::models::Reading;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const TIMEMACHINE_PATH: &str = "data/2.5/onecall/timemachine";

#[derive(Debug, Deserialize)]
struct TimemachineResponse {
    #[serde(default)]
    hourly: Vec<HourlyPoint>,
}

#[derive(Debug, Deserialize)]
struct HourlyPoint {
    dt: i64,
    temp: f64,
}

/// Fetches hourly temperatures, one request per calendar day
pub struct OpenWeatherCollector {
    client: Client,
    endpoint: Url,
    config: CollectorConfig,
}

impl OpenWeatherCollector {
    pub fn new(config: CollectorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let endpoint = Url::parse(&config.base_url)
            .and_then(|base| base.join(TIMEMACHINE_PATH))
            .map_err(|e| {
                ForecastError::InvalidConfig(format!("invalid provider URL {:?}: {}", config.base_url, e))
            })?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    fn day_url(&self, day: NaiveDate) -> Url {
        let day_start = Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN));
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("lat", &self.config.latitude.to_string())
            .append_pair("lon", &self.config.longitude.to_string())
            .append_pair("dt", &day_start.timestamp().to_string())
            .append_pair("units", "metric")
            .append_pair("appid", &self.config.api_key);
        url
    }

    async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<HourlyPoint>> {
        let response = self.client.get(self.day_url(day)).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::DataFetch(format!(
                "provider error for {} ({}): {}",
                day, status, body
            )));
        }

        let body: TimemachineResponse = response.json().await?;
        Ok(body.hourly)
    }
}

#[async_trait]
impl DataCollector for OpenWeatherCollector {
    async fn fetch(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<Reading>> {
        if timestamps.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let wanted: HashSet<DateTime<Utc>> = timestamps.iter().copied().collect();
        let days: BTreeSet<NaiveDate> = timestamps.iter().map(|ts| ts.date_naive()).collect();

        let mut found = BTreeMap::new();
        for day in &days {
            for point in self.fetch_day(*day).await? {
                let Some(ts) = Utc.timestamp_opt(point.dt, 0).single() else {
                    continue;
                };
                if wanted.contains(&ts) {
                    found.insert(ts, point.temp);
                }
            }
        }

        if found.is_empty() {
            return Err(ForecastError::DataFetch(format!(
                "provider returned none of the {} requested hours",
                wanted.len()
            )));
        }
        if found.len() < wanted.len() {
            warn!(
                requested = wanted.len(),
                received = found.len(),
                "Provider response is missing hours"
            );
        }

        debug!(
            days = days.len(),
            readings = found.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Fetched readings"
        );

        Ok(found
            .into_iter()
            .map(|(timestamp, value)| Reading::new(timestamp, value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use mockito::Matcher;

    fn collector(base_url: &str) -> OpenWeatherCollector {
        OpenWeatherCollector::new(CollectorConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn day_body(day_start: DateTime<Utc>, base: f64) -> String {
        let hourly: Vec<serde_json::Value> = (0..24)
            .map(|h| {
                serde_json::json!({
                    "dt": (day_start + ChronoDuration::hours(h)).timestamp(),
                    "temp": base + h as f64,
                    "humidity": 80
                })
            })
            .collect();
        serde_json::json!({ "lat": 52.08, "lon": 5.12, "hourly": hourly }).to_string()
    }

    #[test]
    fn test_invalid_base_url() {
        let result = OpenWeatherCollector::new(CollectorConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn test_day_url_query() {
        let c = collector("https://api.example.com");
        let url = c.day_url(NaiveDate::from_ymd_opt(2021, 3, 14).unwrap());
        assert_eq!(url.path(), "/data/2.5/onecall/timemachine");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("dt".to_string(), "1615680000".to_string())));
        assert!(query.contains(&("units".to_string(), "metric".to_string())));
        assert!(query.contains(&("appid".to_string(), "test-key".to_string())));
        assert!(query.contains(&("lat".to_string(), "52.084516".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_spans_two_days() {
        let mut server = mockito::Server::new_async().await;
        let day1 = Utc.with_ymd_and_hms(2021, 3, 14, 0, 0, 0).unwrap();
        let day2 = day1 + ChronoDuration::days(1);

        let m1 = server
            .mock("GET", "/data/2.5/onecall/timemachine")
            .match_query(Matcher::UrlEncoded("dt".into(), day1.timestamp().to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(day_body(day1, 0.0))
            .create_async()
            .await;
        let m2 = server
            .mock("GET", "/data/2.5/onecall/timemachine")
            .match_query(Matcher::UrlEncoded("dt".into(), day2.timestamp().to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(day_body(day2, 100.0))
            .create_async()
            .await;

        // 22:00 on day one through 01:00 on day two
        let requested: Vec<DateTime<Utc>> = (22..26).map(|h| day1 + ChronoDuration::hours(h)).collect();
        let readings = collector(&server.url()).fetch(&requested).await.unwrap();

        m1.assert_async().await;
        m2.assert_async().await;
        assert_eq!(readings.len(), 4);
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![22.0, 23.0, 100.0, 101.0]);
        assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_fetch_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/data/2.5/onecall/timemachine")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"cod":401,"message":"Invalid API key"}"#)
            .create_async()
            .await;

        let ts = Utc.with_ymd_and_hms(2021, 3, 14, 5, 0, 0).unwrap();
        let result = collector(&server.url()).fetch(&[ts]).await;
        assert!(matches!(result, Err(ForecastError::DataFetch(_))));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/data/2.5/onecall/timemachine")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let ts = Utc.with_ymd_and_hms(2021, 3, 14, 5, 0, 0).unwrap();
        let result = collector(&server.url()).fetch(&[ts]).await;
        assert!(matches!(result, Err(ForecastError::DataFetch(_))));
    }

    #[tokio::test]
    async fn test_fetch_no_matching_hours() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/data/2.5/onecall/timemachine")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"hourly": []}"#)
            .create_async()
            .await;

        let ts = Utc.with_ymd_and_hms(2021, 3, 14, 5, 0, 0).unwrap();
        let result = collector(&server.url()).fetch(&[ts]).await;
        assert!(matches!(result, Err(ForecastError::DataFetch(_))));
    }

    #[tokio::test]
    async fn test_fetch_nothing_requested() {
        let c = collector("http://127.0.0.1:9");
        assert!(c.fetch(&[]).await.unwrap().is_empty());
    }
}
