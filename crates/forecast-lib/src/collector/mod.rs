//! Temperature data collection
//!
//! A collector turns a list of hourly timestamps into observed readings.
//! The production implementation queries the OpenWeather history API.

mod openweather;

pub use openweather::OpenWeatherCollector;

use crate::error::Result;
use crate::models::Reading;
use chrono::{DateTime, Utc};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for data provider implementations
#[async_trait]
pub trait DataCollector: Send + Sync {
    /// Readings for the requested hours, ordered by time.
    ///
    /// Hours the provider has no value for are left out.
    async fn fetch(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<Reading>>;
}

fn default_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_latitude() -> f64 {
    52.084516
}

fn default_longitude() -> f64 {
    5.115539
}

fn default_timeout_secs() -> u64 {
    30
}

/// Provider endpoint and location
#[derive(Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Scheme and host of the provider; paths are joined onto it
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for CollectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
