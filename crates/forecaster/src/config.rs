//! Forecaster configuration
//!
//! Values come from an optional `forecaster.{toml,yaml,json}` file, then
//! from `FORECAST_*` environment variables. Nested keys use a double
//! underscore, e.g. `FORECAST_COLLECTOR__API_KEY` or
//! `FORECAST_FEATURES__LAGS=0,1,2,23,24`.

use anyhow::{Context, Result};
use forecast_lib::collector::CollectorConfig;
use forecast_lib::features::{FeatureConfig, WARM_UP_ROWS};
use forecast_lib::predictor::{InferenceConfig, ScheduleConfig, TrainingConfig};
use forecast_lib::store::DEFAULT_EVALUATION_ROWS;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Forecaster configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForecasterConfig {
    /// Port of the health, metrics and history API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// SQLite database holding readings and predictions
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// File the trained pipeline is stored in
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Rows in the trailing error window
    #[serde(default = "default_evaluation_rows")]
    pub evaluation_rows: usize,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

fn default_api_port() -> u16 {
    8080
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/forecast.db")
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("data").join(forecast_lib::model::DEFAULT_ARTIFACT_NAME)
}

fn default_evaluation_rows() -> usize {
    DEFAULT_EVALUATION_ROWS
}

impl ForecasterConfig {
    /// Load from `forecaster.*` in the working directory and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load with an explicit config file in place of `forecaster.*`
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("forecaster").required(false),
        };

        let builder = config::Config::builder().add_source(file_source).add_source(
            config::Environment::with_prefix("FORECAST")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("features.lags")
                .with_list_parse_key("features.smoothing_alphas")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: Self = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the jobs cannot run with
    pub fn validate(&self) -> Result<()> {
        self.features.validate().context("Invalid feature configuration")?;
        if self.training.window != 1 {
            anyhow::bail!(
                "training.window must be 1: stored predictions are for the hour after the latest reading"
            );
        }
        if self.evaluation_rows == 0 {
            anyhow::bail!("evaluation_rows must be at least 1");
        }
        let history_needed = WARM_UP_ROWS.max(self.features.max_lag()) + self.training.window;
        if self.training.lookback_hours <= history_needed {
            anyhow::bail!(
                "training.lookback_hours {} leaves no training rows, need more than {}",
                self.training.lookback_hours,
                history_needed
            );
        }
        Ok(())
    }

    /// Location label attached to log events
    pub fn location(&self) -> String {
        format!("{},{}", self.collector.latitude, self.collector.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_toml(raw: &str) -> Result<ForecasterConfig> {
        ForecasterConfig::from_builder(
            config::Config::builder().add_source(File::from_str(raw, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_defaults_from_empty_source() {
        let config = from_toml("").unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.evaluation_rows, 25);
        assert_eq!(config.features.lags, vec![0, 1, 2, 23, 24]);
        assert_eq!(config.training.lookback_hours, 144);
        assert_eq!(config.schedule.inference_interval_secs, 3600);
        assert_eq!(config.artifact_path, PathBuf::from("data/forecast_pipeline.json"));
        assert_eq!(config.location(), "52.084516,5.115539");
    }

    #[test]
    fn test_nested_overrides() {
        let config = from_toml(
            r#"
            api_port = 9000
            [collector]
            api_key = "abc"
            [features]
            lags = [0, 1, 2]
            [training.boosting]
            n_estimators = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.collector.api_key, "abc");
        assert_eq!(config.features.lags, vec![0, 1, 2]);
        assert_eq!(config.features.smoothing_alphas, vec![0.3, 0.1]);
        assert_eq!(config.training.boosting.n_estimators, 50);
        assert_eq!(config.training.boosting.max_depth, 3);
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let result = from_toml("[features]\nsmoothing_alphas = [1.5]");
        assert!(result.is_err());
    }

    #[test]
    fn test_lookback_shorter_than_lags_rejected() {
        let result = from_toml("[training]\nlookback_hours = 20");
        assert!(result.is_err());
    }

    #[test]
    fn test_lookback_within_warm_up_rejected() {
        let result = from_toml("[features]\nlags = [0, 1]\n[training]\nlookback_hours = 20");
        assert!(result.is_err());

        let config = from_toml("[features]\nlags = [0, 1]\n[training]\nlookback_hours = 26").unwrap();
        assert_eq!(config.training.lookback_hours, 26);
    }

    #[test]
    fn test_multi_hour_window_rejected() {
        assert!(from_toml("[training]\nwindow = 2").is_err());
        assert!(from_toml("[training]\nwindow = 0").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = ForecasterConfig::load_from(Some(Path::new("/nonexistent/forecaster.toml")));
        assert!(result.is_err());
    }
}
