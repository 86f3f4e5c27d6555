//! Inference and training cycles and the job scheduler that drives them

mod inference;
mod scheduler;
mod training;

pub use inference::{InferenceCycle, InferenceOutcome};
pub use scheduler::{JobScheduler, ScheduleConfig};
pub use training::{TrainingCycle, TrainingOutcome};

use crate::collector::DataCollector;
use crate::error::ForecastError;
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::model::{ArtifactStore, BoostingConfig};
use crate::observability::{ForecastMetrics, StructuredLogger};
use crate::store::ForecastStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_training_lookback() -> usize {
    144
}

fn default_window() -> usize {
    1
}

/// Training data range and regressor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Hours of history fetched per training run
    #[serde(default = "default_training_lookback")]
    pub lookback_hours: usize,
    /// Forecast horizon in hours
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub boosting: BoostingConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_training_lookback(),
            window: default_window(),
            boosting: BoostingConfig::default(),
        }
    }
}

fn default_fetch_hours() -> usize {
    48
}

/// Inference data range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Points replayed through the pipeline; defaults to the longest lag plus one
    #[serde(default)]
    pub lookback_hours: Option<usize>,
    /// Hours requested from the provider per cycle, never fewer than the lookback.
    /// The newest hours may not be published yet.
    #[serde(default = "default_fetch_hours")]
    pub fetch_hours: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            lookback_hours: None,
            fetch_hours: default_fetch_hours(),
        }
    }
}

/// Shared handles used by both cycles
#[derive(Clone)]
pub struct ForecastContext {
    pub collector: Arc<dyn DataCollector>,
    pub store: Arc<ForecastStore>,
    pub artifacts: ArtifactStore,
    pub health: HealthRegistry,
    pub metrics: ForecastMetrics,
    pub logger: StructuredLogger,
}

impl ForecastContext {
    /// Record a failed cycle against the component the error belongs to
    async fn record_error(&self, job: &str, error: &ForecastError) {
        self.metrics.inc_errors(job, error.kind());
        let (component, status) = match error {
            ForecastError::DataFetch(_) => (components::COLLECTOR, ComponentStatus::Degraded),
            ForecastError::Storage(_) => (components::STORE, ComponentStatus::Unhealthy),
            _ if job == TRAINING_JOB => (components::TRAINER, ComponentStatus::Degraded),
            _ => (components::PREDICTOR, ComponentStatus::Degraded),
        };
        self.health.record_failure(component, status, error.to_string()).await;
    }
}

pub(crate) const INFERENCE_JOB: &str = "inference";
pub(crate) const TRAINING_JOB: &str = "training";


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let training = TrainingConfig::default();
        assert_eq!(training.lookback_hours, 144);
        assert_eq!(training.window, 1);
        assert_eq!(training.boosting.n_estimators, 100);
        assert_eq!(InferenceConfig::default().lookback_hours, None);
    }

    #[test]
    fn test_training_config_from_partial_json() {
        let config: TrainingConfig = serde_json::from_str(r#"{"lookback_hours": 72}"#).unwrap();
        assert_eq!(config.lookback_hours, 72);
        assert_eq!(config.window, 1);
    }
}
