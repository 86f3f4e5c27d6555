//! Prometheus metrics and event logging for the forecaster

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, Gauge, GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets in seconds; training takes far longer than inference
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];

static GLOBAL_METRICS: OnceLock<ForecastMetricsInner> = OnceLock::new();

struct ForecastMetricsInner {
    inference_latency_seconds: Histogram,
    training_latency_seconds: Histogram,
    fetch_latency_seconds: Histogram,
    readings_appended: IntCounter,
    predictions_written: IntCounter,
    errors: IntCounterVec,
    trailing_mse: Gauge,
    artifact_info: GaugeVec,
}

impl ForecastMetricsInner {
    fn new() -> Self {
        Self {
            inference_latency_seconds: register_histogram!(
                "forecaster_inference_latency_seconds",
                "Time spent on one inference cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            training_latency_seconds: register_histogram!(
                "forecaster_training_latency_seconds",
                "Time spent on one training cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register training_latency_seconds"),

            fetch_latency_seconds: register_histogram!(
                "forecaster_fetch_latency_seconds",
                "Time spent fetching readings from the provider",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            readings_appended: register_int_counter!(
                "forecaster_readings_appended_total",
                "Readings inserted into the store"
            )
            .expect("Failed to register readings_appended"),

            predictions_written: register_int_counter!(
                "forecaster_predictions_written_total",
                "Predictions upserted into the store"
            )
            .expect("Failed to register predictions_written"),

            errors: register_int_counter_vec!(
                "forecaster_errors_total",
                "Failed cycles by job and error kind",
                &["job", "kind"]
            )
            .expect("Failed to register errors"),

            trailing_mse: register_gauge!(
                "forecaster_trailing_mse",
                "Most recent trailing mean squared prediction error"
            )
            .expect("Failed to register trailing_mse"),

            artifact_info: register_gauge_vec!(
                "forecaster_artifact_info",
                "Currently stored pipeline artifact",
                &["version", "checksum"]
            )
            .expect("Failed to register artifact_info"),
        }
    }
}

/// Handle to the process-wide forecaster metrics
#[derive(Clone)]
pub struct ForecastMetrics {
    _private: (),
}

impl Default for ForecastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ForecastMetricsInner {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new)
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn observe_training_latency(&self, duration_secs: f64) {
        self.inner().training_latency_seconds.observe(duration_secs);
    }

    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_latency_seconds.observe(duration_secs);
    }

    pub fn add_readings_appended(&self, count: usize) {
        self.inner().readings_appended.inc_by(count as u64);
    }

    pub fn inc_predictions_written(&self) {
        self.inner().predictions_written.inc();
    }

    /// Count a failed cycle; `kind` is an error kind label
    pub fn inc_errors(&self, job: &str, kind: &str) {
        self.inner().errors.with_label_values(&[job, kind]).inc();
    }

    pub fn set_trailing_mse(&self, mse: f64) {
        self.inner().trailing_mse.set(mse);
    }

    /// Replace the exported artifact version
    pub fn set_artifact(&self, version: &str, checksum: &str) {
        let gauge = &self.inner().artifact_info;
        gauge.reset();
        gauge.with_label_values(&[version, checksum]).set(1.0);
    }
}

/// Emits forecaster events as structured log lines
#[derive(Clone)]
pub struct StructuredLogger {
    location: String,
}

impl StructuredLogger {
    /// `location` tags every event, e.g. "52.084516,5.115539"
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn log_startup(&self, version: &str, artifact_version: Option<&str>) {
        info!(
            event = "forecaster_started",
            location = %self.location,
            forecaster_version = %version,
            artifact_version = artifact_version.unwrap_or("none"),
            "Forecaster started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "forecaster_shutdown",
            location = %self.location,
            reason = %reason,
            "Forecaster shutting down"
        );
    }

    pub fn log_prediction(&self, target: &str, predicted_value: f64, artifact_version: &str) {
        info!(
            event = "prediction_generated",
            location = %self.location,
            target = %target,
            predicted_value = predicted_value,
            artifact_version = %artifact_version,
            "Generated next-hour forecast"
        );
    }

    pub fn log_evaluation(&self, anchor: &str, mse: f64, rows: usize) {
        info!(
            event = "evaluation_recomputed",
            location = %self.location,
            anchor = %anchor,
            mse = mse,
            rows = rows,
            "Recomputed trailing prediction error"
        );
    }

    pub fn log_training(&self, version: &str, rows: usize, features: usize, duration_ms: u128) {
        info!(
            event = "model_trained",
            location = %self.location,
            version = %version,
            training_rows = rows,
            features = features,
            duration_ms = duration_ms as u64,
            "Trained forecast model"
        );
    }

    pub fn log_artifact_update(&self, old_version: Option<&str>, new_version: &str, success: bool) {
        if success {
            info!(
                event = "artifact_updated",
                location = %self.location,
                old_version = old_version.unwrap_or("none"),
                new_version = %new_version,
                "Pipeline artifact replaced"
            );
        } else {
            warn!(
                event = "artifact_update_failed",
                location = %self.location,
                old_version = old_version.unwrap_or("none"),
                new_version = %new_version,
                "Pipeline artifact not replaced, keeping previous version"
            );
        }
    }
}
