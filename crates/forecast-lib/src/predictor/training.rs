//! Daily retraining from a rolling history window

use super::{ForecastContext, TrainingConfig, TRAINING_JOB};
use crate::error::{ForecastError, Result};
use crate::features::{Alignment, FeatureConfig, FeaturePipeline};
use crate::health::components;
use crate::model::{ArtifactVersion, GradientBoostedTrees, ModelTrainer};
use crate::models::hourly_range;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What one training run produced
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub fetched: usize,
    pub training_rows: usize,
    pub artifact: ArtifactVersion,
}

pub struct TrainingCycle {
    ctx: ForecastContext,
    trainer: Arc<ModelTrainer<GradientBoostedTrees>>,
    lookback_hours: usize,
}

impl TrainingCycle {
    /// Only a one-hour window is accepted: forecasts are stored for the hour
    /// after the latest reading.
    pub fn new(ctx: ForecastContext, features: FeatureConfig, config: &TrainingConfig) -> Result<Self> {
        if config.window != 1 {
            return Err(ForecastError::InvalidConfig(format!(
                "training window must be 1 hour, got {}",
                config.window
            )));
        }
        let trainer = ModelTrainer::new(
            FeaturePipeline::new(features)?,
            Alignment::new(config.window)?,
            GradientBoostedTrees::new(config.boosting),
        );
        Ok(Self {
            ctx,
            trainer: Arc::new(trainer),
            lookback_hours: config.lookback_hours,
        })
    }

    pub fn has_artifact(&self) -> bool {
        self.ctx.artifacts.exists()
    }

    pub async fn run(&self) -> Result<TrainingOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Train on the history ending at `now`; a failure leaves the old artifact in place
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<TrainingOutcome> {
        let start = Instant::now();
        let result = self.cycle(now).await;
        self.ctx
            .metrics
            .observe_training_latency(start.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                self.ctx.health.record_success(components::TRAINER).await;
                self.ctx.logger.log_training(
                    &outcome.artifact.version,
                    outcome.training_rows,
                    self.trainer.pipeline().config().output_descriptors().map_or(0, |d| d.len()),
                    start.elapsed().as_millis(),
                );
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Training cycle failed, keeping previous artifact");
                self.ctx.record_error(TRAINING_JOB, e).await;
            }
        }
        result
    }

    async fn cycle(&self, now: DateTime<Utc>) -> Result<TrainingOutcome> {
        let timestamps = hourly_range(now, self.lookback_hours);
        let readings = self.ctx.collector.fetch(&timestamps).await?;
        self.ctx.health.record_success(components::COLLECTOR).await;
        let fetched = readings.len();

        let trainer = Arc::clone(&self.trainer);
        let artifact = tokio::task::spawn_blocking(move || trainer.train(&readings, now))
            .await
            .map_err(|e| ForecastError::Model(format!("training task failed: {}", e)))??;

        let previous = match self.ctx.artifacts.current_version() {
            Ok(previous) => previous.map(|v| v.version),
            Err(e) => {
                warn!(error = %e, "Previous artifact unreadable, replacing it");
                None
            }
        };

        let saved = match self.ctx.artifacts.save(&artifact) {
            Ok(saved) => saved,
            Err(e) => {
                self.ctx
                    .logger
                    .log_artifact_update(previous.as_deref(), &artifact.version, false);
                return Err(e);
            }
        };
        self.ctx.metrics.set_artifact(&saved.version, &saved.checksum);
        self.ctx
            .logger
            .log_artifact_update(previous.as_deref(), &saved.version, true);

        info!(
            version = %saved.version,
            fetched,
            rows = artifact.training_rows,
            "Training cycle completed"
        );

        Ok(TrainingOutcome {
            fetched,
            training_rows: artifact.training_rows,
            artifact: saved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::model::{ArtifactStore, PipelineArtifact};
    use crate::models::Reading;
    use crate::predictor::test_support::{context, MockCollector};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap()
    }

    fn series(hours: usize) -> Vec<Reading> {
        (0..hours)
            .map(|i| Reading::new(start() + Duration::hours(i as i64), 8.0 + (i % 24) as f64 * 0.25))
            .collect()
    }

    fn small_config() -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.boosting.n_estimators = 10;
        config
    }

    #[tokio::test]
    async fn test_training_writes_artifact() {
        let dir = TempDir::new().unwrap();
        let artifacts = ArtifactStore::new(dir.path().join("pipeline.json"));
        let ctx = context(Arc::new(MockCollector::new(&series(300))), artifacts.clone());
        let cycle = TrainingCycle::new(ctx.clone(), FeatureConfig::default(), &small_config()).unwrap();
        assert!(!cycle.has_artifact());

        let now = start() + Duration::hours(200);
        let outcome = cycle.run_at(now).await.unwrap();

        assert_eq!(outcome.fetched, 144);
        assert_eq!(outcome.training_rows, 144 - 24 - 1);
        assert!(cycle.has_artifact());

        let loaded: PipelineArtifact<GradientBoostedTrees> = artifacts.load().unwrap();
        assert_eq!(loaded.version, outcome.artifact.version);
        assert_eq!(loaded.trained_at, now);
        assert!(ctx
            .health
            .component(components::TRAINER)
            .await
            .unwrap()
            .last_success
            .is_some());
    }

    #[tokio::test]
    async fn test_insufficient_history_keeps_old_artifact() {
        let dir = TempDir::new().unwrap();
        let artifacts = ArtifactStore::new(dir.path().join("pipeline.json"));

        let full = TrainingCycle::new(
            context(Arc::new(MockCollector::new(&series(300))), artifacts.clone()),
            FeatureConfig::default(),
            &small_config(),
        )
        .unwrap();
        let first = full.run_at(start() + Duration::hours(200)).await.unwrap();

        // Provider now only knows the last 20 hours
        let sparse = series(300)[280..].to_vec();
        let ctx = context(Arc::new(MockCollector::new(&sparse)), artifacts.clone());
        let cycle = TrainingCycle::new(ctx.clone(), FeatureConfig::default(), &small_config()).unwrap();
        let result = cycle.run_at(start() + Duration::hours(299)).await;

        assert!(matches!(result, Err(ForecastError::InsufficientData(_))));
        let current = artifacts.current_version().unwrap().unwrap();
        assert_eq!(current.version, first.artifact.version);
        let health = ctx.health.component(components::TRAINER).await.unwrap();
        assert_eq!(health.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_invalid_window_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(
            Arc::new(MockCollector::new(&[])),
            ArtifactStore::new(dir.path().join("p.json")),
        );
        for window in [0, 2] {
            let config = TrainingConfig {
                window,
                ..Default::default()
            };
            assert!(matches!(
                TrainingCycle::new(ctx.clone(), FeatureConfig::default(), &config),
                Err(ForecastError::InvalidConfig(_))
            ));
        }
    }
}
