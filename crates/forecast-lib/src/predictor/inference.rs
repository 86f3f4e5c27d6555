//! One hourly inference cycle
//!
//! Fetch the recent hours, forecast the next hour from the newest lookback
//! readings that came back, then append the new readings, recompute the trailing error and upsert the forecast
//! in a single store transaction. Readings are stored even when no artifact
//! is available yet.

use super::{ForecastContext, InferenceConfig, INFERENCE_JOB};
use crate::error::{ForecastError, Result};
use crate::features::FeatureConfig;
use crate::health::components;
use crate::model::GradientBoostedTrees;
use crate::models::{format_timestamp, hourly_range, Prediction};
use crate::store::{AppendOutcome, Evaluation};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, warn};

/// What one inference cycle wrote
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub fetched: usize,
    pub appended: AppendOutcome,
    pub evaluation: Option<Evaluation>,
    pub prediction: Prediction,
    pub artifact_version: String,
}

pub struct InferenceCycle {
    ctx: ForecastContext,
    lookback_hours: usize,
    fetch_hours: usize,
}

impl InferenceCycle {
    pub fn new(ctx: ForecastContext, features: &FeatureConfig, config: &InferenceConfig) -> Self {
        let lookback_hours = config
            .lookback_hours
            .unwrap_or_else(|| features.inference_lookback());
        Self {
            ctx,
            lookback_hours,
            fetch_hours: config.fetch_hours.max(lookback_hours),
        }
    }

    pub fn lookback_hours(&self) -> usize {
        self.lookback_hours
    }

    pub fn fetch_hours(&self) -> usize {
        self.fetch_hours
    }

    pub async fn run(&self) -> Result<InferenceOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the wall-clock time
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<InferenceOutcome> {
        let start = Instant::now();
        let result = self.cycle(now).await;
        self.ctx
            .metrics
            .observe_inference_latency(start.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                self.ctx.health.record_success(components::PREDICTOR).await;
                debug!(
                    fetched = outcome.fetched,
                    inserted = outcome.appended.inserted,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Inference cycle completed"
                );
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Inference cycle failed");
                self.ctx.record_error(INFERENCE_JOB, e).await;
            }
        }
        result
    }

    async fn cycle(&self, now: DateTime<Utc>) -> Result<InferenceOutcome> {
        let timestamps = hourly_range(now, self.fetch_hours);
        let fetch_start = Instant::now();
        let readings = self.ctx.collector.fetch(&timestamps).await?;
        self.ctx
            .metrics
            .observe_fetch_latency(fetch_start.elapsed().as_secs_f64());
        self.ctx.health.record_success(components::COLLECTOR).await;

        let loaded = self.ctx.artifacts.load::<GradientBoostedTrees>();
        let recent = &readings[readings.len().saturating_sub(self.lookback_hours)..];
        let forecast = loaded.and_then(|artifact| {
            let forecast = artifact.forecast(recent)?;
            Ok((artifact, forecast))
        });

        let commit = self.ctx.store.commit_cycle(
            &readings,
            forecast.as_ref().ok().map(|(_, f)| (f.target_at, f.value)),
        )?;
        self.ctx.health.record_success(components::STORE).await;
        self.ctx.metrics.add_readings_appended(commit.appended.inserted);

        if let Some(evaluation) = commit.evaluation {
            self.ctx.metrics.set_trailing_mse(evaluation.mse);
            self.ctx.logger.log_evaluation(
                &format_timestamp(&evaluation.timestamp),
                evaluation.mse,
                evaluation.rows,
            );
        }

        let (artifact, _) = forecast?;
        let prediction = commit.prediction.ok_or_else(|| {
            ForecastError::Model("forecast was not written to the store".to_string())
        })?;

        self.ctx.metrics.inc_predictions_written();
        self.ctx.logger.log_prediction(
            &format_timestamp(&prediction.timestamp),
            prediction.predicted_value,
            &artifact.version,
        );

        Ok(InferenceOutcome {
            fetched: readings.len(),
            appended: commit.appended,
            evaluation: commit.evaluation,
            prediction,
            artifact_version: artifact.version,
        })
    }
}
