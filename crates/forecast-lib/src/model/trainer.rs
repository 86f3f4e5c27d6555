//! Model training and the replayable pipeline artifact

use super::Regressor;
use crate::error::{ForecastError, Result};
use crate::features::{Alignment, FeatureDescriptor, FeaturePipeline, TrainingSet};
use crate::models::{step, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Feature stages plus fitted regressor, replayed together at inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifact<R> {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    /// Forecast horizon in steps
    pub window: usize,
    pub training_rows: usize,
    pub descriptors: Vec<FeatureDescriptor>,
    pub pipeline: FeaturePipeline,
    pub regressor: R,
}

/// A single next-step forecast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    /// Latest reading the forecast was made from
    pub observed_at: DateTime<Utc>,
    /// The hour being forecast
    pub target_at: DateTime<Utc>,
    pub value: f64,
}

impl<R: Regressor> PipelineArtifact<R> {
    /// Replay the feature stages on `readings` and forecast from the last row
    pub fn forecast(&self, readings: &[Reading]) -> Result<Forecast> {
        let latest = readings
            .iter()
            .map(|r| r.timestamp)
            .max()
            .ok_or_else(|| ForecastError::InsufficientData("no readings to forecast from".to_string()))?;

        let alignment = Alignment::new(self.window)?;
        let (row_at, row) = alignment.inference_row(&self.pipeline, readings)?;
        if row.len() != self.descriptors.len() {
            return Err(ForecastError::Model(format!(
                "artifact expects {} features, pipeline produced {}",
                self.descriptors.len(),
                row.len()
            )));
        }

        let value = self
            .regressor
            .predict(&[row])?
            .first()
            .copied()
            .ok_or_else(|| ForecastError::Model("regressor returned no prediction".to_string()))?;

        debug!(row_at = %row_at, latest = %latest, value, "Forecast computed");

        Ok(Forecast {
            observed_at: latest,
            target_at: latest + step() * self.window as i32,
            value,
        })
    }
}

/// Fits a regressor to aligned training data
pub struct ModelTrainer<R> {
    pipeline: FeaturePipeline,
    alignment: Alignment,
    prototype: R,
}

impl<R: Regressor + Clone> ModelTrainer<R> {
    /// `prototype` is an unfitted regressor cloned for every training run
    pub fn new(pipeline: FeaturePipeline, alignment: Alignment, prototype: R) -> Self {
        Self {
            pipeline,
            alignment,
            prototype,
        }
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    /// Build the aligned training pair from a raw series
    pub fn prepare(&self, readings: &[Reading]) -> Result<TrainingSet> {
        self.alignment.training_set(&self.pipeline, readings)
    }

    /// Fit a fresh regressor and bundle it with the feature stages
    pub fn fit(&self, set: &TrainingSet, trained_at: DateTime<Utc>) -> Result<PipelineArtifact<R>> {
        if set.is_empty() || set.features.len() != set.target.len() {
            return Err(ForecastError::InsufficientData(format!(
                "{} feature rows and {} targets",
                set.features.len(),
                set.target.len()
            )));
        }

        let start = Instant::now();
        let mut regressor = self.prototype.clone();
        regressor.fit(&set.features, &set.target)?;

        let artifact = PipelineArtifact {
            version: trained_at.format("%Y%m%dT%H%M%SZ").to_string(),
            trained_at,
            window: self.alignment.window(),
            training_rows: set.len(),
            descriptors: set.descriptors.clone(),
            pipeline: self.pipeline.clone(),
            regressor,
        };

        info!(
            version = %artifact.version,
            rows = artifact.training_rows,
            features = artifact.descriptors.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Model fitted"
        );
        Ok(artifact)
    }

    /// Prepare and fit in one step
    pub fn train(&self, readings: &[Reading], trained_at: DateTime<Utc>) -> Result<PipelineArtifact<R>> {
        let set = self.prepare(readings)?;
        self.fit(&set, trained_at)
    }
}
