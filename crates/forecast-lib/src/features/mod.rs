//! Feature engineering for the temperature model
//!
//! Turns a time-indexed series of readings into a feature matrix through a
//! fixed chain of stages: exponential smoothing, lag construction and
//! missing-row pruning. The chain order is part of the contract: smoothing
//! reads the base column before the lag stage may drop it, and pruning must
//! run last because both earlier stages can introduce missing values.

mod alignment;
mod stages;

pub use alignment::{Alignment, TrainingSet, WARM_UP_ROWS};
pub use stages::{LagStage, MissingRowPruneStage, SmoothedSeriesStage};

use crate::error::{ForecastError, Result};
use crate::models::Reading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default name of the raw temperature column
pub const DEFAULT_BASE_COLUMN: &str = "temp";

/// What a feature column is derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// The raw series itself
    Base,
    /// Exponentially weighted moving average with decay factor `alpha`
    Smoothed { alpha: f64 },
    /// The raw series `lag` steps in the past
    Lag { lag: usize },
}

/// Statically declared description of a feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureDescriptor {
    pub fn base(column: &str) -> Self {
        Self {
            name: column.to_string(),
            kind: FeatureKind::Base,
        }
    }

    pub fn smoothed(column: &str, alpha: f64) -> Self {
        Self {
            name: format!("{}_ewm_{}", column, alpha),
            kind: FeatureKind::Smoothed { alpha },
        }
    }

    pub fn lag(column: &str, lag: usize) -> Self {
        Self {
            name: format!("{}_lag{}", column, lag),
            kind: FeatureKind::Lag { lag },
        }
    }
}

/// A named column with possibly missing values
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub descriptor: FeatureDescriptor,
    pub values: Vec<Option<f64>>,
}

/// Column-oriented, time-indexed table flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrame {
    index: Vec<DateTime<Utc>>,
    columns: Vec<FeatureColumn>,
}

impl FeatureFrame {
    /// Build a single-column frame from readings
    pub fn from_readings(base_column: &str, readings: &[Reading]) -> Self {
        Self {
            index: readings.iter().map(|r| r.timestamp).collect(),
            columns: vec![FeatureColumn {
                descriptor: FeatureDescriptor::base(base_column),
                values: readings.iter().map(|r| Some(r.value)).collect(),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn descriptors(&self) -> Vec<FeatureDescriptor> {
        self.columns.iter().map(|c| c.descriptor.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.descriptor.name == name)
    }

    /// Append a column; its length must match the index and its name must be new
    pub fn push_column(&mut self, column: FeatureColumn) -> Result<()> {
        if column.values.len() != self.index.len() {
            return Err(ForecastError::InvalidConfig(format!(
                "column {} has {} values, frame has {} rows",
                column.descriptor.name,
                column.values.len(),
                self.index.len()
            )));
        }
        if self.column(&column.descriptor.name).is_some() {
            return Err(ForecastError::InvalidConfig(format!(
                "duplicate feature column {}",
                column.descriptor.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<FeatureColumn> {
        let pos = self.columns.iter().position(|c| c.descriptor.name == name)?;
        Some(self.columns.remove(pos))
    }

    /// Keep only rows for which `keep(row)` holds, preserving order
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: Fn(usize) -> bool,
    {
        let kept: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        self.index = kept.iter().map(|&i| self.index[i]).collect();
        for column in &mut self.columns {
            column.values = kept.iter().map(|&i| column.values[i]).collect();
        }
    }

    pub fn row_has_missing(&self, row: usize) -> bool {
        self.columns.iter().any(|c| c.values[row].is_none())
    }

    /// Row-major matrix of a fully populated frame
    pub fn to_matrix(&self) -> Result<Vec<Vec<f64>>> {
        (0..self.len())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| {
                        c.values[row].ok_or_else(|| {
                            ForecastError::InsufficientData(format!(
                                "missing {} at {}",
                                c.descriptor.name, self.index[row]
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

/// Capability shared by every pipeline stage
pub trait Transformer {
    /// Learn stage state from data. All current stages are stateless.
    fn fit(self, frame: &FeatureFrame) -> Result<Self>
    where
        Self: Sized,
    {
        let _ = frame;
        Ok(self)
    }

    /// Produce the transformed frame
    fn transform(&self, frame: FeatureFrame) -> Result<FeatureFrame>;
}

/// Feature construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Name of the raw value column
    #[serde(default = "default_base_column")]
    pub base_column: String,
    /// EWMA decay factors, each in (0, 1]
    #[serde(default = "default_smoothing_alphas")]
    pub smoothing_alphas: Vec<f64>,
    /// Lag offsets in steps
    #[serde(default = "default_lags")]
    pub lags: Vec<usize>,
    /// Remove the base column once the lag columns exist
    #[serde(default = "default_drop_base")]
    pub drop_base: bool,
}

fn default_base_column() -> String {
    DEFAULT_BASE_COLUMN.to_string()
}

fn default_smoothing_alphas() -> Vec<f64> {
    vec![0.3, 0.1]
}

fn default_lags() -> Vec<usize> {
    vec![0, 1, 2, 23, 24]
}

fn default_drop_base() -> bool {
    true
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            base_column: default_base_column(),
            smoothing_alphas: default_smoothing_alphas(),
            lags: default_lags(),
            drop_base: default_drop_base(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_column.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "base column name is empty".to_string(),
            ));
        }
        if self.lags.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "at least one lag is required".to_string(),
            ));
        }
        for alpha in &self.smoothing_alphas {
            if !(*alpha > 0.0 && *alpha <= 1.0) {
                return Err(ForecastError::InvalidConfig(format!(
                    "smoothing alpha {} outside (0, 1]",
                    alpha
                )));
            }
        }
        let mut names = HashSet::new();
        for descriptor in self.output_descriptors_unchecked() {
            if !names.insert(descriptor.name.clone()) {
                return Err(ForecastError::InvalidConfig(format!(
                    "duplicate feature {}",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }

    pub fn max_lag(&self) -> usize {
        self.lags.iter().copied().max().unwrap_or(0)
    }

    /// Number of points needed to emit exactly one fully populated row
    pub fn inference_lookback(&self) -> usize {
        self.max_lag() + 1
    }

    /// Columns of the final feature matrix, in order
    pub fn output_descriptors(&self) -> Result<Vec<FeatureDescriptor>> {
        self.validate()?;
        Ok(self.output_descriptors_unchecked())
    }

    fn output_descriptors_unchecked(&self) -> Vec<FeatureDescriptor> {
        let mut out = Vec::with_capacity(1 + self.smoothing_alphas.len() + self.lags.len());
        if !self.drop_base {
            out.push(FeatureDescriptor::base(&self.base_column));
        }
        out.extend(
            self.smoothing_alphas
                .iter()
                .map(|&a| FeatureDescriptor::smoothed(&self.base_column, a)),
        );
        out.extend(
            self.lags
                .iter()
                .map(|&l| FeatureDescriptor::lag(&self.base_column, l)),
        );
        out
    }
}

/// The fixed smoothing → lag → prune chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    config: FeatureConfig,
    smoothing: SmoothedSeriesStage,
    lags: LagStage,
    prune: MissingRowPruneStage,
}

impl FeaturePipeline {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            smoothing: SmoothedSeriesStage::new(&config.base_column, config.smoothing_alphas.clone()),
            lags: LagStage::new(&config.base_column, config.lags.clone(), config.drop_base),
            prune: MissingRowPruneStage,
            config,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Fit each stage in order, feeding it the previous stage's output
    pub fn fit(self, frame: &FeatureFrame) -> Result<Self> {
        let smoothing = self.smoothing.fit(frame)?;
        let smoothed = smoothing.transform(frame.clone())?;
        let lags = self.lags.fit(&smoothed)?;
        let lagged = lags.transform(smoothed)?;
        let prune = self.prune.fit(&lagged)?;
        Ok(Self {
            config: self.config,
            smoothing,
            lags,
            prune,
        })
    }

    pub fn transform(&self, frame: FeatureFrame) -> Result<FeatureFrame> {
        let frame = self.smoothing.transform(frame)?;
        let frame = self.lags.transform(frame)?;
        self.prune.transform(frame)
    }

    pub fn transform_readings(&self, readings: &[Reading]) -> Result<FeatureFrame> {
        self.transform(FeatureFrame::from_readings(&self.config.base_column, readings))
    }
}
